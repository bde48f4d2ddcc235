//! Index field entries.

use serde::{Deserialize, Serialize};

/// Sort order of an indexed field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Order {
    Ascending,
    Descending,
}

/// Array indexing mode of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ArrayConfig {
    Contains,
}

/// Whether an index serves one collection or every collection sharing an id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryScope {
    #[default]
    Collection,
    CollectionGroup,
}

/// One field of an index. Exactly one of `order` and `array_config` is set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexField {
    pub field_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_config: Option<ArrayConfig>,
}

impl IndexField {
    pub fn asc(field_path: impl Into<String>) -> Self {
        Self::ordered(field_path, Order::Ascending)
    }

    pub fn desc(field_path: impl Into<String>) -> Self {
        Self::ordered(field_path, Order::Descending)
    }

    pub fn array_contains(field_path: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            order: None,
            array_config: Some(ArrayConfig::Contains),
        }
    }

    fn ordered(field_path: impl Into<String>, order: Order) -> Self {
        Self {
            field_path: field_path.into(),
            order: Some(order),
            array_config: None,
        }
    }

    /// Problem with this field, if any.
    pub(crate) fn problem(&self) -> Option<String> {
        if self.field_path.is_empty() {
            return Some("field path is empty".into());
        }
        match (self.order, self.array_config) {
            (Some(_), None) | (None, Some(_)) => None,
            (None, None) => Some(format!(
                "field {} needs an order or an array config",
                self.field_path
            )),
            (Some(_), Some(_)) => Some(format!(
                "field {} has both an order and an array config",
                self.field_path
            )),
        }
    }
}
