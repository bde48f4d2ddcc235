//! Composite index and field override definitions.

use serde::{Deserialize, Serialize};

use crate::field::{IndexField, QueryScope};

/// A composite index over one collection group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub collection_group: String,
    #[serde(default)]
    pub query_scope: QueryScope,
    #[serde(default)]
    pub fields: Vec<IndexField>,
}

impl Index {
    /// Start an index on `collection_group` with collection scope.
    pub fn new(collection_group: impl Into<String>) -> Self {
        Self {
            collection_group: collection_group.into(),
            query_scope: QueryScope::Collection,
            fields: Vec::new(),
        }
    }

    pub fn scope(mut self, scope: QueryScope) -> Self {
        self.query_scope = scope;
        self
    }

    pub fn asc(mut self, field_path: impl Into<String>) -> Self {
        self.fields.push(IndexField::asc(field_path));
        self
    }

    pub fn desc(mut self, field_path: impl Into<String>) -> Self {
        self.fields.push(IndexField::desc(field_path));
        self
    }

    pub fn array_contains(mut self, field_path: impl Into<String>) -> Self {
        self.fields.push(IndexField::array_contains(field_path));
        self
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.collection_group.is_empty() {
            problems.push("index has an empty collection group".to_string());
        }
        if self.fields.len() < 2 {
            problems.push(format!(
                "index on {} has {} field(s); composite indexes need at least 2",
                self.collection_group,
                self.fields.len()
            ));
        }
        problems.extend(self.fields.iter().filter_map(IndexField::problem));
        problems
    }
}

impl std::fmt::Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [", self.collection_group)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&field.field_path)?;
            match (field.order, field.array_config) {
                (Some(crate::Order::Ascending), _) => f.write_str(" asc")?,
                (Some(crate::Order::Descending), _) => f.write_str(" desc")?,
                (None, Some(_)) => f.write_str(" array-contains")?,
                (None, None) => {}
            }
        }
        f.write_str("]")?;
        if self.query_scope == QueryScope::CollectionGroup {
            f.write_str(" (collection group)")?;
        }
        Ok(())
    }
}

/// Single-field index settings for one field of a collection group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOverride {
    pub collection_group: String,
    pub field_path: String,
    #[serde(default)]
    pub indexes: Vec<IndexField>,
}

impl FieldOverride {
    pub fn new(collection_group: impl Into<String>, field_path: impl Into<String>) -> Self {
        Self {
            collection_group: collection_group.into(),
            field_path: field_path.into(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, field: IndexField) -> Self {
        self.indexes.push(field);
        self
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.collection_group.is_empty() || self.field_path.is_empty() {
            problems.push(format!(
                "field override {}.{} needs a collection group and a field path",
                self.collection_group, self.field_path
            ));
        }
        problems.extend(self.indexes.iter().filter_map(IndexField::problem));
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_appends_fields_in_order() {
        let idx = Index::new("orders")
            .scope(QueryScope::CollectionGroup)
            .asc("status")
            .desc("createdAt")
            .array_contains("tags");
        assert_eq!(idx.query_scope, QueryScope::CollectionGroup);
        assert_eq!(idx.fields[0], IndexField::asc("status"));
        assert_eq!(idx.fields[1], IndexField::desc("createdAt"));
        assert_eq!(idx.fields[2], IndexField::array_contains("tags"));
        assert!(idx.problems().is_empty());
    }

    #[test]
    fn display_lists_fields() {
        let idx = Index::new("orders").asc("status").desc("createdAt");
        assert_eq!(idx.to_string(), "orders [status asc, createdAt desc]");
    }

    #[test]
    fn single_field_index_is_a_problem() {
        let problems = Index::new("orders").asc("status").problems();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("at least 2"));
    }

    #[test]
    fn field_needs_exactly_one_mode() {
        let mut both = IndexField::asc("a");
        both.array_config = Some(crate::ArrayConfig::Contains);
        let neither = IndexField {
            field_path: "b".into(),
            order: None,
            array_config: None,
        };
        let idx = Index {
            collection_group: "orders".into(),
            query_scope: QueryScope::Collection,
            fields: vec![both, neither],
        };
        let problems = idx.problems();
        assert_eq!(problems.len(), 2);
        assert!(problems[0].contains("both"));
        assert!(problems[1].contains("needs an order"));
    }

    #[test]
    fn override_needs_names() {
        let ov = FieldOverride::new("", "createdAt").with_index(IndexField::desc("createdAt"));
        assert_eq!(ov.problems().len(), 1);
    }
}
