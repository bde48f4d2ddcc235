use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::path::DocPath;
use crate::value::{field, ValueClass};

/// Untyped document body.
pub type DocumentData = Map<String, Value>;

/// A stored document as returned by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocPath,
    pub data: DocumentData,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
    /// Store-assigned version, bumped on every write to the path.
    pub version: u64,
}

impl Document {
    /// Decode the body into a caller type.
    pub fn data_to<T: DeserializeOwned>(&self) -> Result<T, TypeError> {
        decode_data(&self.data)
    }

    /// Value at a dotted field path, if present.
    pub fn field(&self, path: &str) -> Option<&Value> {
        field(&self.data, path)
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }
}

/// Encode a caller value into a document body.
///
/// The value must serialize to a JSON object.
pub fn encode_data<T: Serialize + ?Sized>(value: &T) -> Result<DocumentData, TypeError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(TypeError::NotAMap(ValueClass::of(&other).name())),
    }
}

/// Decode a document body into a caller type.
pub fn decode_data<T: DeserializeOwned>(data: &DocumentData) -> Result<T, TypeError> {
    Ok(serde_json::from_value(Value::Object(data.clone()))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Order {
        status: String,
        total: u32,
    }

    #[test]
    fn encode_then_decode_struct() {
        let order = Order {
            status: "open".into(),
            total: 12,
        };
        let data = encode_data(&order).unwrap();
        assert_eq!(data.get("status"), Some(&json!("open")));
        let back: Order = decode_data(&data).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn scalars_are_not_documents() {
        assert_eq!(encode_data(&5u8), Err(TypeError::NotAMap("number")));
        assert_eq!(encode_data(&vec![1, 2]), Err(TypeError::NotAMap("array")));
    }

    #[test]
    fn decode_into_wrong_shape_fails() {
        let data = encode_data(&json!({"status": 3})).unwrap();
        let err = decode_data::<Order>(&data).unwrap_err();
        assert!(matches!(err, TypeError::Serialization(_)));
    }
}
