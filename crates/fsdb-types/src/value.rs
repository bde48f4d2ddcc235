//! Ordering and field access over untyped document values.
//!
//! Values of different kinds sort by kind first:
//! null < boolean < number < string < array < map.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// Sort class of a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValueClass {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Map,
}

impl ValueClass {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Map,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Map => "map",
        }
    }
}

/// Total order over values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ca, cb) = (ValueClass::of(a), ValueClass::of(b));
    if ca != cb {
        return ca.cmp(&cb);
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut left: Vec<_> = x.iter().collect();
            let mut right: Vec<_> = y.iter().collect();
            left.sort_by(|p, q| p.0.cmp(q.0));
            right.sort_by(|p, q| p.0.cmp(q.0));
            for ((lk, lv), (rk, rv)) in left.iter().zip(right.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            left.len().cmp(&right.len())
        }
        _ => Ordering::Equal,
    }
}

fn compare_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x.cmp(&y);
    }
    let x = a.as_f64().unwrap_or(f64::NAN);
    let y = b.as_f64().unwrap_or(f64::NAN);
    x.total_cmp(&y)
}

/// Equality under [`compare_values`], so `1` and `1.0` are equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Look up a dotted field path (`address.city`) in a document map.
pub fn field<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Copy the value at `path` from `src` into `dst`, creating intermediate maps.
pub fn project_field(src: &Map<String, Value>, dst: &mut Map<String, Value>, path: &str) {
    let Some(value) = field(src, path) else {
        return;
    };

    let parts: Vec<&str> = path.split('.').collect();
    let mut target = dst;
    for part in &parts[..parts.len() - 1] {
        let entry = target
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        target = match entry {
            Value::Object(map) => map,
            _ => return,
        };
    }
    target.insert(parts[parts.len() - 1].to_string(), value.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cross_class_order() {
        let ordered = [
            json!(null),
            json!(false),
            json!(-3),
            json!("a"),
            json!([1]),
            json!({"a": 1}),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less);
        }
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(-1), &json!(0.5)), Ordering::Less);
    }

    #[test]
    fn arrays_compare_lexicographically() {
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 3])), Ordering::Less);
        assert_eq!(compare_values(&json!([1]), &json!([1, 0])), Ordering::Less);
    }

    #[test]
    fn nested_field_lookup() {
        let data = json!({"address": {"city": "Oslo"}, "n": 1});
        let map = data.as_object().unwrap();
        assert_eq!(field(map, "address.city"), Some(&json!("Oslo")));
        assert_eq!(field(map, "n"), Some(&json!(1)));
        assert_eq!(field(map, "n.x"), None);
        assert_eq!(field(map, "missing"), None);
    }

    #[test]
    fn projection_builds_nested_maps() {
        let data = json!({"address": {"city": "Oslo", "zip": "0150"}, "n": 1});
        let mut out = Map::new();
        project_field(data.as_object().unwrap(), &mut out, "address.city");
        project_field(data.as_object().unwrap(), &mut out, "missing");
        assert_eq!(Value::Object(out), json!({"address": {"city": "Oslo"}}));
    }
}
