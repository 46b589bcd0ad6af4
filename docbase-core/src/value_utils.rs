//! Value utility functions shared by the query engine and the indexes
//!
//! Numbers are always compared as `f64`, so `25` and `25.0` are the same
//! value here and inside every index.

use serde_json::{Map, Value};

/// Look up a field in a document body with dot notation support
///
/// A literal key wins over a dotted path, so a field actually named
/// `"a.b"` is still reachable.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use docbase_core::value_utils::get_path;
///
/// let doc = json!({"address": {"city": "NYC"}});
/// let fields = doc.as_object().unwrap();
/// assert_eq!(get_path(fields, "address.city"), Some(&json!("NYC")));
/// ```
pub fn get_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    if let Some(value) = fields.get(path) {
        return Some(value);
    }
    if !path.contains('.') {
        return None;
    }

    let mut parts = path.split('.');
    let mut value = fields.get(parts.next()?)?;
    for part in parts {
        match value {
            Value::Object(map) => value = map.get(part)?,
            Value::Array(arr) => {
                let index = part.parse::<usize>().ok()?;
                value = arr.get(index)?;
            }
            _ => return None,
        }
    }
    Some(value)
}

/// Numeric view of a value; `None` for anything that is not a JSON number
#[inline]
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Deep structural equality
///
/// Same primitive type and value; lists equal in length and element-wise;
/// documents equal in key set and key-wise. Numbers compare numerically.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(_), Value::Number(_)) => as_number(a) == as_number(b),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, l)| y.get(key).map_or(false, |r| values_equal(l, r)))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path_literal_key_wins() {
        let doc = json!({"a.b": 1, "a": {"b": 2}});
        let fields = doc.as_object().unwrap();
        assert_eq!(get_path(fields, "a.b"), Some(&json!(1)));
        assert_eq!(get_path(fields, ""), None);
    }

    #[test]
    fn test_get_path_through_arrays() {
        let doc = json!({"items": [{"name": "x"}, {"name": "y"}]});
        let fields = doc.as_object().unwrap();
        assert_eq!(get_path(fields, "items.1.name"), Some(&json!("y")));
        assert_eq!(get_path(fields, "items.first"), None);
        assert_eq!(get_path(fields, "items.9"), None);
    }

    #[test]
    fn test_numeric_equality_across_representations() {
        assert!(values_equal(&json!(25), &json!(25.0)));
        assert!(values_equal(&json!(-0.0), &json!(0)));
        assert!(!values_equal(&json!(25), &json!("25")));
        assert_eq!(as_number(&json!("25")), None);
        assert_eq!(as_number(&json!(2.5)), Some(2.5));
    }

    #[test]
    fn test_deep_equality() {
        assert!(values_equal(
            &json!({"a": [1, {"b": null}], "c": true}),
            &json!({"c": true, "a": [1.0, {"b": null}]})
        ));
        assert!(!values_equal(&json!([1, 2]), &json!([2, 1])));
        assert!(!values_equal(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(!values_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!values_equal(&json!({"a": 1}), &json!({"b": 1})));
        assert!(!values_equal(&json!(null), &json!(false)));
    }
}
