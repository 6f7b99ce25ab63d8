//! Annotated-node helpers
//!
//! An annotated node is an object with exactly two fields, `value` and
//! `source`, where `source` is a hash reference into the document's
//! top-level source map. These helpers are the single place that encodes
//! that shape.

use serde_json::{Map, Value};

pub const VALUE_FIELD: &str = "value";
pub const SOURCE_FIELD: &str = "source";
pub const CLASSIFICATION_FIELD: &str = "classification";

/// True iff the node carries a `{value, source}` pair and nothing else.
pub fn is_annotated(node: &Value) -> bool {
    match node.as_object() {
        Some(map) => {
            map.len() == 2 && map.contains_key(VALUE_FIELD) && map.contains_key(SOURCE_FIELD)
        }
        None => false,
    }
}

/// The `value` subtree of an annotated node.
pub fn annotated_value(node: &Value) -> Option<&Value> {
    if is_annotated(node) {
        node.get(VALUE_FIELD)
    } else {
        None
    }
}

/// The source hash of an annotated node.
pub fn annotated_source(node: &Value) -> Option<&str> {
    if is_annotated(node) {
        node.get(SOURCE_FIELD).and_then(Value::as_str)
    } else {
        None
    }
}

/// Wrap a subtree as an annotated leaf.
pub fn wrap(value: Value, src_hash: &str) -> Value {
    let mut map = Map::with_capacity(2);
    map.insert(VALUE_FIELD.to_string(), value);
    map.insert(SOURCE_FIELD.to_string(), Value::String(src_hash.to_string()));
    Value::Object(map)
}

/// Recursively remove annotation wrappers, yielding the plain document.
///
/// The top-level `source` map is left to the caller; this only unwraps
/// `{value, source}` pairs.
pub fn strip_annotations(node: &Value) -> Value {
    match node {
        Value::Object(map) => {
            if let Some(value) = annotated_value(node) {
                return strip_annotations(value);
            }
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                out.insert(key.clone(), strip_annotations(child));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(strip_annotations).collect()),
        other => other.clone(),
    }
}

/// The classification subtree of an array element, looking through an
/// annotation wrapper when the element is already annotated.
pub fn classification_of(element: &Value) -> Option<&Value> {
    let inner = annotated_value(element).unwrap_or(element);
    inner.get(CLASSIFICATION_FIELD)
}

/// An array is treated as classified when any element carries a
/// classification; elements missing one then fail fast downstream.
pub fn is_classified_array(items: &[Value]) -> bool {
    items.iter().any(|e| classification_of(e).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn annotated_shape_is_exact() {
        assert!(is_annotated(&json!({"value": 1, "source": "abc"})));
        assert!(!is_annotated(&json!({"value": 1})));
        assert!(!is_annotated(&json!({"value": 1, "source": "abc", "extra": 2})));
        assert!(!is_annotated(&json!([1, 2])));
        assert!(!is_annotated(&json!("value")));
    }

    #[test]
    fn strip_unwraps_nested_annotations() {
        let doc = json!({
            "title": {"value": "Alpha", "source": "aa"},
            "nested": {"inner": {"value": [1, 2], "source": "bb"}}
        });
        assert_eq!(
            strip_annotations(&doc),
            json!({"title": "Alpha", "nested": {"inner": [1, 2]}})
        );
    }

    #[test]
    fn classification_reads_through_wrapper() {
        let plain = json!({"classification": [{"realm": "isbn"}], "name": "x"});
        let wrapped = json!({"value": {"classification": [{"realm": "isbn"}]}, "source": "aa"});
        assert!(classification_of(&plain).is_some());
        assert!(classification_of(&wrapped).is_some());
        assert!(classification_of(&json!({"name": "x"})).is_none());
    }

    #[test]
    fn classified_array_detection() {
        let classified = vec![json!({"classification": [], "a": 1})];
        let plain = vec![json!({"a": 1}), json!({"b": 2})];
        assert!(is_classified_array(&classified));
        assert!(!is_classified_array(&plain));
        assert!(!is_classified_array(&[]));
    }
}
