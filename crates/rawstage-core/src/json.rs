//! JSON helpers shared by the payload validators

use serde_json::{Map, Value as JsonValue};

/// Byte length of the compact serialized form of `value`
pub fn serialized_len(value: &JsonValue) -> usize {
    // Serializing a `serde_json::Value` cannot fail: all keys are strings.
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// Flatten a payload into `(leaf path, leaf value)` pairs, one per leaf.
///
/// Objects are descended and their keys joined with `.`. Everything else is
/// a leaf. Arrays are not descended; an array leaf is replaced by its
/// serialized text so it is size-checked like any other string. A scalar at
/// the top level gets the empty path.
///
/// Keys may contain `.` themselves, so two leaves can share a path. Both are
/// kept.
pub fn flatten(value: &JsonValue) -> Vec<(String, JsonValue)> {
    let mut output = Vec::new();
    match value {
        JsonValue::Object(map) => flatten_object(None, map, &mut output),
        leaf => output.push((String::new(), leaf_value(leaf))),
    }
    output
}

fn flatten_object(
    prefix: Option<&str>,
    map: &Map<String, JsonValue>,
    output: &mut Vec<(String, JsonValue)>,
) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            JsonValue::Object(nested) => flatten_object(Some(&path), nested, output),
            leaf => output.push((path, leaf_value(leaf))),
        }
    }
}

fn leaf_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Array(_) => JsonValue::String(value.to_string()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn leaf<'a>(flat: &'a [(String, JsonValue)], path: &str) -> Option<&'a JsonValue> {
        flat.iter().find(|(p, _)| p == path).map(|(_, v)| v)
    }

    #[test]
    fn flattens_nested_objects_with_dotted_paths() {
        let flat = flatten(&json!({
            "name": "alice",
            "address": { "city": "Paris", "geo": { "lat": 48.8 } },
            "active": true
        }));

        assert_eq!(leaf(&flat, "name"), Some(&json!("alice")));
        assert_eq!(leaf(&flat, "address.city"), Some(&json!("Paris")));
        assert_eq!(leaf(&flat, "address.geo.lat"), Some(&json!(48.8)));
        assert_eq!(leaf(&flat, "active"), Some(&json!(true)));
        assert_eq!(flat.len(), 4);
    }

    #[test]
    fn arrays_become_serialized_strings() {
        let flat = flatten(&json!({ "tags": ["a", "b"] }));
        assert_eq!(leaf(&flat, "tags"), Some(&json!("[\"a\",\"b\"]")));
    }

    #[test]
    fn top_level_scalar_uses_empty_path() {
        let flat = flatten(&json!("just a string"));
        assert_eq!(leaf(&flat, ""), Some(&json!("just a string")));
    }

    #[test]
    fn keeps_leaves_whose_dotted_paths_collide() {
        let flat = flatten(&json!({
            "a": { "b.c": "0123456789" },
            "a.b": { "c": "ok" }
        }));

        let colliding: Vec<&JsonValue> = flat
            .iter()
            .filter(|(path, _)| path == "a.b.c")
            .map(|(_, value)| value)
            .collect();
        assert_eq!(colliding.len(), 2);
        assert!(colliding.contains(&&json!("0123456789")));
        assert!(colliding.contains(&&json!("ok")));
    }

    #[test]
    fn empty_object_has_no_leaves() {
        assert!(flatten(&json!({})).is_empty());
    }

    #[test]
    fn serialized_len_counts_utf8_bytes() {
        // "é" is two bytes, plus the surrounding quotes
        assert_eq!(serialized_len(&json!("é")), 4);
        assert_eq!(serialized_len(&json!({"a":1})), 7);
    }
}
