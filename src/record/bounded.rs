// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Size-bounded serialization of captured payloads.
//!
//! Caller-supplied arguments and results can be arbitrarily large. Before a
//! value is stored it is converted to JSON and clipped:
//!
//! - strings longer than [`MAX_STRING_CHARS`] characters are cut and suffixed
//!   with [`TRUNCATION_MARKER`]
//! - sequences and maps with more than [`MAX_CONTAINER_ENTRIES`] entries keep
//!   the first entries plus a marker describing how many were dropped
//!
//! Values are never rejected. A value that fails to serialize becomes a
//! placeholder object naming its type.

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::Payload;

/// Maximum characters kept from any string value.
pub const MAX_STRING_CHARS: usize = 200;

/// Maximum entries kept from any sequence or map.
pub const MAX_CONTAINER_ENTRIES: usize = 100;

/// Suffix appended to truncated strings.
pub const TRUNCATION_MARKER: &str = "...[truncated]";

/// Key added to truncated maps, holding the number of dropped entries.
pub const TRUNCATED_KEY: &str = "__truncated__";

/// Key of the placeholder object used for unserializable values.
pub const UNSERIALIZABLE_KEY: &str = "__unserializable__";

/// Serialize any value into a bounded JSON value.
pub fn bounded_json<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(json) => bound_value(json),
        Err(e) => {
            let mut placeholder = Map::new();
            placeholder.insert(
                UNSERIALIZABLE_KEY.to_string(),
                Value::String(std::any::type_name::<T>().to_string()),
            );
            placeholder.insert("error".to_string(), bound_value(Value::String(e.to_string())));
            Value::Object(placeholder)
        }
    }
}

/// Serialize a value into a bounded payload map.
///
/// Objects are used as-is; any other value is stored under `key`.
pub fn bounded_payload<T: Serialize + ?Sized>(key: &str, value: &T) -> Payload {
    match bounded_json(value) {
        Value::Object(map) => map,
        Value::Null => Payload::new(),
        other => {
            let mut map = Payload::new();
            map.insert(key.to_string(), other);
            map
        }
    }
}

/// Clip a JSON value according to the size bounds.
pub fn bound_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(bound_string(s)),
        Value::Array(items) => {
            let total = items.len();
            let mut kept: Vec<Value> = items
                .into_iter()
                .take(MAX_CONTAINER_ENTRIES)
                .map(bound_value)
                .collect();
            if total > MAX_CONTAINER_ENTRIES {
                kept.push(Value::String(format!(
                    "... {} more items",
                    total - MAX_CONTAINER_ENTRIES
                )));
            }
            Value::Array(kept)
        }
        Value::Object(mut map) => {
            bound_map(&mut map);
            Value::Object(map)
        }
        scalar => scalar,
    }
}

/// Clip a map in place.
pub fn bound_map(map: &mut Map<String, Value>) {
    let total = map.len();
    let entries = std::mem::take(map);
    for (key, value) in entries.into_iter().take(MAX_CONTAINER_ENTRIES) {
        map.insert(key, bound_value(value));
    }
    if total > MAX_CONTAINER_ENTRIES {
        map.insert(
            TRUNCATED_KEY.to_string(),
            Value::from(total - MAX_CONTAINER_ENTRIES),
        );
    }
}

fn bound_string(s: String) -> String {
    match s.char_indices().nth(MAX_STRING_CHARS) {
        Some((cut, _)) => {
            let mut clipped = s[..cut].to_string();
            clipped.push_str(TRUNCATION_MARKER);
            clipped
        }
        None => s,
    }
}

/// Whether a value carries any truncation marker.
pub fn is_truncated(value: &Value) -> bool {
    match value {
        Value::String(s) => s.ends_with(TRUNCATION_MARKER),
        Value::Array(items) => items.iter().any(is_truncated),
        Value::Object(map) => map.contains_key(TRUNCATED_KEY) || map.values().any(is_truncated),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_short_values_unchanged() {
        let value = json!({"path": "src/main.rs", "lines": [1, 2, 3], "flag": true});
        assert_eq!(bound_value(value.clone()), value);
        assert!(!is_truncated(&value));
    }

    #[test]
    fn test_string_at_limit_unchanged() {
        let s = "a".repeat(MAX_STRING_CHARS);
        assert_eq!(bound_value(Value::String(s.clone())), Value::String(s));
    }

    #[test]
    fn test_long_string_truncated() {
        let s = "a".repeat(MAX_STRING_CHARS + 1);
        let bounded = bound_value(Value::String(s));
        let text = bounded.as_str().unwrap();
        assert_eq!(text.len(), MAX_STRING_CHARS + TRUNCATION_MARKER.len());
        assert!(is_truncated(&bounded));
    }

    #[test]
    fn test_multibyte_string_truncated_on_char_boundary() {
        let s = "é".repeat(MAX_STRING_CHARS * 2);
        let bounded = bound_value(Value::String(s));
        let text = bounded.as_str().unwrap();
        assert_eq!(
            text.trim_end_matches(TRUNCATION_MARKER).chars().count(),
            MAX_STRING_CHARS
        );
    }

    #[test]
    fn test_long_array_truncated() {
        let items: Vec<u32> = (0..250).collect();
        let bounded = bounded_json(&items);
        let array = bounded.as_array().unwrap();
        assert_eq!(array.len(), MAX_CONTAINER_ENTRIES + 1);
        assert_eq!(array[MAX_CONTAINER_ENTRIES], json!("... 150 more items"));
    }

    #[test]
    fn test_large_map_truncated() {
        let map: std::collections::BTreeMap<String, u32> =
            (0..150).map(|i| (format!("k{:03}", i), i)).collect();
        let bounded = bounded_json(&map);
        let object = bounded.as_object().unwrap();
        assert_eq!(object.len(), MAX_CONTAINER_ENTRIES + 1);
        assert_eq!(object[TRUNCATED_KEY], json!(50));
        assert!(is_truncated(&bounded));
    }

    #[test]
    fn test_nested_values_bounded() {
        let value = json!({"outer": {"inner": "z".repeat(1000)}});
        let bounded = bound_value(value);
        let inner = bounded["outer"]["inner"].as_str().unwrap();
        assert!(inner.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_payload_wraps_scalars() {
        let payload = bounded_payload("result", &42);
        assert_eq!(payload["result"], json!(42));

        let payload = bounded_payload("args", &json!({"a": 1}));
        assert_eq!(payload["a"], json!(1));

        let payload = bounded_payload("result", &());
        assert!(payload.is_empty());
    }

    #[test]
    fn test_unserializable_placeholder() {
        // Maps with non-string keys cannot be represented as JSON objects.
        let mut map = std::collections::HashMap::new();
        map.insert(vec![1u8], "value");
        let value = bounded_json(&map);
        assert!(value.get(UNSERIALIZABLE_KEY).is_some());
    }
}
