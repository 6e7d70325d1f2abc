//! Canonical form for JSON values.
//!
//! Object keys are emitted in sorted order and array elements are sorted by
//! their canonical text, so two values that differ only in key order or
//! element order canonicalize to the same value.

use serde_json::{Map, Value};

/// Normalize a JSON value into its order-independent canonical form.
///
/// - objects: same entries, keys in sorted order, values canonicalized
/// - arrays: canonicalized elements, re-ordered by canonical text
/// - scalars: unchanged
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let mut sorted = Map::new();
            for key in keys {
                if let Some(item) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(item));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => {
            let mut canonical: Vec<(String, Value)> = items
                .iter()
                .map(|item| {
                    let item = canonicalize(item);
                    (item.to_string(), item)
                })
                .collect();
            canonical.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Array(canonical.into_iter().map(|(_, item)| item).collect())
        }
        _ => value.clone(),
    }
}

/// Compact, key-sorted text of the canonical form.
///
/// Equal canonical values always produce equal text; this is the key used
/// for row multisets.
pub fn canonical_text(value: &Value) -> String {
    canonicalize(value).to_string()
}
