//! # Field-Level Merge
//!
//! Last-writer-wins merge of JSON object field bags, used by the
//! coalescing algorithm to fold a run of outbox ops for the same entity
//! into one. Each field present in `patch` overwrites the same field in
//! `base`; fields absent from `patch` are left untouched.

use serde_json::{Map, Value};

/// Merges `patch` into `base`, field by field, last-writer-wins.
pub fn merge_fields(base: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        base.insert(key.clone(), value.clone());
    }
}

/// Merges `patch` into a clone of `base` and returns the result, leaving
/// both inputs untouched.
pub fn merged(base: &Map<String, Value>, patch: &Map<String, Value>) -> Map<String, Value> {
    let mut out = base.clone();
    merge_fields(&mut out, patch);
    out
}

/// Removes the given keys from a field bag, used to strip client-only
/// fields (e.g. `version`) before merge or before sending over the wire.
pub fn without_keys(map: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    map.iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn later_field_overwrites_earlier_field() {
        let base = obj(json!({"status": 1, "comment": "first"}));
        let patch = obj(json!({"comment": "second"}));
        let result = merged(&base, &patch);
        assert_eq!(result["status"], json!(1));
        assert_eq!(result["comment"], json!("second"));
    }

    #[test]
    fn patch_fields_not_in_base_are_added() {
        let base = obj(json!({"status": 1}));
        let patch = obj(json!({"comment": "added"}));
        let result = merged(&base, &patch);
        assert_eq!(result["comment"], json!("added"));
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn without_keys_strips_named_fields() {
        let map = obj(json!({"version": 3, "comment": "x"}));
        let stripped = without_keys(&map, &["version"]);
        assert!(!stripped.contains_key("version"));
        assert_eq!(stripped["comment"], json!("x"));
    }
}
