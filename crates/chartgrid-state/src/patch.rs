//! JSON merge patches (RFC 7386) between two versions of an entity.
//!
//! `patch` writes only the fields that differ between the caller's base copy
//! and its desired copy, so concurrent writers touching other fields are not
//! clobbered.

use serde_json::{Map, Value};

/// Compute the merge patch that turns `base` into `desired`.
pub fn merge_diff(base: &Value, desired: &Value) -> Value {
    match (base, desired) {
        (Value::Object(b), Value::Object(d)) => {
            let mut patch = Map::new();
            for (key, dv) in d {
                match b.get(key) {
                    Some(bv) if bv == dv => {}
                    Some(bv) if bv.is_object() && dv.is_object() => {
                        patch.insert(key.clone(), merge_diff(bv, dv));
                    }
                    _ => {
                        patch.insert(key.clone(), dv.clone());
                    }
                }
            }
            for key in b.keys() {
                if !d.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        _ => desired.clone(),
    }
}

/// Apply a merge patch in place.
pub fn apply_merge(target: &mut Value, patch: &Value) {
    let Value::Object(entries) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(fields) = target {
        for (key, value) in entries {
            if value.is_null() {
                fields.remove(key);
            } else {
                apply_merge(fields.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// True when the patch changes nothing.
pub fn is_empty(patch: &Value) -> bool {
    matches!(patch, Value::Object(m) if m.is_empty())
}
