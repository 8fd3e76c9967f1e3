//! JSON overlay merge semantics (§4.D).
//!
//! `merge(target, source)` folds `source` into `target` in place, later
//! (source) values winning. The exact precedence this protects: the
//! forward chain walk places the highest-priority patch last, so it is
//! always the `source` of the final merge call.

use serde_json::{Map, Value};

/// Recursively merges `source` into `target`.
///
/// - Both objects: keys are unioned; common keys recurse.
/// - Both arrays: replaced by `source`'s array, *unless* the containing
///   object key ends in `+`, handled one level up by [`merge_object`] (see
///   there — the `+`-suffix convention is a property of the *key*, not the
///   value, so it cannot be decided from the two array values alone).
/// - Scalars: `source` overwrites `target`.
/// - `source` is null: handled by the caller (object key is removed); a
///   bare top-level null passed to `merge` simply overwrites with null.
pub fn merge(target: &mut Value, source: &Value) {
    match (target.as_object_mut(), source.as_object()) {
        (Some(target_obj), Some(source_obj)) => {
            merge_object(target_obj, source_obj);
            return;
        }
        _ => {}
    }
    match (target.as_array_mut(), source.as_array()) {
        (Some(target_arr), Some(source_arr)) => {
            *target_arr = source_arr.clone();
            return;
        }
        _ => {}
    }
    *target = source.clone();
}

fn merge_object(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, source_value) in source {
        if let Some(base_key) = key.strip_suffix('+') {
            append_array(target, base_key, source_value);
            continue;
        }
        if source_value.is_null() {
            target.remove(key);
            continue;
        }
        match target.get_mut(key) {
            Some(target_value) => merge(target_value, source_value),
            None => {
                target.insert(key.clone(), source_value.clone());
            }
        }
    }
}

/// A key ending in `+` means "append to the array under the same name
/// without the `+`". If the target has no array there yet, one is
/// created. If `source_value` is not itself an array, it is appended as a
/// single element.
fn append_array(target: &mut Map<String, Value>, base_key: &str, source_value: &Value) {
    let entry = target
        .entry(base_key.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    let Some(arr) = entry.as_array_mut() else {
        // Target key exists but isn't an array: replace it with one
        // containing just the appended value(s), rather than silently
        // discarding the append.
        *entry = match source_value {
            Value::Array(items) => Value::Array(items.clone()),
            other => Value::Array(vec![other.clone()]),
        };
        return;
    };
    match source_value {
        Value::Array(items) => arr.extend(items.iter().cloned()),
        other => arr.push(other.clone()),
    }
}
