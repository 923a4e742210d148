//! Strategic-merge patch semantics for the Config Store (spec §4.1).
//!
//! Distinct from [`osmo_types::merge::recursive_dict_update`]: a patch's list
//! entries carry `$index`/`$action` markers that never appear in pod-template
//! composition, so this lives alongside the config store rather than in the
//! shared primitives crate.

use serde_json::{Map, Value};

const ACTION_KEY: &str = "$action";
const INDEX_KEY: &str = "$index";
const ACTION_DELETE: &str = "delete";
const ACTION_REPLACE: &str = "replace";

/// Applies a strategic-merge `patch` on top of `base` (spec §4.1).
pub fn apply_patch(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => Value::Object(apply_object_patch(base, patch)),
        (_, patch) => patch,
    }
}

fn apply_object_patch(mut base: Map<String, Value>, patch: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in patch {
        match value {
            Value::Object(obj) if is_delete_marker(&obj) => {
                base.remove(&key);
            }
            Value::Object(obj) => {
                let existing = match base.get(&key) {
                    Some(Value::Object(existing)) => existing.clone(),
                    _ => Map::new(),
                };
                base.insert(key, Value::Object(apply_object_patch(existing, obj)));
            }
            Value::Array(items) => {
                let existing = match base.get(&key) {
                    Some(Value::Array(existing)) => existing.clone(),
                    _ => Vec::new(),
                };
                base.insert(key, Value::Array(apply_list_patch(existing, items)));
            }
            other => {
                base.insert(key, other);
            }
        }
    }
    base
}

fn is_delete_marker(obj: &Map<String, Value>) -> bool {
    obj.get(ACTION_KEY).and_then(Value::as_str) == Some(ACTION_DELETE) && obj.len() == 1
}

/// A list patch applies positionally when items carry `$index`; otherwise the
/// incoming list replaces the existing one wholesale (spec §4.1).
fn apply_list_patch(mut existing: Vec<Value>, patch_items: Vec<Value>) -> Vec<Value> {
    if !patch_items.iter().all(is_indexed_dict) || patch_items.is_empty() {
        return strip_markers_from_list(patch_items);
    }

    for item in patch_items {
        let Value::Object(mut obj) = item else { unreachable!() };
        let index = obj.remove(INDEX_KEY).and_then(|v| v.as_u64()).unwrap_or_default() as usize;
        let action = obj.remove(ACTION_KEY).and_then(|v| v.as_str().map(str::to_string));

        match action.as_deref() {
            Some(ACTION_DELETE) => {
                if index < existing.len() {
                    existing.remove(index);
                }
            }
            Some(ACTION_REPLACE) => {
                let replacement = Value::Object(obj);
                if index < existing.len() {
                    existing[index] = replacement;
                } else {
                    existing.push(replacement);
                }
            }
            _ => {
                if let Some(Value::Object(current)) = existing.get(index).cloned() {
                    existing[index] = Value::Object(apply_object_patch(current, obj));
                } else if index < existing.len() {
                    existing[index] = Value::Object(obj);
                } else {
                    existing.push(Value::Object(obj));
                }
            }
        }
    }
    existing
}

fn is_indexed_dict(v: &Value) -> bool {
    matches!(v, Value::Object(obj) if obj.contains_key(INDEX_KEY))
}

fn strip_markers_from_list(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut obj) => {
                obj.remove(ACTION_KEY);
                obj.remove(INDEX_KEY);
                Value::Object(obj)
            }
            other => other,
        })
        .collect()
}
