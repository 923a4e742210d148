//! Merge primitives shared by the Config Store's strategic-merge `patch` (spec §4.1)
//! and the Workflow Compiler's pod-template composition (spec §4.3 step 5).
//!
//! `recursive_dict_update` / `merge_lists_on_name` are kept as standalone,
//! reusable functions (not inlined into `patch`) because the original
//! implementation uses them for two distinct purposes: strategic-merge patching
//! of config objects, and name-keyed composition of pod-template container lists.

use serde_json::{Map, Value};

/// Merges `b` into `a`, recursing into nested objects. Lists are merged with
/// `list_merge` when both sides are lists, otherwise `b`'s list replaces `a`'s.
pub fn recursive_dict_update(
    mut a: Map<String, Value>,
    b: Map<String, Value>,
    list_merge: Option<fn(Vec<Value>, Vec<Value>) -> Vec<Value>>,
) -> Map<String, Value> {
    for (key, value) in b {
        match value {
            Value::Object(obj) => {
                let existing = match a.get(&key) {
                    Some(Value::Object(existing)) => existing.clone(),
                    _ => Map::new(),
                };
                a.insert(key, Value::Object(recursive_dict_update(existing, obj, list_merge)));
            }
            Value::Array(incoming) => {
                if let Some(merge_fn) = list_merge {
                    if let Some(Value::Array(existing)) = a.get(&key).cloned() {
                        a.insert(key, Value::Array(merge_fn(existing, incoming)));
                        continue;
                    }
                }
                a.insert(key, Value::Array(incoming));
            }
            other => {
                a.insert(key, other);
            }
        }
    }
    a
}

/// Merges two lists of objects keyed on their `"name"` field: items sharing a
/// name are recursively merged (via [`recursive_dict_update`] with this same
/// function for nested lists); unmatched items from `l2` are appended.
pub fn merge_lists_on_name(mut l1: Vec<Value>, l2: Vec<Value>) -> Vec<Value> {
    use std::collections::HashMap;

    let mut name_to_index: HashMap<String, usize> = HashMap::new();
    for (i, item) in l1.iter().enumerate() {
        if let Some(name) = item.get("name").and_then(Value::as_str) {
            name_to_index.insert(name.to_string(), i);
        }
    }

    let mut unmatched = Vec::new();
    for item in l2 {
        let name = item.get("name").and_then(Value::as_str).map(str::to_string);
        match name.and_then(|n| name_to_index.get(&n).copied()) {
            Some(index) => {
                let existing = std::mem::take(&mut l1[index]);
                let merged = match (existing, item) {
                    (Value::Object(existing), Value::Object(incoming)) => Value::Object(
                        recursive_dict_update(existing, incoming, Some(merge_lists_on_name)),
                    ),
                    (_, incoming) => incoming,
                };
                l1[index] = merged;
            }
            None => unmatched.push(item),
        }
    }
    l1.extend(unmatched);
    l1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn recursive_update_merges_nested_scalars() {
        let a = obj(json!({"containers": [], "replicas": 1}));
        let b = obj(json!({"replicas": 3, "labels": {"app": "x"}}));
        let merged = recursive_dict_update(a, b, None);
        assert_eq!(merged["replicas"], json!(3));
        assert_eq!(merged["labels"], json!({"app": "x"}));
    }

    #[test]
    fn merge_lists_on_name_merges_matching_and_appends_rest() {
        let l1 = vec![json!({"name": "user", "resources": {"limits": {"cpu": "2"}}})];
        let l2 = vec![
            json!({"name": "user", "resources": {"limits": {"memory": "4Gi"}}}),
            json!({"name": "sidecar", "image": "proxy"}),
        ];
        let merged = merge_lists_on_name(l1, l2);
        assert_eq!(merged.len(), 2);
        assert_eq!(
            merged[0]["resources"]["limits"],
            json!({"cpu": "2", "memory": "4Gi"})
        );
        assert_eq!(merged[1]["name"], json!("sidecar"));
    }
}
