//! Secret-obfuscating diff for the `diff` operation (spec §4.1 "Secret diffing").
//!
//! A config value is a secret leaf when it is a single-key object
//! `{"$secret": "<value>"}`, the workspace's stand-in for the original's
//! `SecretStr` wrapper type (there is no equivalent dynamic wrapper type in
//! `serde_json::Value`).

use serde_json::{Map, Value};

const SECRET_KEY: &str = "$secret";

pub fn is_secret_leaf(value: &Value) -> bool {
    matches!(value, Value::Object(obj) if obj.len() == 1 && obj.contains_key(SECRET_KEY))
}

/// Recursively walks `first` (older) and `second` (newer), replacing any
/// secret value present in both that changed with a sentinel naming the
/// newer revision. Keys only present in `second` pass through unchanged;
/// unchanged secrets are returned as-is (still opaque to the caller).
pub fn diff_secret_strs(first: &Value, second: &Value, second_revision: u64) -> Value {
    match (first, second) {
        (Value::Object(first), Value::Object(second)) if !is_secret_leaf(&Value::Object(first.clone())) => {
            let mut result = Map::new();
            for (key, value) in second {
                match first.get(key) {
                    Some(first_value) => {
                        result.insert(key.clone(), diff_secret_strs(first_value, value, second_revision));
                    }
                    None => {
                        result.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Object(result)
        }
        (Value::Array(first), Value::Array(second)) => {
            let mut result = Vec::with_capacity(second.len());
            for (i, item) in second.iter().enumerate() {
                match first.get(i) {
                    Some(first_item) => result.push(diff_secret_strs(first_item, item, second_revision)),
                    None => result.push(item.clone()),
                }
            }
            Value::Array(result)
        }
        (first, second) if is_secret_leaf(first) && is_secret_leaf(second) => {
            if first != second {
                Value::String(format!("********** <secret changed in r{second_revision}>"))
            } else {
                second.clone()
            }
        }
        (_, second) => second.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changed_secret_is_replaced_with_sentinel() {
        let first = json!({"token": {"$secret": "abc"}, "name": "x"});
        let second = json!({"token": {"$secret": "def"}, "name": "x"});
        let diffed = diff_secret_strs(&first, &second, 7);
        assert_eq!(diffed["token"], json!("********** <secret changed in r7>"));
        assert_eq!(diffed["name"], json!("x"));
    }

    #[test]
    fn unchanged_secret_stays_opaque() {
        let first = json!({"token": {"$secret": "abc"}});
        let second = json!({"token": {"$secret": "abc"}});
        let diffed = diff_secret_strs(&first, &second, 7);
        assert_eq!(diffed["token"], json!({"$secret": "abc"}));
    }

    #[test]
    fn key_absent_from_first_passes_through() {
        let first = json!({});
        let second = json!({"new_field": {"$secret": "zzz"}});
        let diffed = diff_secret_strs(&first, &second, 3);
        assert_eq!(diffed["new_field"], json!({"$secret": "zzz"}));
    }
}
