//! `{{USER_*}}` token resolution (spec §4.3 step 5, §9 "Dynamic overlays").
//!
//! `{{K8_*}}` tokens reference per-node facts that only exist once a
//! candidate node is known; they are left untouched here and resolved later,
//! against `platform_workflow_allocatable_fields`, by `osmo-admission`'s
//! per-node assertion evaluator (spec §4.4).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::CompileError;
use crate::spec::ResourceSpec;

/// Binary scale suffixes the spec calls out explicitly (spec §4.3 step 5):
/// bare (with unit), `_VAL`, `_UNIT`, and `_{B,Ki,Mi,Gi,Ti,m}`.
const SCALES: &[(&str, f64)] = &[
    ("B", 1.0),
    ("KI", 1024.0),
    ("MI", 1024.0 * 1024.0),
    ("GI", 1024.0 * 1024.0 * 1024.0),
    ("TI", 1024.0 * 1024.0 * 1024.0 * 1024.0),
    ("M", 0.001), // milli-unit, matching K8s' `m` suffix for sub-unit quantities
];

/// Parses a Kubernetes-style quantity string (`"4Gi"`, `"512Mi"`, `"2"`) into
/// `(value, unit)`, where `unit` is the trailing non-digit suffix.
fn split_quantity(raw: &str) -> Result<(f64, String), CompileError> {
    let trimmed = raw.trim();
    let split_at = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split_at);
    let value: f64 = number.parse().map_err(|_| CompileError::BadQuantity(raw.to_string()))?;
    Ok((value, unit.to_string()))
}

fn quantity_to_bytes(raw: &str) -> Result<f64, CompileError> {
    let (value, unit) = split_quantity(raw)?;
    let multiplier = match unit.to_uppercase().as_str() {
        "" | "B" => 1.0,
        "KI" => 1024.0,
        "MI" => 1024.0 * 1024.0,
        "GI" => 1024.0 * 1024.0 * 1024.0,
        "TI" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        "K" => 1_000.0,
        "M" => 1_000_000.0,
        "G" => 1_000_000_000.0,
        "T" => 1_000_000_000_000.0,
        _ => return Err(CompileError::BadQuantity(raw.to_string())),
    };
    Ok(value * multiplier)
}

/// Expands a bare/`_VAL`/`_UNIT`/`_{B,Ki,Mi,Gi,Ti,m}` family of tokens for one
/// quantity field (spec §4.3 step 5).
fn quantity_tokens(prefix: &str, raw: &str) -> Result<BTreeMap<String, Value>, CompileError> {
    let mut out = BTreeMap::new();
    let (value, unit) = split_quantity(raw)?;
    out.insert(prefix.to_string(), Value::String(raw.to_string()));
    out.insert(format!("{prefix}_VAL"), json_number(value));
    out.insert(format!("{prefix}_UNIT"), Value::String(unit));

    let bytes = quantity_to_bytes(raw)?;
    for (scale, multiplier) in SCALES {
        out.insert(format!("{prefix}_{scale}"), json_number(bytes / multiplier));
    }
    Ok(out)
}

fn json_number(value: f64) -> Value {
    serde_json::Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

/// Builds the full `{{USER_*}}` token map for one resource spec (spec §4.3
/// step 5). `USER_CPU`/`USER_GPU` are numeric counts; `USER_EXCLUDED_NODES`
/// is a list token spliced into list-valued fields by [`crate::podspec`].
pub fn user_tokens(resource: &ResourceSpec) -> Result<BTreeMap<String, Value>, CompileError> {
    let mut tokens = BTreeMap::new();
    tokens.insert("USER_CPU".to_string(), json_number(resource.cpu));
    tokens.insert("USER_GPU".to_string(), Value::Number(resource.gpu.into()));
    tokens.extend(quantity_tokens("USER_MEMORY", &resource.memory)?);
    tokens.extend(quantity_tokens("USER_STORAGE", &resource.storage)?);
    tokens.insert(
        "USER_EXCLUDED_NODES".to_string(),
        Value::Array(resource.nodes_excluded.iter().cloned().map(Value::String).collect()),
    );
    Ok(tokens)
}

/// Substitutes `{{TOKEN}}` placeholders throughout `value`. A field whose
/// entire string value is exactly one token is replaced by the token's typed
/// value (preserving numbers/arrays); a token embedded in a larger string is
/// replaced textually. Fields that resolve to null/empty/an empty list are
/// dropped from their containing object, matching how an unset
/// `USER_STORAGE` removes `ephemeral-storage` rather than leaving a literal
/// placeholder (spec §9).
pub fn substitute_tokens(value: &Value, tokens: &BTreeMap<String, Value>) -> Value {
    match value {
        Value::String(s) => substitute_string(s, tokens),
        Value::Array(items) => {
            let mut expanded = Vec::new();
            for item in items {
                if let Value::String(s) = item {
                    if let Some(token_name) = exact_token(s) {
                        if let Some(Value::Array(list)) = tokens.get(token_name) {
                            expanded.extend(list.iter().cloned());
                            continue;
                        }
                    }
                }
                expanded.push(substitute_tokens(item, tokens));
            }
            Value::Array(expanded)
        }
        Value::Object(map) => {
            let mut result = serde_json::Map::new();
            for (key, v) in map {
                let substituted = substitute_tokens(v, tokens);
                if is_empty(&substituted) {
                    continue;
                }
                result.insert(key.clone(), substituted);
            }
            Value::Object(result)
        }
        other => other.clone(),
    }
}

fn is_empty(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::Array(a) if a.is_empty())
}

fn exact_token(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("{{")?.strip_suffix("}}")?;
    Some(inner.trim())
}

fn substitute_string(s: &str, tokens: &BTreeMap<String, Value>) -> Value {
    if let Some(name) = exact_token(s) {
        if let Some(resolved) = tokens.get(name) {
            return resolved.clone();
        }
        if name.starts_with("K8_") {
            return Value::String(s.to_string());
        }
        return Value::Null;
    }

    let mut result = s.to_string();
    for (name, resolved) in tokens {
        let placeholder = format!("{{{{{name}}}}}");
        if result.contains(&placeholder) {
            let text = match resolved {
                Value::String(v) => v.clone(),
                other => other.to_string(),
            };
            result = result.replace(&placeholder, &text);
        }
    }
    Value::String(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(cpu: f64, gpu: i64, memory: &str, storage: &str) -> ResourceSpec {
        ResourceSpec {
            platform: None,
            cpu,
            memory: memory.to_string(),
            storage: storage.to_string(),
            gpu,
            labels: BTreeMap::new(),
            tolerations: vec![],
            nodes_excluded: vec!["node-a".to_string()],
            cache_size: None,
        }
    }

    #[test]
    fn memory_expands_to_all_scales() {
        let tokens = user_tokens(&resource(1.0, 0, "4Gi", "10Gi")).unwrap();
        assert_eq!(tokens["USER_MEMORY"], json!("4Gi"));
        assert_eq!(tokens["USER_MEMORY_VAL"], json!(4.0));
        assert_eq!(tokens["USER_MEMORY_UNIT"], json!("Gi"));
        assert_eq!(tokens["USER_MEMORY_GI"], json!(4.0));
        assert_eq!(tokens["USER_MEMORY_MI"], json!(4096.0));
    }

    #[test]
    fn excluded_nodes_splices_into_list_field() {
        let tokens = user_tokens(&resource(1.0, 0, "1Gi", "1Gi")).unwrap();
        let field = json!({"excluded": ["static-node", "{{USER_EXCLUDED_NODES}}"]});
        let substituted = substitute_tokens(&field, &tokens);
        assert_eq!(substituted["excluded"], json!(["static-node", "node-a"]));
    }

    #[test]
    fn unset_storage_removes_the_field_rather_than_leaving_a_placeholder() {
        let mut tokens = user_tokens(&resource(1.0, 0, "1Gi", "1Gi")).unwrap();
        tokens.remove("USER_STORAGE");
        let field = json!({"ephemeral-storage": "{{USER_STORAGE}}", "cpu": "1"});
        let substituted = substitute_tokens(&field, &tokens);
        assert_eq!(substituted, json!({"cpu": "1"}));
    }

    #[test]
    fn k8_tokens_are_left_untouched() {
        let tokens = user_tokens(&resource(1.0, 0, "1Gi", "1Gi")).unwrap();
        let field = json!("{{K8_ALLOCATABLE_GPU}}");
        let substituted = substitute_tokens(&field, &tokens);
        assert_eq!(substituted, json!("{{K8_ALLOCATABLE_GPU}}"));
    }
}
