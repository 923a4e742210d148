//! Effective-pod construction (spec §4.3 step 5): "base -> merge(common pod
//! templates, in order) -> merge(platform template) -> merge(task inputs)".

use std::collections::BTreeMap;

use osmo_types::merge::{merge_lists_on_name, recursive_dict_update};
use osmo_types::{Platform, Pool};
use serde_json::{json, Map, Value};

use crate::error::CompileError;
use crate::spec::{ResourceSpec, TaskSpec};
use crate::tokens::{substitute_tokens, user_tokens};

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn merge_fragment(base: Value, fragment: &Value) -> Value {
    Value::Object(recursive_dict_update(
        as_object(base),
        as_object(fragment.clone()),
        Some(merge_lists_on_name),
    ))
}

/// The pod's init shape: image, command, environment, and the `user`
/// container every task carries (spec §4.3 step 5 "Start from the init pod").
fn init_pod(task: &TaskSpec) -> Value {
    let env: Vec<Value> = task
        .environment
        .iter()
        .map(|(k, v)| json!({"name": k, "value": v}))
        .collect();

    json!({
        "containers": [{
            "name": "user",
            "image": task.image,
            "command": task.command,
            "env": env,
        }],
        "hostNetwork": task.host_network,
        "volumes": [],
        "volumeMounts": task.volume_mounts,
    })
}

/// Renders a resolved token value as an environment-variable string, printing
/// whole-number floats without a trailing `.0` (K8s-style quantities read as
/// plain integers for unitless fields like CPU counts).
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    return format!("{}", f as i64);
                }
            }
            n.to_string()
        }
        other => other.to_string(),
    }
}

fn privileged_fragment(task: &TaskSpec) -> Value {
    if !task.privileged {
        return json!({});
    }
    json!({"containers": [{"name": "user", "securityContext": {"privileged": true}}]})
}

/// Resolves `pool.common_default_variables ∪ platform.default_variables`
/// (platform wins on key collision) against `tokens`, and returns them as
/// `{name, value}` env entries to merge onto the `user` container (spec §4.3
/// step 5).
fn resolved_default_variable_env(
    pool: &Pool,
    platform: &Platform,
    tokens: &BTreeMap<String, Value>,
) -> Vec<Value> {
    let mut merged = pool.common_default_variables.clone();
    merged.extend(platform.default_variables.clone());

    merged
        .into_iter()
        .map(|(name, template)| {
            let resolved = substitute_tokens(&template, tokens);
            json!({"name": name, "value": stringify(&resolved)})
        })
        .collect()
}

/// Builds one task's effective pod spec (spec §4.3 step 5).
pub fn build_task_pod(
    task: &TaskSpec,
    resource: &ResourceSpec,
    pool: &Pool,
    platform: &Platform,
    pod_templates: &BTreeMap<String, Value>,
) -> Result<Value, CompileError> {
    let tokens = user_tokens(resource)?;

    let mut pod = init_pod(task);
    pod = merge_fragment(pod, &privileged_fragment(task));

    for template_name in &pool.common_pod_template {
        let fragment = pod_templates
            .get(template_name)
            .ok_or_else(|| CompileError::UnknownPodTemplate(template_name.clone()))?;
        pod = merge_fragment(pod, fragment);
    }

    pod = substitute_tokens(&pod, &tokens);

    let env_entries = resolved_default_variable_env(pool, platform, &tokens);
    if !env_entries.is_empty() {
        let env_patch = json!({"containers": [{"name": "user", "env": env_entries}]});
        pod = merge_fragment(pod, &env_patch);
    }

    if let Some(overlay) = &platform.pod_template {
        pod = merge_fragment(pod, overlay);
        pod = substitute_tokens(&pod, &tokens);
    }

    Ok(pod)
}
