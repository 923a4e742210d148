//! Admission & Validator (spec §4.4): static and per-node resource
//! assertions, security-policy checks, registry/data-backend credential
//! resolution, and tenant quota enforcement, run over a compiled workflow
//! before it is persisted and handed to the Scheduler Bridge.

pub mod assertions;
pub mod credentials;
pub mod error;
pub mod memo;
pub mod quota;
pub mod registry;
pub mod security;

pub use assertions::{evaluate_per_node, evaluate_static, CandidateNode, Operator, ResourceAssertion};
pub use credentials::{resolve_access, AccessMode, DataCredential};
pub use error::{AdmissionError, CandidateRejection};
pub use memo::AdmissionMemo;
pub use quota::{check_user_quota, UserWorkflowLimits};
pub use registry::{docker_parse, is_validation_disabled, resolve_and_pin, DockerImageInfo};
pub use security::{check_security, SecurityPolicy};

use std::collections::BTreeMap;

use osmo_compiler::CompiledWorkflow;
use serde_json::Value;

/// The three submission modes the spec's Open Questions call out
/// consolidating admission behind (`SPEC_FULL.md`/§9: "The `validation_only`
/// admission path duplicates a few checks; consolidating to a single
/// admission function that takes a `mode`"). `DryRun` and `Validate` run
/// every check but never persist or emit CRDs; `Submit` is the real path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    Validate,
    Submit,
    DryRun,
}

impl AdmissionMode {
    /// Whether this mode should go on to persist state and emit CRDs.
    pub fn persists(self) -> bool {
        matches!(self, AdmissionMode::Submit)
    }
}

/// Per-platform policy bundle the static/per-node/security checks run
/// against, resolved by the caller from the Config Store before admission.
pub struct PlatformPolicy {
    pub static_assertions: Vec<ResourceAssertion>,
    pub per_node_assertions: Vec<ResourceAssertion>,
    pub security: SecurityPolicy,
}

/// Runs every static and security assertion over a compiled workflow's
/// tasks (spec §4.4), consulting `memo` to avoid re-evaluating identical
/// `ResourceSpec`/security tuples. `user_tokens` supplies each task's
/// `{{USER_*}}` token map (already computed by the compiler's resource
/// resolution pass, spec §4.3 step 5), keyed by `(group name, task name)`.
/// Per-node assertions are evaluated separately once the Scheduler Bridge
/// has a candidate node list, since they depend on cluster state this
/// function does not have.
pub fn validate_static(
    workflow: &CompiledWorkflow,
    user_tokens: &BTreeMap<(String, String), BTreeMap<String, Value>>,
    policies: &BTreeMap<String, PlatformPolicy>,
    memo: &AdmissionMemo,
) -> Result<(), AdmissionError> {
    for group in &workflow.groups {
        for task in &group.tasks {
            let Some(policy) = policies.get(&task.platform) else { continue };
            let tokens = user_tokens.get(&(group.name.clone(), task.spec.name.clone())).cloned().unwrap_or_default();
            let static_key = AdmissionMemo::static_key(&Value::Object(
                tokens.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ));
            match memo.get_static(&static_key) {
                Some(Ok(())) => {}
                Some(Err(message)) => return Err(AdmissionError::StaticAssertionFailed(message)),
                None => {
                    let result = evaluate_static(&policy.static_assertions, &tokens);
                    memo.put_static(static_key, result.as_ref().map(|_| ()).map_err(|e| e.to_string()));
                    result?;
                }
            }

            let security_key = AdmissionMemo::security_key(
                task.spec.privileged,
                task.spec.host_network,
                &task.spec.volume_mounts,
                &task.platform,
            );
            match memo.get_security(&security_key) {
                Some(Ok(())) => {}
                Some(Err(message)) => return Err(AdmissionError::SecurityRejected(message)),
                None => {
                    let result = check_security(
                        task.spec.privileged,
                        task.spec.host_network,
                        &task.spec.volume_mounts,
                        &task.platform,
                        &policy.security,
                    );
                    memo.put_security(security_key, result.as_ref().map(|_| ()).map_err(|e| e.to_string()));
                    result?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_compiler::{AlwaysFinished, CompileContext, ServiceTimeoutDefaults};
    use osmo_types::{GpuQuota, Platform, Pool};
    use serde_json::json;

    #[test]
    fn dry_run_and_validate_do_not_persist() {
        assert!(!AdmissionMode::Validate.persists());
        assert!(!AdmissionMode::DryRun.persists());
        assert!(AdmissionMode::Submit.persists());
    }

    fn pool() -> Pool {
        let mut platforms = BTreeMap::new();
        platforms.insert(
            "cpu".to_string(),
            Platform {
                name: "cpu".into(),
                labels: BTreeMap::new(),
                tolerations: vec![],
                pod_template: None,
                validations: vec![],
                default_variables: BTreeMap::new(),
            },
        );
        Pool {
            name: "default".into(),
            backend: "prod".into(),
            default_platform: "cpu".into(),
            platforms,
            common_pod_template: vec![],
            common_resource_validations: vec![],
            common_default_variables: BTreeMap::new(),
            gpu: GpuQuota { guarantee: -1, maximum: -1, weight: 1.0 },
            topology_keys: vec![],
            max_exec_timeout: None,
            default_exec_timeout: None,
            max_queue_timeout: None,
            default_queue_timeout: None,
            enable_maintenance: false,
        }
    }

    #[test]
    fn validate_static_rejects_when_cpu_assertion_fails() {
        let rendered = json!({
            "name": "wf",
            "resources": {"default": {"cpu": 32, "memory": "4Gi", "storage": "1Gi", "gpu": 0}},
            "tasks": [{"name": "a", "image": "img"}],
        });
        let pool = pool();
        let pod_templates = BTreeMap::new();
        let ctx = CompileContext {
            pool: &pool,
            pod_templates: &pod_templates,
            service_timeouts: ServiceTimeoutDefaults::default(),
            max_num_tasks: 10,
        };
        let compiled = osmo_compiler::compile(&rendered, &ctx, &AlwaysFinished).unwrap();

        let mut user_tokens = BTreeMap::new();
        user_tokens.insert(("a-group".to_string(), "a".to_string()), BTreeMap::from([("USER_CPU".to_string(), json!(32.0))]));

        let mut policies = BTreeMap::new();
        policies.insert(
            "cpu".to_string(),
            PlatformPolicy {
                static_assertions: vec![ResourceAssertion {
                    operator: Operator::Le,
                    left_operand: "{{USER_CPU}}".into(),
                    right_operand: "16".into(),
                    assert_message: "cpu exceeds platform maximum".into(),
                }],
                per_node_assertions: vec![],
                security: SecurityPolicy::default(),
            },
        );

        let memo = AdmissionMemo::new(16);
        let err = validate_static(&compiled, &user_tokens, &policies, &memo).unwrap_err();
        assert!(matches!(err, AdmissionError::StaticAssertionFailed(m) if m == "cpu exceeds platform maximum"));
    }
}
