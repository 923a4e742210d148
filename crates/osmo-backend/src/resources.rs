//! Node resource reporting (spec §4.8 `get_resources()`, §4.7 input).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// GPU/CPU/memory usage split into workflow-attributed and non-workflow
/// (spec §4.7 `non_workflow_usage`, §4.8 "current usage (workflow vs
/// non-workflow)").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeUsage {
    pub gpu_allocatable: i64,
    pub gpu_workflow_usage: i64,
    pub gpu_non_workflow_usage: i64,
}

/// One node as reported by a backend's `get_resources()` (spec §4.8).
/// `exposed_fields` carries derived per-field values (including
/// `"pool/platform"`, walked by the Pool Quota Engine, spec §4.7 step 2) and
/// `platform_workflow_allocatable_fields`, referenced by per-node resource
/// assertions (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResource {
    pub backend: String,
    pub hostname: String,
    pub labels: BTreeMap<String, String>,
    pub taints: Vec<Value>,
    pub usage: NodeUsage,
    pub exposed_fields: BTreeMap<String, Value>,
    pub pools: Vec<String>,
    pub platform: Option<String>,
}

impl NodeResource {
    /// The `"pool/platform"` exposed field the quota engine walks (spec
    /// §4.7 step 2): each entry is `"{pool}/{platform}"`.
    pub fn pool_platform_pairs(&self) -> Vec<String> {
        self.pools
            .iter()
            .map(|pool| format!("{pool}/{}", self.platform.as_deref().unwrap_or("")))
            .collect()
    }
}
