//! The core data model (spec §3): Workflow, TaskGroup, Task, and the
//! Pool/Platform/PodTemplate/Backend/Credential configuration objects.
//! These are plain data types; the operations that create and transition
//! them live in `osmo-compiler`, `osmo-state`, and `osmo-quota`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::{Priority, TaskStatus, WorkflowStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_uuid: String,
    pub workflow_name: String,
    pub job_id: u64,
    pub submitted_by: String,
    pub backend: String,
    pub pool: String,
    pub priority: Priority,
    pub status: WorkflowStatus,
    pub submit_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub exec_timeout: Option<i64>,
    pub queue_timeout: Option<i64>,
    pub parent_name: Option<String>,
    pub parent_job_id: Option<u64>,
    pub app_uuid: Option<String>,
    pub app_version: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub plugins: Value,
    pub cancelled_by: Option<String>,
    pub failure_message: Option<String>,
    pub logs: Option<String>,
    pub outputs: Option<String>,
}

impl Workflow {
    /// `workflow_id = "{name}-{job_id}"` (spec §3 invariant 1).
    pub fn workflow_id(&self) -> String {
        crate::ids::construct_workflow_id(&self.workflow_name, self.job_id)
    }

    /// Finished workflows never have `end_time` cleared (spec §3 invariant 4).
    pub fn is_finished(&self) -> bool {
        self.status.finished()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub group_uuid: String,
    pub workflow_id: String,
    pub name: String,
    pub spec: Value,
    pub status: TaskStatus,
    pub remaining_upstream_groups: BTreeSet<String>,
    pub downstream_groups: BTreeSet<String>,
    pub barrier: bool,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl TaskGroup {
    pub fn upstream_satisfied(&self) -> bool {
        self.remaining_upstream_groups.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceCounters {
    pub cpu: f64,
    pub memory_bytes: i64,
    pub gpu: i64,
    pub storage_bytes: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Stable across retries (spec §3).
    pub task_db_key: String,
    /// Unique per attempt.
    pub task_uuid: String,
    pub workflow_id: String,
    pub name: String,
    pub retry_id: u32,
    pub group_name: String,
    pub status: TaskStatus,
    pub node_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub resources: ResourceCounters,
    pub exit_actions: Vec<Value>,
    /// One per group (spec §3).
    pub lead: bool,
}

impl Task {
    /// `(workflow_id, task_name, retry_id)` uniquely identifies an attempt
    /// (spec §3 invariant 2).
    pub fn attempt_key(&self) -> (String, String, u32) {
        (self.workflow_id.clone(), self.name.clone(), self.retry_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuQuota {
    /// -1 means unbounded (spec §3).
    pub guarantee: i64,
    pub maximum: i64,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyKey {
    pub key: String,
    pub label: String,
}

/// An opaque pod-spec fragment, merged in order to build a task's effective pod
/// (spec §3: "base → merge(common pod templates) → merge(platform template) →
/// merge(task inputs)").
pub type PodTemplate = Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub tolerations: Vec<Value>,
    pub pod_template: Option<PodTemplate>,
    pub validations: Vec<Value>,
    pub default_variables: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub name: String,
    pub backend: String,
    pub default_platform: String,
    pub platforms: BTreeMap<String, Platform>,
    pub common_pod_template: Vec<String>,
    pub common_resource_validations: Vec<Value>,
    pub common_default_variables: BTreeMap<String, Value>,
    pub gpu: GpuQuota,
    pub topology_keys: Vec<TopologyKey>,
    pub max_exec_timeout: Option<i64>,
    pub default_exec_timeout: Option<i64>,
    pub max_queue_timeout: Option<i64>,
    pub default_queue_timeout: Option<i64>,
    pub enable_maintenance: bool,
}

impl Pool {
    pub fn platform(&self, name: &str) -> Option<&Platform> {
        self.platforms.get(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub scheduler_type: String,
    pub scheduler_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backend {
    pub name: String,
    pub scheduler: SchedulerSettings,
    pub k8s_namespace: String,
    pub node_conditions_prefix: String,
    pub tests: Option<Value>,
    pub router_address: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl Backend {
    /// Online iff the last heartbeat was within 2 minutes (spec §3).
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        match self.last_heartbeat {
            Some(hb) => now.signed_duration_since(hb).num_seconds() <= 120,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigRevision {
    pub config_type: String,
    pub name: String,
    /// Monotonic per `config_type`, shared across every `name` of that type
    /// (spec §3, §4.1 "History").
    pub revision: u64,
    pub data: Value,
    pub username: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
}

/// A per-user named credential. Only the wrapped ciphertext and the key
/// version used to wrap it are stored; see `osmo-storage::encryption` for
/// the envelope-encryption scheme (spec §3, §4.1 "Secrets").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub owner: String,
    pub name: String,
    pub kind: String,
    pub ciphertext: Vec<u8>,
    pub key_version: u32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_id_matches_construction_rule() {
        let workflow = Workflow {
            workflow_uuid: "00000000000000000000000000000000".into(),
            workflow_name: "nightly-build".into(),
            job_id: 42,
            submitted_by: "alice".into(),
            backend: "prod".into(),
            pool: "default".into(),
            priority: Priority::Normal,
            status: WorkflowStatus::Pending,
            submit_time: Utc::now(),
            start_time: None,
            end_time: None,
            exec_timeout: None,
            queue_timeout: None,
            parent_name: None,
            parent_job_id: None,
            app_uuid: None,
            app_version: None,
            tags: BTreeMap::new(),
            plugins: Value::Null,
            cancelled_by: None,
            failure_message: None,
            logs: None,
            outputs: None,
        };
        assert_eq!(workflow.workflow_id(), "nightly-build-42");
        assert!(!workflow.is_finished());
    }

    #[test]
    fn backend_online_window_is_two_minutes() {
        let mut backend = Backend {
            name: "prod".into(),
            scheduler: SchedulerSettings {
                scheduler_type: "kai".into(),
                scheduler_name: "kai-scheduler".into(),
            },
            k8s_namespace: "osmo".into(),
            node_conditions_prefix: "osmo.nvidia.com".into(),
            tests: None,
            router_address: None,
            last_heartbeat: Some(Utc::now()),
        };
        assert!(backend.is_online(Utc::now()));
        backend.last_heartbeat = Some(Utc::now() - chrono::Duration::seconds(121));
        assert!(!backend.is_online(Utc::now()));
    }
}
