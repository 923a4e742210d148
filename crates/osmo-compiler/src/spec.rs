//! Typed workflow spec (spec §4.3 step 1, §6 "Workflow spec").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CompileError;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TimeoutSpec {
    pub exec_timeout: Option<String>,
    pub queue_timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceSpec {
    pub platform: Option<String>,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_storage")]
    pub storage: String,
    #[serde(default)]
    pub gpu: i64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub tolerations: Vec<Value>,
    #[serde(rename = "nodesExcluded", default)]
    pub nodes_excluded: Vec<String>,
    #[serde(rename = "cacheSize", default)]
    pub cache_size: Option<u64>,
}

fn default_memory() -> String {
    "0Gi".to_string()
}
fn default_storage() -> String {
    "0Gi".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopologyRequirement {
    pub key: String,
    pub group: String,
    #[serde(default)]
    pub required: bool,
}

/// An `inputs[]` entry: exactly one of `task`, `group`, `url`, `dataset`,
/// `update_dataset` is set (spec §6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputSpec {
    pub task: Option<String>,
    pub group: Option<String>,
    pub url: Option<String>,
    pub dataset: Option<String>,
    pub update_dataset: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl InputSpec {
    /// The symbol this input references for DAG ordering, if any (spec §4.3
    /// step 4). `url`/`dataset`/`update_dataset` carry no intra-workflow
    /// ordering constraint.
    pub fn dag_symbol(&self) -> Option<&str> {
        self.task.as_deref().or(self.group.as_deref())
    }

    /// A cross-workflow input of the form `{prev_workflow_id}:{task_name}`
    /// (spec §4.3 step 4).
    pub fn cross_workflow_reference(&self) -> Option<(String, String)> {
        let raw = self.task.as_deref()?;
        let (workflow_id, task_name) = raw.split_once(':')?;
        Some((workflow_id.to_string(), task_name.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TaskSpec {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default = "default_resources_ref")]
    pub resources: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<Value>,
    #[serde(default)]
    pub credentials: BTreeMap<String, Value>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default, rename = "hostNetwork")]
    pub host_network: bool,
    #[serde(default, rename = "volumeMounts")]
    pub volume_mounts: Vec<Value>,
    #[serde(default, rename = "exitActions")]
    pub exit_actions: Value,
    #[serde(default)]
    pub lead: bool,
    #[serde(rename = "cacheSize", default)]
    pub cache_size: Option<u64>,
    #[serde(default)]
    pub topology: Vec<TopologyRequirement>,
}

fn default_resources_ref() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupSpec {
    pub name: String,
    #[serde(default)]
    pub barrier: bool,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkflowSpec {
    pub name: String,
    pub pool: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,
    #[serde(default)]
    pub timeout: TimeoutSpec,
    pub groups: Vec<GroupSpec>,
}

/// The raw shape read off the wire, before normalization (spec §4.3 step 1-2).
#[derive(Debug, Deserialize)]
struct RawWorkflowSpec {
    name: String,
    pool: Option<String>,
    #[serde(default)]
    resources: BTreeMap<String, ResourceSpec>,
    #[serde(default)]
    timeout: TimeoutSpec,
    groups: Option<Vec<GroupSpec>>,
    tasks: Option<Vec<TaskSpec>>,
}

/// Parses the rendered spec's `workflow:` block and normalizes bare
/// `tasks[]` into singleton groups `{task-name}-group` (spec §4.3 steps 1-2).
pub fn parse_workflow_spec(value: &Value) -> Result<WorkflowSpec, CompileError> {
    let raw: RawWorkflowSpec =
        serde_json::from_value(value.clone()).map_err(|e| CompileError::Parse(e.to_string()))?;

    let groups = match (raw.groups, raw.tasks) {
        (Some(_), Some(_)) => return Err(CompileError::ShapeAmbiguous("both `groups` and `tasks`")),
        (None, None) => return Err(CompileError::ShapeAmbiguous("neither `groups` nor `tasks`")),
        (Some(groups), None) => groups,
        (None, Some(tasks)) => tasks
            .into_iter()
            .map(|task| GroupSpec {
                name: format!("{}-group", task.name),
                barrier: false,
                inputs: task
                    .inputs
                    .iter()
                    .filter(|i| i.dag_symbol().is_some())
                    .cloned()
                    .collect(),
                tasks: vec![task],
            })
            .collect(),
    };

    Ok(WorkflowSpec {
        name: raw.name,
        pool: raw.pool,
        resources: raw.resources,
        timeout: raw.timeout,
        groups,
    })
}
