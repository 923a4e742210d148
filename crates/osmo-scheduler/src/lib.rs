//! The Scheduler Bridge (spec §4.5): turns a compiled workflow into the
//! native objects a backend's batch scheduler understands -- PodGroups,
//! pods, a per-pool Queue, and (when the pool has topology keys) a
//! Topology CRD -- behind a scheduler-agnostic seam (spec §9).

pub mod crds;
pub mod error;
pub mod factory;
pub mod kai;
pub mod labels;
pub mod podgroup;
pub mod topology;

use std::collections::BTreeMap;

use osmo_backend::cleanup::CleanupSpec;
use osmo_compiler::CompiledWorkflow;
use osmo_types::{Pool, Priority};
use serde_json::Value;

pub use crds::{build_queue, build_topology, default_queue_name, pool_queue_name, Queue, Topology};
pub use error::SchedulerError;
pub use factory::{SchedulerBackend, SchedulerKind};
pub use labels::{base_pod_labels, PodLabelInputs, SUBGROUP_NAME_LABEL};
pub use podgroup::{compose_group, ComposedGroup, GroupContext, PodGroupSpec, SubGroupSpec};
pub use topology::{build_topology_plan, TopologyConstraint, TopologyPlan, SubGroup as TopologySubGroup, TopologyTask};

/// Identifies the workflow and user a bridge pass is running for (spec
/// §4.5 "Pod labeling").
pub struct BridgeRequest<'a> {
    pub namespace: String,
    pub pool: &'a Pool,
    pub priority: Priority,
    pub workflow_uuid: &'a str,
    pub user: &'a str,
    /// `group name -> group uuid`, assigned by the State Machine before the
    /// bridge runs.
    pub group_uuids: &'a BTreeMap<String, String>,
    /// `(group name, task name) -> task uuid`.
    pub task_uuids: &'a BTreeMap<(String, String), String>,
}

/// Every native object one bridge pass produces for a compiled workflow:
/// one [`ComposedGroup`] per task-group, the pool's Queue, its Topology (if
/// configured), and the cleanup specs a backend uses to reclaim them later.
pub struct BridgeOutput {
    pub groups: Vec<ComposedGroup>,
    pub queue: Queue,
    pub topology: Option<Topology>,
    pub cleanup_specs: Vec<CleanupSpec>,
}

/// Runs the full bridge pass for one compiled workflow against one backend
/// (spec §4.5): builds the pool's Queue and Topology CRDs once, then
/// composes a PodGroup per task-group.
pub fn bridge(
    workflow: &CompiledWorkflow,
    backend: &dyn SchedulerBackend,
    req: &BridgeRequest<'_>,
) -> Result<BridgeOutput, SchedulerError> {
    let queue = backend.build_queue(&req.namespace, req.pool);
    let topology = backend.build_topology(&req.namespace, req.pool);

    let mut groups = Vec::with_capacity(workflow.groups.len());
    for group in &workflow.groups {
        let group_uuid = req.group_uuids.get(&group.name).cloned().unwrap_or_default();
        let task_uuids: BTreeMap<String, String> = group
            .tasks
            .iter()
            .filter_map(|t| {
                req.task_uuids
                    .get(&(group.name.clone(), t.spec.name.clone()))
                    .map(|uuid| (t.spec.name.clone(), uuid.clone()))
            })
            .collect();
        let ctx = GroupContext {
            namespace: req.namespace.clone(),
            pool: req.pool,
            priority: req.priority,
            workflow_uuid: req.workflow_uuid,
            group_uuid: &group_uuid,
            user: req.user,
            scheduler_name: backend.name(),
            queue_label_key: backend.queue_label_key(),
            supports_priority: backend.supports_priority(),
        };
        groups.push(backend.compose_group(group, &ctx, &task_uuids)?);
    }

    let cleanup_specs = cleanup_specs_for(workflow, &req.namespace, req.workflow_uuid);

    Ok(BridgeOutput { groups, queue, topology, cleanup_specs })
}

/// The cleanup specs reclaiming every native object a bridge pass for this
/// workflow creates (spec §4.5 "Cleanup specs"): one PodGroup-scoped spec
/// per label selector, keyed by `osmo.workflow_uuid` so a dead workflow's
/// objects are found regardless of which group or pool produced them.
fn cleanup_specs_for(workflow: &CompiledWorkflow, namespace: &str, workflow_uuid: &str) -> Vec<CleanupSpec> {
    let _ = (workflow, namespace);
    let labels: BTreeMap<String, String> = BTreeMap::from([("osmo.workflow_uuid".to_string(), workflow_uuid.to_string())]);
    vec![
        CleanupSpec { resource_type: "Pod".to_string(), labels: labels.clone(), custom_api: None },
        CleanupSpec {
            resource_type: "PodGroup".to_string(),
            labels,
            custom_api: Some(osmo_backend::cleanup::CustomApi {
                group: "scheduling.run.ai".to_string(),
                version: "v2alpha2".to_string(),
                plural: "podgroups".to_string(),
            }),
        },
    ]
}

/// Renders a bridge backend's native objects to the JSON the backend's API
/// actually accepts. Kept separate from [`bridge`] so callers that only need
/// the typed [`BridgeOutput`] (e.g. for planning or dry-run) don't pay for
/// serialization.
pub fn render_queue(backend: &dyn SchedulerBackend, queue: &Queue) -> Value {
    backend.queue_as_json(queue)
}

pub fn render_topology(backend: &dyn SchedulerBackend, topology: &Topology) -> Value {
    backend.topology_as_json(topology)
}
