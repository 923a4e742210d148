//! PodGroup composition (spec §4.5 "PodGroup composition", §4.5.1).

use osmo_compiler::CompiledGroup;
use osmo_types::Priority;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crds::pool_queue_name;
use crate::error::SchedulerError;
use crate::labels::{base_pod_labels, PodLabelInputs, SUBGROUP_NAME_LABEL};
use crate::topology::{build_topology_plan, TopologyConstraint, TopologyTask};
use osmo_types::Pool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubGroupSpec {
    pub name: String,
    pub min_member: usize,
    pub topology_constraint: TopologyConstraint,
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodGroupSpec {
    pub name: String,
    pub namespace: String,
    /// `|pods in group|` (spec §4.5).
    pub min_member: usize,
    pub queue: String,
    pub priority_class: Option<String>,
    pub topology_constraint: Option<TopologyConstraint>,
    pub subgroups: Vec<SubGroupSpec>,
}

/// Context identifying the workflow/group this PodGroup belongs to, for pod
/// labeling (spec §4.5 "Pod labeling").
pub struct GroupContext<'a> {
    pub namespace: String,
    pub pool: &'a Pool,
    pub priority: Priority,
    pub workflow_uuid: &'a str,
    pub group_uuid: &'a str,
    pub user: &'a str,
    pub scheduler_name: &'a str,
    pub queue_label_key: &'a str,
    /// `None` when the target scheduler doesn't support priority classes
    /// (spec §4.5: "the bridge proceeds without priority annotations but
    /// still tracks priority in state").
    pub supports_priority: bool,
}

/// The output of composing one task-group: the PodGroup spec, any subgroups,
/// and every pod's finished JSON manifest (spec §4.5, §4.5.1).
pub struct ComposedGroup {
    pub pod_group: PodGroupSpec,
    pub pods: Vec<Value>,
}

/// Builds the PodGroup (and any subgroups) for one compiled task-group,
/// stamping every pod with the spec's required labels plus the scheduler
/// queue label and, when present, the subgroup-name label (spec §4.5,
/// §4.5.1 step 6).
pub fn compose_group(group: &CompiledGroup, ctx: &GroupContext<'_>, task_uuids: &std::collections::BTreeMap<String, String>) -> Result<ComposedGroup, SchedulerError> {
    let topology_tasks: Vec<TopologyTask<'_>> = group
        .tasks
        .iter()
        .map(|t| TopologyTask { task_name: t.spec.name.as_str(), requirements: &t.spec.topology })
        .collect();
    let plan = build_topology_plan(&group.name, &topology_tasks, &ctx.pool.topology_keys, &ctx.pool.name)?;

    let queue = pool_queue_name(&ctx.namespace, &ctx.pool.name);
    let priority_class = ctx.supports_priority.then(|| ctx.priority.priority_class().to_string());

    let mut pods = Vec::with_capacity(group.tasks.len());
    for task in &group.tasks {
        let task_uuid = task_uuids.get(&task.spec.name).cloned().unwrap_or_default();
        let mut labels = base_pod_labels(&PodLabelInputs {
            pool: &ctx.pool.name,
            priority: ctx.priority,
            task_name: &task.spec.name,
            task_uuid: &task_uuid,
            group_uuid: ctx.group_uuid,
            workflow_uuid: ctx.workflow_uuid,
            user: ctx.user,
        });
        labels.insert(ctx.queue_label_key.to_string(), queue.clone());
        if let Some(subgroup) = plan.task_subgroup.get(&task.spec.name) {
            labels.insert(SUBGROUP_NAME_LABEL.to_string(), subgroup.clone());
        }

        let mut pod = task.pod.clone();
        merge_pod_metadata(&mut pod, &labels, ctx.scheduler_name);
        pods.push(pod);
    }

    let pod_group = PodGroupSpec {
        name: format!("osmo-{}", ctx.group_uuid),
        namespace: ctx.namespace.clone(),
        min_member: group.tasks.len(),
        queue,
        priority_class,
        topology_constraint: plan.top_level,
        subgroups: plan
            .subgroups
            .into_iter()
            .map(|s| SubGroupSpec { name: s.name, min_member: s.min_member, topology_constraint: s.constraint, parent: s.parent })
            .collect(),
    };

    Ok(ComposedGroup { pod_group, pods })
}

fn merge_pod_metadata(pod: &mut Value, labels: &std::collections::BTreeMap<String, String>, scheduler_name: &str) {
    let obj = pod.as_object_mut().expect("pod is always a JSON object");
    let metadata = obj.entry("metadata").or_insert_with(|| Value::Object(serde_json::Map::new()));
    let metadata_obj = metadata.as_object_mut().expect("metadata is always a JSON object");
    let label_value = metadata_obj.entry("labels").or_insert_with(|| Value::Object(serde_json::Map::new()));
    let label_obj = label_value.as_object_mut().expect("labels is always a JSON object");
    for (k, v) in labels {
        label_obj.insert(k.clone(), Value::String(v.clone()));
    }
    // Scheduler name is set on every pod (spec §4.5 "PodGroup composition").
    obj.insert("schedulerName".to_string(), Value::String(scheduler_name.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_compiler::{CompiledTask, TaskSpec};
    use osmo_types::GpuQuota;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn pool() -> Pool {
        Pool {
            name: "default".into(),
            backend: "prod".into(),
            default_platform: "cpu".into(),
            platforms: BTreeMap::new(),
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

    fn task(name: &str) -> CompiledTask {
        CompiledTask {
            spec: TaskSpec {
                name: name.to_string(),
                image: "img".into(),
                command: vec![],
                environment: BTreeMap::new(),
                resources: "default".into(),
                inputs: vec![],
                outputs: vec![],
                credentials: BTreeMap::new(),
                privileged: false,
                host_network: false,
                volume_mounts: vec![],
                exit_actions: Value::Null,
                lead: false,
                cache_size: None,
                topology: vec![],
            },
            resources_ref: "default".into(),
            platform: "cpu".into(),
            pod: json!({"containers": [{"name": "user", "image": "img"}]}),
        }
    }

    #[test]
    fn composes_pod_group_with_min_member_and_labels() {
        let group = CompiledGroup { name: "g".into(), barrier: false, inputs: vec![], tasks: vec![task("a"), task("b")] };
        let pool = pool();
        let ctx = GroupContext {
            namespace: "osmo".into(),
            pool: &pool,
            priority: Priority::Normal,
            workflow_uuid: "w-1",
            group_uuid: "g-1",
            user: "alice",
            scheduler_name: "kai-scheduler",
            queue_label_key: "kai.scheduler/queue",
            supports_priority: true,
        };
        let composed = compose_group(&group, &ctx, &BTreeMap::new()).unwrap();
        assert_eq!(composed.pod_group.min_member, 2);
        assert_eq!(composed.pod_group.queue, "osmo-pool-osmo-default");
        assert_eq!(composed.pod_group.priority_class.as_deref(), Some("osmo-normal"));
        let pod = &composed.pods[0];
        assert_eq!(pod["metadata"]["labels"]["osmo.pool"], json!("default"));
        assert_eq!(pod["metadata"]["labels"]["kai.scheduler/queue"], json!("osmo-pool-osmo-default"));
        assert_eq!(pod["schedulerName"], json!("kai-scheduler"));
    }

    #[test]
    fn priority_omitted_when_scheduler_does_not_support_it() {
        let group = CompiledGroup { name: "g".into(), barrier: false, inputs: vec![], tasks: vec![task("a")] };
        let pool = pool();
        let ctx = GroupContext {
            namespace: "osmo".into(),
            pool: &pool,
            priority: Priority::High,
            workflow_uuid: "w-1",
            group_uuid: "g-1",
            user: "alice",
            scheduler_name: "default-scheduler",
            queue_label_key: "kai.scheduler/queue",
            supports_priority: false,
        };
        let composed = compose_group(&group, &ctx, &BTreeMap::new()).unwrap();
        assert!(composed.pod_group.priority_class.is_none());
    }
}
