//! The KAI scheduler binding: the default, fully-featured implementation
//! behind the [`SchedulerBackend`](crate::factory::SchedulerBackend)
//! abstraction (spec §4.5, §9 "Cross-scheduler portability").
//!
//! KAI is a NVIDIA batch scheduler built on top of Kubernetes' scheduling
//! framework; it natively understands queues, podgroups, priority classes
//! and topology constraints, so its binding is close to a direct mapping
//! of the plan computed in [`crate::topology`] and [`crate::podgroup`].

use osmo_compiler::CompiledGroup;
use osmo_types::Pool;
use serde_json::Value;

use crate::crds::{build_queue, build_topology, Queue, Topology};
use crate::error::SchedulerError;
use crate::factory::SchedulerBackend;
use crate::podgroup::{compose_group, ComposedGroup, GroupContext};

/// `kai.scheduler/queue`, the pod label KAI reads to route a pod to its
/// queue (spec §4.5 "Per-backend CRDs").
pub const KAI_QUEUE_LABEL: &str = "kai.scheduler/queue";
pub const KAI_SCHEDULER_NAME: &str = "kai-scheduler";

#[derive(Debug, Default)]
pub struct KaiScheduler;

impl SchedulerBackend for KaiScheduler {
    fn name(&self) -> &'static str {
        KAI_SCHEDULER_NAME
    }

    fn supports_priority(&self) -> bool {
        true
    }

    fn queue_label_key(&self) -> &'static str {
        KAI_QUEUE_LABEL
    }

    fn compose_group(&self, group: &CompiledGroup, ctx: &GroupContext<'_>, task_uuids: &std::collections::BTreeMap<String, String>) -> Result<ComposedGroup, SchedulerError> {
        compose_group(group, ctx, task_uuids)
    }

    fn build_queue(&self, namespace: &str, pool: &Pool) -> Queue {
        build_queue(namespace, pool)
    }

    fn build_topology(&self, namespace: &str, pool: &Pool) -> Option<Topology> {
        build_topology(namespace, pool)
    }

    fn queue_as_json(&self, queue: &Queue) -> Value {
        serde_json::json!({
            "apiVersion": "scheduling.run.ai/v2",
            "kind": "Queue",
            "metadata": { "name": queue.name },
            "spec": {
                "parentQueue": queue.parent,
                "resources": {
                    "gpu": { "quota": queue.gpu.quota, "limit": queue.gpu.limit, "overQuotaWeight": queue.gpu.over_quota_weight },
                    "cpu": { "quota": queue.cpu.quota, "limit": queue.cpu.limit, "overQuotaWeight": queue.cpu.over_quota_weight },
                    "memory": { "quota": queue.memory.quota, "limit": queue.memory.limit, "overQuotaWeight": queue.memory.over_quota_weight },
                },
            },
        })
    }

    fn topology_as_json(&self, topology: &Topology) -> Value {
        serde_json::json!({
            "apiVersion": "scheduling.run.ai/v2",
            "kind": "Topology",
            "metadata": { "name": topology.name },
            "spec": {
                "levels": topology.levels.iter().map(|l| serde_json::json!({ "nodeLabel": l.node_label })).collect::<Vec<_>>(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_queue_label_and_priority_support() {
        let kai = KaiScheduler;
        assert_eq!(kai.name(), "kai-scheduler");
        assert!(kai.supports_priority());
        assert_eq!(kai.queue_label_key(), KAI_QUEUE_LABEL);
    }
}
