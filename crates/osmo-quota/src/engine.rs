//! Quota computation (spec §4.7 steps 1, 4-6; §8 invariant 6 and scenarios 1-3).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use osmo_types::{Pool, Priority};
use serde::{Deserialize, Serialize};

use crate::nodeset::{merge_nodesets, NodeKey, NodeSet};

#[derive(Debug, thiserror::Error)]
pub enum QuotaEngineError {
    #[error("pool {0:?} referenced by a resource entry is not configured")]
    UnknownPool(String),
}

/// One backend's report of one node's GPU capacity and usage (spec §4.7 step 1).
/// `usage` already folds in `non_workflow_usage`, matching
/// `NodeGpuUsage{allocatable, usage}` from `SPEC_FULL.md` Supplemented Feature 2.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NodeGpuUsage {
    pub allocatable: i64,
    pub usage: i64,
}

/// One backend's `get_resources()` entry for one node (spec §4.8). `pools`
/// comes from walking `exposed_fields["pool/platform"]` (spec §4.7 step 2).
#[derive(Debug, Clone)]
pub struct NodeResourceEntry {
    pub backend: String,
    pub hostname: String,
    pub allocatable_gpu: i64,
    pub usage_gpu: i64,
    pub non_workflow_usage_gpu: i64,
    pub pools: Vec<String>,
}

/// One aggregated row over running tasks (spec §4.7 input `task_summaries`).
#[derive(Debug, Clone)]
pub struct TaskSummary {
    pub user: String,
    pub pool: String,
    pub priority: Priority,
    pub gpu: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceSum {
    pub total_capacity: i64,
    pub total_free: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolQuota {
    pub pool: String,
    pub total_capacity: i64,
    pub total_free: i64,
    pub quota_limit: i64,
    pub quota_used: i64,
    pub quota_free: i64,
    pub total_usage: i64,
}

/// Deduplicates resource entries by `(backend, hostname)` (spec §4.7 step 1)
/// and assigns each node to the pools that reference it (spec §4.7 step 2).
/// Entries naming a pool absent from `pool_configs` are logged and skipped.
fn dedupe_and_assign(
    entries: &[NodeResourceEntry],
    pool_configs: &HashMap<String, Pool>,
) -> (HashMap<NodeKey, NodeGpuUsage>, HashMap<String, BTreeSet<NodeKey>>) {
    let mut nodes: HashMap<NodeKey, NodeGpuUsage> = HashMap::new();
    let mut pool_nodes: HashMap<String, BTreeSet<NodeKey>> = HashMap::new();

    for entry in entries {
        let key = (entry.backend.clone(), entry.hostname.clone());
        nodes.insert(
            key.clone(),
            NodeGpuUsage {
                allocatable: entry.allocatable_gpu,
                usage: entry.usage_gpu + entry.non_workflow_usage_gpu,
            },
        );
        for pool in &entry.pools {
            if !pool_configs.contains_key(pool) {
                tracing::warn!(pool, "resource entry references unknown pool, skipping");
                continue;
            }
            pool_nodes.entry(pool.clone()).or_default().insert(key.clone());
        }
    }
    (nodes, pool_nodes)
}

fn nodeset_capacity(set: &NodeSet, nodes: &HashMap<NodeKey, NodeGpuUsage>) -> ResourceSum {
    let mut capacity = 0;
    let mut free = 0;
    for key in &set.nodes {
        if let Some(usage) = nodes.get(key) {
            capacity += usage.allocatable;
            free += (usage.allocatable - usage.usage).max(0);
        }
    }
    ResourceSum { total_capacity: capacity, total_free: free }
}

/// Computes per-pool quota accounting and the cross-nodeset `resource_sum`
/// (spec §4.7, §8 invariant 6). `resource_sum` is a sum over nodesets, never
/// over pools, so nodes shared by multiple pools are counted exactly once.
pub fn compute_pool_quotas(
    pool_configs: &HashMap<String, Pool>,
    entries: &[NodeResourceEntry],
    task_summaries: &[TaskSummary],
) -> (BTreeMap<String, PoolQuota>, ResourceSum) {
    let (nodes, pool_nodes) = dedupe_and_assign(entries, pool_configs);
    let nodesets = merge_nodesets(&pool_nodes);

    let mut usage_by_pool: HashMap<&str, (i64, i64)> = HashMap::new(); // (non_preemptible, total)
    for task in task_summaries {
        let entry = usage_by_pool.entry(task.pool.as_str()).or_default();
        entry.1 += task.gpu;
        if !task.priority.preemptible() {
            entry.0 += task.gpu;
        }
    }

    let mut result = BTreeMap::new();
    let mut resource_sum = ResourceSum::default();

    for set in &nodesets {
        let capacity = nodeset_capacity(set, &nodes);
        resource_sum.total_capacity += capacity.total_capacity;
        resource_sum.total_free += capacity.total_free;

        for pool_name in &set.pools {
            let Some(pool) = pool_configs.get(pool_name) else { continue };
            let (quota_used, total_usage) = usage_by_pool.get(pool_name.as_str()).copied().unwrap_or((0, 0));
            let quota_limit = if pool.gpu.guarantee < 0 { capacity.total_capacity } else { pool.gpu.guarantee };
            let quota_free = (quota_limit - quota_used).max(0);

            result.insert(
                pool_name.clone(),
                PoolQuota {
                    pool: pool_name.clone(),
                    total_capacity: capacity.total_capacity,
                    total_free: capacity.total_free,
                    quota_limit,
                    quota_used,
                    quota_free,
                    total_usage,
                },
            );
        }
    }

    (result, resource_sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_types::GpuQuota;
    use std::collections::BTreeMap as Map;

    fn pool(name: &str, guarantee: i64) -> Pool {
        Pool {
            name: name.to_string(),
            backend: "prod".into(),
            default_platform: "cpu".into(),
            platforms: Map::new(),
            common_pod_template: vec![],
            common_resource_validations: vec![],
            common_default_variables: Map::new(),
            gpu: GpuQuota { guarantee, maximum: -1, weight: 1.0 },
            topology_keys: vec![],
            max_exec_timeout: None,
            default_exec_timeout: None,
            max_queue_timeout: None,
            default_queue_timeout: None,
            enable_maintenance: false,
        }
    }

    /// Scenario 1 (spec §8): single pool, single 8-GPU node, no tasks.
    #[test]
    fn single_pool_single_node_no_tasks() {
        let mut pools = HashMap::new();
        pools.insert("a".to_string(), pool("a", 8));
        let entries = vec![NodeResourceEntry {
            backend: "b".into(),
            hostname: "n1".into(),
            allocatable_gpu: 8,
            usage_gpu: 0,
            non_workflow_usage_gpu: 0,
            pools: vec!["a".into()],
        }];
        let (quotas, sum) = compute_pool_quotas(&pools, &entries, &[]);
        let q = &quotas["a"];
        assert_eq!(q.quota_limit, 8);
        assert_eq!(q.quota_used, 0);
        assert_eq!(q.total_free, 8);
        assert_eq!(sum.total_capacity, 8);
    }

    /// Scenario 2 (spec §8): two pools share one 8-GPU node; 2 GPU used by a
    /// non-preemptible task in pool `a`. `resource_sum.total_capacity == 8`, not 16.
    #[test]
    fn two_pools_sharing_one_node_report_shared_capacity_once() {
        let mut pools = HashMap::new();
        pools.insert("a".to_string(), pool("a", -1));
        pools.insert("b".to_string(), pool("b", -1));
        let entries = vec![NodeResourceEntry {
            backend: "b".into(),
            hostname: "n1".into(),
            allocatable_gpu: 8,
            usage_gpu: 2,
            non_workflow_usage_gpu: 0,
            pools: vec!["a".into(), "b".into()],
        }];
        let tasks = vec![TaskSummary { user: "u".into(), pool: "a".into(), priority: Priority::Normal, gpu: 2 }];
        let (quotas, sum) = compute_pool_quotas(&pools, &entries, &tasks);
        assert_eq!(quotas["a"].total_capacity, 8);
        assert_eq!(quotas["b"].total_capacity, 8);
        assert_eq!(quotas["a"].total_free, 6);
        assert_eq!(quotas["b"].total_free, 6);
        assert_eq!(quotas["a"].quota_used, 2);
        assert_eq!(quotas["b"].quota_used, 0);
        assert_eq!(sum.total_capacity, 8);
    }

    /// Scenario 3 (spec §8): preemptible tasks are excluded from `quota_used`
    /// but counted in `total_usage`.
    #[test]
    fn preemptible_tasks_excluded_from_quota_used() {
        let mut pools = HashMap::new();
        pools.insert("a".to_string(), pool("a", 8));
        let entries = vec![NodeResourceEntry {
            backend: "b".into(),
            hostname: "n1".into(),
            allocatable_gpu: 8,
            usage_gpu: 6,
            non_workflow_usage_gpu: 0,
            pools: vec!["a".into()],
        }];
        let tasks = vec![
            TaskSummary { user: "u1".into(), pool: "a".into(), priority: Priority::Low, gpu: 2 },
            TaskSummary { user: "u2".into(), pool: "a".into(), priority: Priority::Normal, gpu: 4 },
        ];
        let (quotas, _sum) = compute_pool_quotas(&pools, &entries, &tasks);
        let q = &quotas["a"];
        assert_eq!(q.quota_used, 4);
        assert_eq!(q.total_usage, 6);
        assert_eq!(q.quota_free, 4);
    }

    #[test]
    fn unbounded_guarantee_falls_back_to_nodeset_capacity() {
        let mut pools = HashMap::new();
        pools.insert("a".to_string(), pool("a", -1));
        let entries = vec![NodeResourceEntry {
            backend: "b".into(),
            hostname: "n1".into(),
            allocatable_gpu: 4,
            usage_gpu: 0,
            non_workflow_usage_gpu: 0,
            pools: vec!["a".into()],
        }];
        let (quotas, _) = compute_pool_quotas(&pools, &entries, &[]);
        assert_eq!(quotas["a"].quota_limit, 4);
    }
}
