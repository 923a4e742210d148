//! Per-backend scheduler CRDs (spec §4.5 "Per-backend CRDs", "Topology CRDs").

use osmo_types::Pool;
use serde::{Deserialize, Serialize};

/// A `gpu`/`cpu`/`memory` quota row on a `Queue` (spec §4.5). `-1` maps to
/// an unlimited no-op (`limit: None`); cpu/memory are always unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueResourceLimit {
    pub quota: Option<f64>,
    pub limit: Option<f64>,
    pub over_quota_weight: f64,
}

impl QueueResourceLimit {
    fn unlimited(weight: f64) -> Self {
        Self { quota: None, limit: None, over_quota_weight: weight }
    }

    fn bounded(guarantee: i64, maximum: i64, weight: f64) -> Self {
        Self {
            quota: (guarantee >= 0).then_some(guarantee as f64),
            limit: (maximum >= 0).then_some(maximum as f64),
            over_quota_weight: weight,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Queue {
    pub name: String,
    pub parent: String,
    pub gpu: QueueResourceLimit,
    pub cpu: QueueResourceLimit,
    pub memory: QueueResourceLimit,
}

/// `queue = osmo-pool-{namespace}-{pool}` (spec §4.5 "PodGroup composition").
pub fn pool_queue_name(namespace: &str, pool: &str) -> String {
    format!("osmo-pool-{namespace}-{pool}")
}

/// The parent default queue, one per backend (spec §4.5: "A parent queue
/// `osmo-default-{namespace}` exists once per backend").
pub fn default_queue_name(namespace: &str) -> String {
    format!("osmo-default-{namespace}")
}

/// Builds the `Queue` CRD for one pool (spec §4.5 "Per-backend CRDs"):
/// `gpu` is taken from the pool's resource spec; `cpu`/`memory` are always
/// unlimited no-ops.
pub fn build_queue(namespace: &str, pool: &Pool) -> Queue {
    Queue {
        name: pool_queue_name(namespace, &pool.name),
        parent: default_queue_name(namespace),
        gpu: QueueResourceLimit::bounded(pool.gpu.guarantee, pool.gpu.maximum, pool.gpu.weight),
        cpu: QueueResourceLimit::unlimited(1.0),
        memory: QueueResourceLimit::unlimited(1.0),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyLevel {
    pub node_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub name: String,
    pub levels: Vec<TopologyLevel>,
}

/// `osmo-pool-{namespace}-{pool}-topology`, with levels ordered coarsest to
/// finest exactly as the pool's `topology_keys` (spec §4.5 "Topology CRDs").
/// Returns `None` when the pool has no topology keys configured.
pub fn build_topology(namespace: &str, pool: &Pool) -> Option<Topology> {
    if pool.topology_keys.is_empty() {
        return None;
    }
    Some(Topology {
        name: format!("osmo-pool-{namespace}-{}-topology", pool.name),
        levels: pool.topology_keys.iter().map(|k| TopologyLevel { node_label: k.label.clone() }).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_types::{GpuQuota, TopologyKey};
    use std::collections::BTreeMap;

    fn pool_with_gpu(guarantee: i64, maximum: i64) -> Pool {
        Pool {
            name: "a".into(),
            backend: "prod".into(),
            default_platform: "cpu".into(),
            platforms: BTreeMap::new(),
            common_pod_template: vec![],
            common_resource_validations: vec![],
            common_default_variables: BTreeMap::new(),
            gpu: GpuQuota { guarantee, maximum, weight: 1.0 },
            topology_keys: vec![TopologyKey { key: "zone".into(), label: "topology.kubernetes.io/zone".into() }],
            max_exec_timeout: None,
            default_exec_timeout: None,
            max_queue_timeout: None,
            default_queue_timeout: None,
            enable_maintenance: false,
        }
    }

    #[test]
    fn unbounded_guarantee_maps_to_unlimited_no_op() {
        let queue = build_queue("osmo", &pool_with_gpu(-1, -1));
        assert_eq!(queue.name, "osmo-pool-osmo-a");
        assert_eq!(queue.parent, "osmo-default-osmo");
        assert_eq!(queue.gpu.quota, None);
        assert_eq!(queue.cpu.quota, None);
    }

    #[test]
    fn bounded_guarantee_carries_through() {
        let queue = build_queue("osmo", &pool_with_gpu(4, 8));
        assert_eq!(queue.gpu.quota, Some(4.0));
        assert_eq!(queue.gpu.limit, Some(8.0));
    }

    #[test]
    fn topology_crd_named_and_ordered_per_pool() {
        let topology = build_topology("osmo", &pool_with_gpu(-1, -1)).unwrap();
        assert_eq!(topology.name, "osmo-pool-osmo-a-topology");
        assert_eq!(topology.levels[0].node_label, "topology.kubernetes.io/zone");
    }

    #[test]
    fn no_topology_keys_yields_none() {
        let mut pool = pool_with_gpu(-1, -1);
        pool.topology_keys.clear();
        assert!(build_topology("osmo", &pool).is_none());
    }
}
