//! Pool Quota Engine (spec §4.7): per-pool GPU capacity/usage accounting that
//! never double-counts nodes shared by multiple pools.

pub mod engine;
pub mod nodeset;

pub use engine::{compute_pool_quotas, NodeResourceEntry, PoolQuota, QuotaEngineError, ResourceSum, TaskSummary};
pub use nodeset::{merge_nodesets, NodeKey, NodeSet};
