//! Backend Interface (spec §4.8): the contract the Scheduler Bridge and State
//! Machine depend on to talk to any Kubernetes-style compute backend.
//! Implementing a new backend means implementing [`Backend`]; this crate owns
//! only the trait, the shared wire types, and an in-memory reference backend
//! used by tests (mirroring `osmo-config`'s `InMemoryConfigStore` split).

pub mod cleanup;
pub mod events;
pub mod memory;
pub mod resources;

pub use cleanup::{merge_cleanup_specs, CleanupSpec, CustomApi};
pub use events::{ActionRequest, BackendEvent, NodeCondition, PodPhase};
pub use memory::InMemoryBackend;
pub use resources::{NodeResource, NodeUsage};

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend {0:?} unreachable")]
    Unreachable(String),
    #[error("apply failed: {0}")]
    ApplyFailed(String),
    #[error("action request {0:?} timed out")]
    ActionTimeout(String),
    #[error("backend {0:?} is offline (heartbeat stale)")]
    Offline(String),
}

impl From<BackendError> for osmo_types::OsmoError {
    fn from(err: BackendError) -> Self {
        osmo_types::OsmoError::new(osmo_types::ErrorKind::Backend, err.to_string())
    }
}

/// The operations the Scheduler Bridge and State Machine require from any
/// backend (spec §4.8 table). `k8s_resources` are opaque JSON manifests (the
/// Scheduler Bridge already rendered them into backend-native shape).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Deletes everything matching `specs`' label selectors, then applies
    /// `k8s_resources`. "Transactional from the caller's view: success means
    /// the desired state is in effect" (spec §4.8).
    async fn apply_cleanup_specs(&self, specs: &[CleanupSpec], k8s_resources: Vec<Value>) -> Result<(), BackendError>;

    /// A stream of `{pod_phase, node_conditions, heartbeat}` events for every
    /// object carrying `osmo.*` labels (spec §4.8). Ordering is preserved
    /// per-workflow but not across workflows (spec §5).
    fn listen_events(&self) -> tokio_stream::wrappers::ReceiverStream<BackendEvent>;

    /// The current node list: labels, taints, allocatable, usage (workflow
    /// vs non-workflow), derived exposed fields, platform/pool assignment
    /// (spec §4.8).
    async fn get_resources(&self) -> Result<Vec<NodeResource>, BackendError>;

    /// Publishes an exec/port-forward/rsync/webserver/cancel request for
    /// `task_uuid`; requests TTL at the task's total timeout (spec §4.8).
    async fn publish_action(&self, task_uuid: &str, request: ActionRequest) -> Result<(), BackendError>;

    /// Subscribes to action requests published for `task_uuid`.
    fn subscribe_actions(&self, task_uuid: &str) -> tokio_stream::wrappers::ReceiverStream<ActionRequest>;

    /// Backend identity, used for heartbeat/online bookkeeping (spec §4.8:
    /// "Backends heartbeat every 2 min").
    fn name(&self) -> &str;

    async fn last_heartbeat(&self) -> Option<chrono::DateTime<chrono::Utc>>;
}

/// `online = now - last_heartbeat <= 2min OR enable_maintenance` (spec §4.8).
pub async fn is_backend_online(backend: &dyn Backend, enable_maintenance: bool, now: chrono::DateTime<chrono::Utc>) -> bool {
    if enable_maintenance {
        return true;
    }
    match backend.last_heartbeat().await {
        Some(hb) => now.signed_duration_since(hb).num_seconds() <= 120,
        None => false,
    }
}
