//! Wire types for backend event streams and the action channel (spec §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pod lifecycle phase as reported by the backend (spec §4.8 `listen_events`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeCondition {
    pub node_name: String,
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: bool,
    pub message: Option<String>,
}

/// One event off a backend's `listen_events` stream (spec §4.8): "Stream of
/// `{pod_phase, node_conditions, heartbeat}` for all objects carrying
/// `osmo.*` labels." Per-workflow order is preserved by the backend; order
/// across workflows is not guaranteed (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendEvent {
    pub backend: String,
    pub observed_at: DateTime<Utc>,
    pub task_uuid: Option<String>,
    pub node_name: Option<String>,
    pub pod_phase: Option<PodPhase>,
    pub node_conditions: Vec<NodeCondition>,
    /// Present on periodic backend-wide heartbeat events rather than per-pod
    /// events (spec §4.8: "Backends heartbeat every 2 min").
    pub heartbeat: bool,
}

/// An exec/port-forward/rsync/webserver/cancel request published on a
/// task's action channel (spec §4.8: "each request has `{action, key,
/// router_address, cookie, payload}`; requests TTL = total timeout").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: ActionKind,
    pub key: String,
    pub router_address: String,
    pub cookie: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Exec,
    PortForward,
    Rsync,
    Webserver,
    Cancel,
}
