//! An in-memory reference [`Backend`] used by `osmo-scheduler`/`osmo-state`
//! tests, mirroring `osmo-config::InMemoryConfigStore` (no live cluster
//! required to exercise the state machine or scheduler bridge).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{ActionRequest, Backend, BackendError, BackendEvent, CleanupSpec, NodeResource};

struct AppliedState {
    resources: Vec<Value>,
    cleanup_log: Vec<CleanupSpec>,
}

/// A backend that keeps applied resources and cleanup history in memory,
/// and fans events/actions out over broadcast-style channels.
pub struct InMemoryBackend {
    name: String,
    applied: parking_lot::Mutex<AppliedState>,
    nodes: parking_lot::Mutex<Vec<NodeResource>>,
    heartbeat: parking_lot::Mutex<Option<DateTime<Utc>>>,
    event_subscribers: Arc<DashMap<u64, mpsc::Sender<BackendEvent>>>,
    action_subscribers: Arc<DashMap<String, Vec<mpsc::Sender<ActionRequest>>>>,
    next_subscriber_id: std::sync::atomic::AtomicU64,
}

impl InMemoryBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            applied: parking_lot::Mutex::new(AppliedState { resources: Vec::new(), cleanup_log: Vec::new() }),
            nodes: parking_lot::Mutex::new(Vec::new()),
            heartbeat: parking_lot::Mutex::new(Some(Utc::now())),
            event_subscribers: Arc::new(DashMap::new()),
            action_subscribers: Arc::new(DashMap::new()),
            next_subscriber_id: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn set_nodes(&self, nodes: Vec<NodeResource>) {
        *self.nodes.lock() = nodes;
    }

    pub fn set_heartbeat(&self, at: Option<DateTime<Utc>>) {
        *self.heartbeat.lock() = at;
    }

    pub fn applied_resources(&self) -> Vec<Value> {
        self.applied.lock().resources.clone()
    }

    pub fn cleanup_log(&self) -> Vec<CleanupSpec> {
        self.applied.lock().cleanup_log.clone()
    }

    /// Test/simulation hook: injects an event as if the backend had observed it.
    pub fn emit_event(&self, event: BackendEvent) {
        self.event_subscribers.retain(|_, tx| tx.try_send(event.clone()).is_ok());
    }

    fn remove_matching(&self, specs: &[CleanupSpec], resources: Vec<Value>) -> Vec<Value> {
        resources
            .into_iter()
            .filter(|resource| {
                let labels = resource.get("metadata").and_then(|m| m.get("labels")).and_then(Value::as_object);
                !specs.iter().any(|spec| matches_labels(labels, &spec.labels))
            })
            .collect()
    }
}

fn matches_labels(resource_labels: Option<&serde_json::Map<String, Value>>, selector: &BTreeMap<String, String>) -> bool {
    let Some(labels) = resource_labels else { return selector.is_empty() };
    selector.iter().all(|(k, v)| labels.get(k).and_then(Value::as_str) == Some(v.as_str()))
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn apply_cleanup_specs(&self, specs: &[CleanupSpec], k8s_resources: Vec<Value>) -> Result<(), BackendError> {
        let mut applied = self.applied.lock();
        let remaining = self.remove_matching(specs, std::mem::take(&mut applied.resources));
        applied.resources = remaining;
        applied.resources.extend(k8s_resources);
        applied.cleanup_log.extend(specs.iter().cloned());
        Ok(())
    }

    fn listen_events(&self) -> ReceiverStream<BackendEvent> {
        let (tx, rx) = mpsc::channel(256);
        let id = self.next_subscriber_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.event_subscribers.insert(id, tx);
        ReceiverStream::new(rx)
    }

    async fn get_resources(&self) -> Result<Vec<NodeResource>, BackendError> {
        Ok(self.nodes.lock().clone())
    }

    async fn publish_action(&self, task_uuid: &str, request: ActionRequest) -> Result<(), BackendError> {
        if let Some(subs) = self.action_subscribers.get(task_uuid) {
            for tx in subs.iter() {
                let _ = tx.try_send(request.clone());
            }
        }
        Ok(())
    }

    fn subscribe_actions(&self, task_uuid: &str) -> ReceiverStream<ActionRequest> {
        let (tx, rx) = mpsc::channel(32);
        self.action_subscribers.entry(task_uuid.to_string()).or_default().push(tx);
        ReceiverStream::new(rx)
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *self.heartbeat.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActionKind, PodPhase};
    use serde_json::json;

    #[tokio::test]
    async fn apply_cleanup_specs_removes_matched_labels_then_applies() {
        let backend = InMemoryBackend::new("test");
        backend
            .apply_cleanup_specs(&[], vec![json!({"metadata": {"labels": {"osmo.pool": "a"}}})])
            .await
            .unwrap();
        assert_eq!(backend.applied_resources().len(), 1);

        let spec = CleanupSpec {
            resource_type: "PodGroup".into(),
            labels: BTreeMap::from([("osmo.pool".to_string(), "a".to_string())]),
            custom_api: None,
        };
        backend.apply_cleanup_specs(&[spec], vec![json!({"metadata": {"labels": {"osmo.pool": "b"}}})]).await.unwrap();
        let resources = backend.applied_resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0]["metadata"]["labels"]["osmo.pool"], json!("b"));
    }

    #[tokio::test]
    async fn action_channel_delivers_published_request_to_subscriber() {
        let backend = InMemoryBackend::new("test");
        let mut stream = backend.subscribe_actions("task-1");
        backend
            .publish_action(
                "task-1",
                ActionRequest {
                    action: ActionKind::Exec,
                    key: "k".into(),
                    router_address: "router:1".into(),
                    cookie: "c".into(),
                    payload: Value::Null,
                },
            )
            .await
            .unwrap();
        use tokio_stream::StreamExt;
        let received = stream.next().await.unwrap();
        assert_eq!(received.key, "k");
    }

    #[tokio::test]
    async fn heartbeat_defaults_to_recent() {
        let backend = InMemoryBackend::new("test");
        assert!(crate::is_backend_online(&backend, false, Utc::now()).await);
        backend.set_heartbeat(Some(Utc::now() - chrono::Duration::minutes(5)));
        assert!(!crate::is_backend_online(&backend, false, Utc::now()).await);
        assert!(crate::is_backend_online(&backend, true, Utc::now()).await);
    }

    #[test]
    fn pod_phase_serializes_pascal_case() {
        assert_eq!(serde_json::to_value(PodPhase::Running).unwrap(), json!("Running"));
    }
}
