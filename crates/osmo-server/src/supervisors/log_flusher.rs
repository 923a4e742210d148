//! Log flusher (spec §5 background loops; §1 "log shipping to object
//! storage (only the interface to it is specified)"; §6 "Persisted state":
//! `workflow_logs.txt`, `workflow_events.txt`,
//! `{task}_{retry}_error_logs.txt`, `workflow_app.txt`). This crate owns only
//! the trait boundary and a bounded in-memory staging queue that batches
//! writes -- the real object-storage client (S3-style) is an external
//! collaborator the way the spec's §1 Non-goals describe.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, instrument, warn};

/// One staged write: an object key (`{workflow_id}/workflow_logs.txt` etc.,
/// spec §6) and its accumulated bytes.
#[derive(Debug, Clone)]
pub struct LogChunk {
    pub key: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("object store put failed for {0:?}: {1}")]
    PutFailed(String, String),
}

/// The interface to object storage the spec calls out as out of scope to
/// implement (§1); any S3-compatible client satisfies this trait.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;
}

/// Bounded queue a producer (the renderer/compiler/scheduler-bridge
/// pipeline) appends to; the flusher drains it on its own schedule so a log
/// write never blocks the request path (spec §5 "every object-storage I/O"
/// is a suspension point -- staging it here keeps that suspension off the
/// hot path).
#[derive(Default)]
pub struct LogStaging {
    queue: Mutex<VecDeque<LogChunk>>,
}

impl LogStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.queue.lock().push_back(LogChunk { key: key.into(), bytes });
    }

    fn drain(&self) -> Vec<LogChunk> {
        self.queue.lock().drain(..).collect()
    }
}

/// An `ObjectStore` that keeps everything in memory, for tests and local
/// dev (mirrors the workspace's `InMemory*` test-double convention).
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<std::collections::BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(())
    }
}

#[instrument(skip(store, shutdown))]
pub async fn run(store: Arc<dyn ObjectStore>, interval: Duration, mut shutdown: crate::shutdown::ShutdownHandle) {
    run_with_staging(store, Arc::new(LogStaging::new()), interval, &mut shutdown).await
}

/// Split out from `run` so tests can stage chunks and observe a flush pass
/// without waiting on a real timer.
pub async fn run_with_staging(
    store: Arc<dyn ObjectStore>,
    staging: Arc<LogStaging>,
    interval: Duration,
    shutdown: &mut crate::shutdown::ShutdownHandle,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.signalled() => return,
            _ = ticker.tick() => flush_once(store.as_ref(), staging.as_ref()).await,
        }
    }
}

async fn flush_once(store: &dyn ObjectStore, staging: &LogStaging) {
    for chunk in staging.drain() {
        match store.put(&chunk.key, chunk.bytes).await {
            Ok(()) => debug!(key = %chunk.key, "flushed log chunk"),
            Err(err) => warn!(key = %chunk.key, error = %err, "log flush failed, dropping chunk"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staged_chunks_land_in_the_object_store_on_flush() {
        let object_store = Arc::new(InMemoryObjectStore::default());
        let staging = Arc::new(LogStaging::new());
        staging.stage("nightly-1/workflow_logs.txt", b"hello".to_vec());

        flush_once(object_store.as_ref(), staging.as_ref()).await;

        assert_eq!(object_store.get("nightly-1/workflow_logs.txt"), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn a_flush_with_nothing_staged_is_a_no_op() {
        let object_store = Arc::new(InMemoryObjectStore::default());
        let staging = Arc::new(LogStaging::new());
        flush_once(object_store.as_ref(), staging.as_ref()).await;
        assert!(object_store.get("anything").is_none());
    }
}
