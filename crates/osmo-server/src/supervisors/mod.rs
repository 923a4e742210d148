//! Long-lived background loops (spec §5 "Scheduling model": "Long-lived
//! background loops: per-backend event listeners, heartbeat reaper, log
//! flusher, state aggregator, timeout enforcer"). Each loop is spawned onto
//! its own `tokio::task`, observes `ShutdownHandle::signalled()` at every
//! suspension point (spec §5 "Cancellation"), and is independent of the
//! others -- a panic or slow iteration in one never blocks another, mirroring
//! `TemporalWorker::run`'s `spawn_workflow_poller`/`spawn_activity_poller`
//! split in `everruns-worker::worker`.

pub mod event_listener;
pub mod heartbeat_reaper;
pub mod log_flusher;
pub mod state_aggregator;
pub mod timeout_enforcer;

use std::sync::Arc;

use tokio::task::JoinHandle;

use osmo_backend::Backend;
use osmo_storage::WorkflowStore;

use crate::shutdown::ShutdownHandle;

/// Spawns every background supervisor and returns their join handles so
/// `main` can await them after shutdown is signalled (clean process exit
/// rather than an abrupt `std::process::exit`).
pub fn spawn_all(
    backends: Vec<Arc<dyn Backend>>,
    store: Arc<dyn WorkflowStore>,
    intervals: SupervisorIntervals,
    shutdown: ShutdownHandle,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    for backend in &backends {
        handles.push(tokio::spawn(event_listener::run(backend.clone(), store.clone(), shutdown.clone())));
    }

    handles.push(tokio::spawn(heartbeat_reaper::run(backends.clone(), intervals.heartbeat, shutdown.clone())));
    handles.push(tokio::spawn(state_aggregator::run(store.clone(), intervals.aggregator, shutdown.clone())));
    handles.push(tokio::spawn(timeout_enforcer::run(store.clone(), intervals.timeout_enforcer, shutdown.clone())));
    handles.push(tokio::spawn(log_flusher::run(
        Arc::new(log_flusher::InMemoryObjectStore::default()),
        intervals.log_flush,
        shutdown,
    )));

    handles
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorIntervals {
    pub heartbeat: std::time::Duration,
    pub aggregator: std::time::Duration,
    pub timeout_enforcer: std::time::Duration,
    pub log_flush: std::time::Duration,
}

impl From<&crate::config::ServerConfig> for SupervisorIntervals {
    fn from(cfg: &crate::config::ServerConfig) -> Self {
        Self {
            heartbeat: cfg.heartbeat_interval,
            aggregator: cfg.aggregator_interval,
            timeout_enforcer: cfg.timeout_enforcer_interval,
            log_flush: cfg.log_flush_interval,
        }
    }
}
