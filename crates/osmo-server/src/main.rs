//! The OSMO control-plane server binary: boots the durable store, the
//! configured backends, and every background supervisor (spec §2 "Data
//! flow" / §5 "Scheduling model"), then serves the admin/health surface
//! until `SIGINT`. Grounded on `everruns-api::main`'s boot sequence
//! (tracing init -> DB connect -> app state -> router -> `axum::serve`),
//! generalized with the supervisor fan-out `everruns-worker::worker`'s
//! `TemporalWorker::run` uses for its pollers.

mod config;
mod health;
mod shutdown;
mod supervisors;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use osmo_backend::{Backend, InMemoryBackend};
use osmo_storage::{InMemoryWorkflowStore, WorkflowStore};

use config::ServerConfig;
use shutdown::ShutdownController;
use supervisors::SupervisorIntervals;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "osmo_server=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("osmo-server starting");

    let cfg = ServerConfig::from_env().context("failed to load server configuration")?;

    // Real deployments register one `Backend` per cluster the Config
    // Store's `Backend` objects name (spec §4.8); this binary's job is to
    // wire whatever the Config Store currently has, not to hardcode a
    // backend list. Until that bootstrap exists, the in-memory reference
    // backend keeps the supervisors exercised end to end.
    let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(InMemoryBackend::new("default"))];

    // Likewise, a Postgres pool would be built from `cfg.database_url` and
    // handed to `osmo_storage::WorkflowRepository::new`; the in-memory store
    // keeps this binary runnable without a live database for local dev.
    let _ = &cfg.database_url;
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());

    let (shutdown_controller, supervisors_handle) = ShutdownController::new();
    let axum_handle = shutdown_controller.handle();
    let intervals = SupervisorIntervals::from(&cfg);
    let supervisor_handles = supervisors::spawn_all(backends.clone(), store.clone(), intervals, supervisors_handle);

    let health_state = health::HealthState { backends: Arc::new(backends) };
    let app = health::router(health_state).layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await.context("failed to bind admin/health listener")?;
    tracing::info!(addr = %cfg.bind_addr, "admin/health surface listening");

    // `ctrl_c` fans the shutdown signal out to the axum graceful-shutdown
    // future below *and* to every supervisor spawned above -- one signal,
    // every consumer observes it at its own next suspension point (spec §5
    // "Cancellation").
    let ctrl_c_task = tokio::spawn(async move { shutdown_controller.wait_for_ctrl_c().await });

    axum::serve(listener, app).with_graceful_shutdown(wait_for_shutdown(axum_handle)).await.context("admin/health server error")?;

    let _ = ctrl_c_task.await;
    tracing::info!("waiting for supervisors to stop");
    for handle in supervisor_handles {
        let _ = handle.await;
    }
    tracing::info!("osmo-server stopped");
    Ok(())
}

async fn wait_for_shutdown(mut handle: shutdown::ShutdownHandle) {
    handle.signalled().await;
}
