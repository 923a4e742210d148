//! The admin/health HTTP surface (spec §1 Non-goals: the REST API proper is
//! an external collaborator; this is only the operational surface a
//! deployment's load balancer and on-call dashboards need). Grounded on
//! `everruns-api::main::health`/`HealthResponse`, extended with per-backend
//! online/offline reporting (spec §4.8 "Backends heartbeat every 2 min").

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use osmo_backend::Backend;

#[derive(Clone)]
pub struct HealthState {
    pub backends: Arc<Vec<Arc<dyn Backend>>>,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).route("/ready", get(ready)).with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

#[derive(Serialize)]
struct BackendHealth {
    name: String,
    online: bool,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    backends: Vec<BackendHealth>,
}

/// Reports whether every configured backend is online (spec §4.8 `online =
/// now - last_heartbeat <= 2min OR enable_maintenance`); a deployment with
/// any backend down is still "ok" for `/health` (the process itself is
/// fine) but not "ready" to accept new submissions against that backend.
async fn ready(State(state): State<HealthState>) -> Json<ReadyResponse> {
    let now = chrono::Utc::now();
    let mut backends = Vec::new();
    let mut all_online = true;
    for backend in state.backends.iter() {
        let online = osmo_backend::is_backend_online(backend.as_ref(), false, now).await;
        all_online &= online;
        backends.push(BackendHealth { name: backend.name().to_string(), online });
    }
    Json(ReadyResponse { ready: all_online, backends })
}
