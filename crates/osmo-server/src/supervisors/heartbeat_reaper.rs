//! Heartbeat reaper (spec §5 background loops, §4.8 "Backends heartbeat
//! every 2 min"): periodically logs each backend's online/offline status so
//! an operator sees a backend go dark inside one heartbeat window rather
//! than only at admission time, when the scheduler bridge refuses to place
//! new work on it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use osmo_backend::{is_backend_online, Backend};

use crate::shutdown::ShutdownHandle;

#[instrument(skip(backends, shutdown))]
pub async fn run(backends: Vec<Arc<dyn Backend>>, interval: Duration, mut shutdown: ShutdownHandle) {
    let mut ticker = tokio::time::interval(interval);
    let mut known_online: std::collections::HashMap<String, bool> = std::collections::HashMap::new();

    loop {
        tokio::select! {
            _ = shutdown.signalled() => return,
            _ = ticker.tick() => {
                let now = chrono::Utc::now();
                for backend in &backends {
                    let online = is_backend_online(backend.as_ref(), false, now).await;
                    let name = backend.name().to_string();
                    match known_online.insert(name.clone(), online) {
                        Some(previous) if previous != online => {
                            if online {
                                info!(backend = %name, "backend back online");
                            } else {
                                warn!(backend = %name, "backend heartbeat stale, marking offline");
                            }
                        }
                        None if !online => warn!(backend = %name, "backend offline at startup"),
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osmo_backend::InMemoryBackend;

    #[tokio::test]
    async fn one_tick_records_every_backend_without_panicking() {
        let a = Arc::new(InMemoryBackend::new("a"));
        let b = Arc::new(InMemoryBackend::new("b"));
        b.set_heartbeat(Some(chrono::Utc::now() - chrono::Duration::minutes(10)));
        let backends: Vec<Arc<dyn Backend>> = vec![a, b];

        let (controller, handle) = crate::shutdown::ShutdownController::new();
        let task = tokio::spawn(run(backends, Duration::from_millis(5), handle));
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(controller);
        let _ = tokio::time::timeout(Duration::from_millis(100), task).await;
    }
}
