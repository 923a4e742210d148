//! Cooperative shutdown signal shared by every background supervisor,
//! grounded on `everruns-worker::worker::TemporalWorker`'s
//! `watch::channel(false)` pair: one sender held by `main`, one receiver
//! cloned into each spawned loop, so `ctrl_c` fans out to every supervisor
//! at once instead of each loop polling its own flag.

use tokio::sync::watch;

#[derive(Clone)]
pub struct ShutdownHandle {
    rx: watch::Receiver<bool>,
}

impl ShutdownHandle {
    /// Resolves once shutdown has been signalled; cheap to call in a
    /// `tokio::select!` arm on every loop iteration (spec §5: "every
    /// in-flight request observes cancellation at each suspension point").
    pub async fn signalled(&mut self) {
        let _ = self.rx.changed().await;
    }

    pub fn is_signalled(&self) -> bool {
        *self.rx.borrow()
    }
}

pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> (Self, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownHandle { rx })
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle { rx: self.tx.subscribe() }
    }

    /// Waits for SIGINT, then fans shutdown out to every supervisor (spec
    /// §5 "Cancellation": "Workflow cancellation is cooperative" -- process
    /// shutdown is cooperative the same way).
    pub async fn wait_for_ctrl_c(&self) {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
        let _ = self.tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_fans_out_to_every_clone() {
        let (controller, mut a) = ShutdownController::new();
        let mut b = controller.handle();
        assert!(!a.is_signalled());
        assert!(!b.is_signalled());

        let _ = tokio::join!(
            async {
                let _ = controller.tx.send(true);
            },
            a.signalled(),
            b.signalled(),
        );
        assert!(a.is_signalled());
        assert!(b.is_signalled());
    }
}
