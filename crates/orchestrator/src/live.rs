use std::sync::Arc;

use relay_core::{Exchange, ScanTarget};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::scan::{LiveDecision, Orchestrator};

/// Non-blocking front of the live path: decisions are made on the caller's thread,
/// submissions run on one background worker in arrival order.
pub struct LiveHandle {
    orch: Arc<Orchestrator>,
    tx: mpsc::UnboundedSender<ScanTarget>,
    worker: JoinHandle<()>,
}

impl LiveHandle {
    /// Must be called inside a tokio runtime.
    pub fn spawn(orch: Arc<Orchestrator>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<ScanTarget>();
        let worker_orch = Arc::clone(&orch);
        let worker = tokio::spawn(async move {
            while let Some(target) = rx.recv().await {
                worker_orch.submit_live(target).await;
            }
            debug!("live submission worker finished");
        });
        LiveHandle { orch, tx, worker }
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orch
    }

    /// Called once per completed exchange. Never waits on the network.
    pub fn on_response<E: Exchange + ?Sized>(&self, event: &E) -> LiveDecision {
        let decision = self.orch.classify_live(event);
        if let LiveDecision::Submit(target) = &decision {
            if self.tx.send(target.clone()).is_err() {
                warn!("live worker is gone, dropping {}", target.url);
            }
        }
        decision
    }

    /// Stop accepting events and wait for queued submissions to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            warn!("live worker ended abnormally: {}", e);
        }
    }
}
