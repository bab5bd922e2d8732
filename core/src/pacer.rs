use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Spaces out backend submissions to at most `qps` per second.
pub struct SubmitPacer {
    sem: Arc<Semaphore>,
    refill: JoinHandle<()>,
}

impl SubmitPacer {
    /// Returns `None` for a zero rate (unpaced). Must be called inside a tokio runtime.
    pub fn new(qps: u32) -> Option<Self> {
        if qps == 0 {
            return None;
        }
        let sem = Arc::new(Semaphore::new(1));
        let sem_bg = sem.clone();
        let interval_ms = (1000u32 / qps).max(1) as u64;
        let refill = tokio::spawn(async move {
            let mut t = tokio::time::interval(Duration::from_millis(interval_ms));
            t.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                t.tick().await;
                // no bursting: at most one banked permit
                if sem_bg.available_permits() == 0 {
                    sem_bg.add_permits(1);
                }
            }
        });
        Some(SubmitPacer { sem, refill })
    }

    pub async fn acquire(&self) {
        if let Ok(permit) = self.sem.acquire().await {
            permit.forget();
        }
    }
}

impl Drop for SubmitPacer {
    fn drop(&mut self) {
        self.refill.abort();
    }
}
