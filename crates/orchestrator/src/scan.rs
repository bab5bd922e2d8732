use std::collections::HashSet;
use std::sync::Arc;

use relay_core::pacer::SubmitPacer;
use relay_core::{Exchange, ScanOutcome, ScanTarget, Submitter, TrafficSource};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupStore;
use crate::session::SessionState;
use crate::settings::{ScanSettings, SettingsStore};
use crate::sink::{NoRefresh, RefreshHook, StatusSink};

/// What the live path decided for one observed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveDecision {
    Disabled,
    NotConfigured,
    OutOfScope,
    NotScannable,
    Duplicate,
    /// Marked as processed; hand this to [`Orchestrator::submit_live`].
    Submit(ScanTarget),
}

/// Which condition ends a bulk scan early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTrigger {
    /// Stops only on an explicit cancel.
    Manual,
    /// Also stops as soon as automatic scanning is switched off.
    Automatic,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub stopped: bool,
    pub error: Option<String>,
    pub outcomes: Vec<ScanOutcome>,
}

impl ScanSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

pub struct Orchestrator {
    settings: Arc<SettingsStore>,
    dedup: DedupStore,
    session: SessionState,
    submitter: Arc<dyn Submitter>,
    sink: Arc<dyn StatusSink>,
    hooks: Arc<dyn RefreshHook>,
    pacer: Option<SubmitPacer>,
}

impl Orchestrator {
    pub fn new(settings: Arc<SettingsStore>, submitter: Arc<dyn Submitter>, sink: Arc<dyn StatusSink>) -> Self {
        Orchestrator {
            settings,
            dedup: DedupStore::new(),
            session: SessionState::new(),
            submitter,
            sink,
            hooks: Arc::new(NoRefresh),
            pacer: None,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn RefreshHook>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Limit submissions to `qps` per second; 0 leaves them unpaced.
    pub fn with_submit_qps(mut self, qps: u32) -> Self {
        self.pacer = SubmitPacer::new(qps);
        self
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    fn status(&self, line: impl AsRef<str>) {
        debug!(target: "status", "{}", line.as_ref());
        self.sink.status(line.as_ref());
    }

    /// Forget every processed URL so the next sweep starts cold.
    pub fn clear_processed(&self) {
        let n = self.dedup.len();
        self.dedup.clear();
        debug!("cleared {} processed URL(s)", n);
    }

    /// Ask the running bulk scan to stop after its current submission.
    pub fn cancel_scan(&self) -> bool {
        let cancelled = self.session.request_cancel();
        if cancelled {
            self.status("Stopping scan...");
        }
        cancelled
    }

    /// Sweep `source` once: filter, dedup, submit sequentially in history order.
    ///
    /// `should_stop` is polled before every submission; once it fires no further
    /// URL is submitted. Never panics on backend failures, they are counted instead.
    pub async fn run_scan<S>(&self, source: &S, should_stop: &(dyn Fn() -> bool + Send + Sync)) -> ScanSummary
    where
        S: TrafficSource + ?Sized,
    {
        let settings = self.settings.snapshot();
        let Some(creds) = settings.credentials() else {
            warn!("scan requested without API key or workspace ID");
            self.status("✗ Cannot scan - API key or workspace ID not configured");
            return ScanSummary::default();
        };

        let targets = match self.collect_targets(source, &settings) {
            Ok(t) => t,
            Err(e) => {
                error!("error scanning traffic history: {}", e);
                self.status(format!("✗ Error: {}", e));
                return ScanSummary { error: Some(e.to_string()), ..Default::default() };
            }
        };

        let total = targets.len();
        let mut summary = ScanSummary { candidates: total, ..Default::default() };
        self.status(format!("Found {} scannable file(s) to scan", total));

        for (i, target) in targets.into_iter().enumerate() {
            if let Some(pacer) = &self.pacer {
                pacer.acquire().await;
            }
            if should_stop() {
                summary.stopped = true;
                summary.skipped += total - i;
                break;
            }
            // a live submission may have claimed it since collection
            if !self.dedup.insert(&target.url) {
                debug!("{} already submitted, skipping", target.url);
                summary.skipped += 1;
                continue;
            }

            self.status(format!("[{}/{}] Scanning: {}", i + 1, total, target.url));
            let outcome = self.submitter.submit(&creds, &target).await;
            self.session.record(outcome.succeeded);
            if outcome.succeeded {
                summary.succeeded += 1;
                self.status(format!("[{}/{}] ✓ Success: {}", i + 1, total, target.url));
                self.hooks.refresh_profile();
            } else {
                summary.failed += 1;
                let reason = outcome.error_message.as_deref().unwrap_or("unknown error");
                self.status(format!("[{}/{}] ✗ Failed: {} ({})", i + 1, total, target.url, reason));
            }
            summary.outcomes.push(outcome);
        }

        if summary.stopped {
            info!(succeeded = summary.succeeded, failed = summary.failed, skipped = summary.skipped, "scan stopped");
            self.status(format!(
                "⏹ Scan stopped: {} succeeded, {} failed, {} skipped",
                summary.succeeded, summary.failed, summary.skipped
            ));
        } else {
            info!(succeeded = summary.succeeded, failed = summary.failed, "scan completed");
            self.status(format!("✓ Scan completed: {} succeeded, {} failed", summary.succeeded, summary.failed));
        }
        if summary.attempted() > 0 {
            self.hooks.refresh_secrets();
        }
        summary
    }

    /// First pass: in-scope, scannable, not yet processed, first occurrence wins.
    fn collect_targets<S>(&self, source: &S, settings: &ScanSettings) -> Result<Vec<ScanTarget>, relay_core::RelayError>
    where
        S: TrafficSource + ?Sized,
    {
        let scope = settings.scope();
        let entries = source.history()?;
        self.status(format!("Found {} entries in traffic history", entries.len()));

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for entry in &entries {
            let url = entry.url();
            if !scope.matches(url) || !classify::is_scannable_exchange(entry) {
                continue;
            }
            if self.dedup.contains(url) || !seen.insert(url.to_string()) {
                continue;
            }
            targets.push(ScanTarget::from_exchange(entry));
        }
        Ok(targets)
    }

    /// Run a bulk scan in the background. `None` when a session is already active.
    pub fn start_bulk_scan<S>(self: &Arc<Self>, source: Arc<S>, trigger: ScanTrigger) -> Option<JoinHandle<ScanSummary>>
    where
        S: TrafficSource + 'static,
    {
        if !self.session.try_begin() {
            self.status("A scan is already running");
            return None;
        }
        let orch = Arc::clone(self);
        Some(tokio::spawn(async move {
            let _running = FinishOnDrop(&orch.session);
            let poll = Arc::clone(&orch);
            let should_stop = move || {
                poll.session.is_cancel_requested()
                    || (trigger == ScanTrigger::Automatic && !poll.settings.snapshot().automate_scan)
            };
            let summary = orch.run_scan(source.as_ref(), &should_stop).await;
            if trigger == ScanTrigger::Automatic && summary.error.is_none() && !summary.stopped {
                orch.status(format!(
                    "✓ Automatic scanning initialized - {} existing file(s) processed",
                    summary.attempted()
                ));
            }
            summary
        }))
    }

    /// Toggle automatic scanning. Enabling starts a fresh epoch and sweeps `source`;
    /// refused (flag stays off) without credentials.
    pub fn set_automate_scan<S>(self: &Arc<Self>, enabled: bool, source: Arc<S>) -> Option<JoinHandle<ScanSummary>>
    where
        S: TrafficSource + 'static,
    {
        let current = self.settings.snapshot();
        if !enabled {
            self.settings.update(|s| s.automate_scan = false);
            if current.automate_scan {
                self.status("Automatic scanning disabled");
            }
            return None;
        }
        if current.automate_scan {
            debug!("automatic scanning already enabled");
            return None;
        }
        if current.credentials().is_none() {
            warn!("cannot enable automatic scanning without API key and workspace ID");
            self.status("✗ Automatic scanning requires an API key and workspace ID");
            return None;
        }

        let next = self.settings.update(|s| s.automate_scan = true);
        self.clear_processed();
        self.status("🚀 Automatic scanning enabled - scanning existing history...");
        let scope = next.scope();
        if scope.is_unrestricted() {
            self.status("No domain scope - scanning all domains");
        } else {
            self.status(format!("Scoped domain: {}", scope.domains.join(", ")));
        }
        self.start_bulk_scan(source, ScanTrigger::Automatic)
    }

    /// Live path, synchronous half: decide and mark. Cheap enough for a response callback.
    pub fn classify_live<E: Exchange + ?Sized>(&self, event: &E) -> LiveDecision {
        let settings = self.settings.snapshot();
        if !settings.automate_scan {
            return LiveDecision::Disabled;
        }
        if settings.credentials().is_none() {
            debug!("automatic scan skipped: API key or workspace ID not configured");
            return LiveDecision::NotConfigured;
        }
        let url = event.url();
        if !settings.scope().matches(url) {
            return LiveDecision::OutOfScope;
        }
        if !classify::is_scannable_exchange(event) {
            return LiveDecision::NotScannable;
        }
        if !self.dedup.insert(url) {
            return LiveDecision::Duplicate;
        }
        self.status(format!("🔄 Auto-scanning: {}", url));
        LiveDecision::Submit(ScanTarget::from_exchange(event))
    }

    /// Live path, asynchronous half. `None` when automatic scanning was switched off
    /// or credentials vanished since the decision.
    pub async fn submit_live(&self, target: ScanTarget) -> Option<ScanOutcome> {
        let settings = self.settings.snapshot();
        if !settings.automate_scan {
            debug!("automatic scanning disabled before {} was submitted", target.url);
            return None;
        }
        let creds = settings.credentials()?;
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }
        let outcome = self.submitter.submit(&creds, &target).await;
        if outcome.succeeded {
            self.status(format!("  ✓ Success: {}", target.url));
            self.hooks.refresh_secrets();
            self.hooks.refresh_profile();
        } else {
            let reason = outcome.error_message.as_deref().unwrap_or("unknown error");
            self.status(format!("  ✗ Failed: {} ({})", target.url, reason));
        }
        Some(outcome)
    }

    /// Both halves of the live path inline.
    pub async fn on_response<E: Exchange + ?Sized>(&self, event: &E) -> Option<ScanOutcome> {
        match self.classify_live(event) {
            LiveDecision::Submit(target) => self.submit_live(target).await,
            _ => None,
        }
    }
}

struct FinishOnDrop<'a>(&'a SessionState);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}
