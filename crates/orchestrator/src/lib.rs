//! Scan orchestration: decides which observed URLs reach the scanning backend, submits
//! each at most once per configuration epoch, and drives cancellable history sweeps.

mod dedup;
mod live;
mod scan;
mod session;
mod settings;
mod sink;

pub use dedup::DedupStore;
pub use live::LiveHandle;
pub use scan::{LiveDecision, Orchestrator, ScanSummary, ScanTrigger};
pub use session::{SessionPhase, SessionSnapshot, SessionState};
pub use settings::{ScanSettings, SettingsStore};
pub use sink::{NoRefresh, RefreshHook, StatusSink};
