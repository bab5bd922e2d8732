use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Running,
    Cancelling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub scanned: usize,
    pub failed: usize,
    pub cancel_requested: bool,
}

/// State of the single bulk-scan session: Idle -> Running -> (Cancelling) -> Idle.
#[derive(Debug)]
pub struct SessionState {
    inner: Mutex<SessionSnapshot>,
    cancel: AtomicBool,
}

impl Default for SessionState {
    fn default() -> Self {
        SessionState {
            inner: Mutex::new(SessionSnapshot {
                phase: SessionPhase::Idle,
                scanned: 0,
                failed: 0,
                cancel_requested: false,
            }),
            cancel: AtomicBool::new(false),
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> Running with fresh counters. `false` if a session is already active.
    pub fn try_begin(&self) -> bool {
        let mut s = self.inner.lock();
        if s.phase != SessionPhase::Idle {
            return false;
        }
        *s = SessionSnapshot { phase: SessionPhase::Running, scanned: 0, failed: 0, cancel_requested: false };
        self.cancel.store(false, Ordering::SeqCst);
        true
    }

    /// Running -> Cancelling. Returns whether there was a running session to cancel.
    pub fn request_cancel(&self) -> bool {
        let mut s = self.inner.lock();
        if s.phase != SessionPhase::Running {
            return false;
        }
        s.phase = SessionPhase::Cancelling;
        s.cancel_requested = true;
        self.cancel.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn record(&self, succeeded: bool) {
        let mut s = self.inner.lock();
        if succeeded {
            s.scanned += 1;
        } else {
            s.failed += 1;
        }
    }

    /// Back to Idle; counters are kept for inspection until the next begin.
    pub fn finish(&self) {
        let mut s = self.inner.lock();
        s.phase = SessionPhase::Idle;
        s.cancel_requested = false;
        self.cancel.store(false, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        *self.inner.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let s = SessionState::new();
        assert!(!s.request_cancel());
        assert!(s.try_begin());
        assert!(!s.try_begin());
        s.record(true);
        s.record(false);
        assert!(s.request_cancel());
        assert!(s.is_cancel_requested());
        assert_eq!(s.snapshot().phase, SessionPhase::Cancelling);
        assert!(!s.try_begin());
        s.finish();
        let snap = s.snapshot();
        assert_eq!(snap.phase, SessionPhase::Idle);
        assert_eq!((snap.scanned, snap.failed), (1, 1));
        assert!(!s.is_cancel_requested());
        assert!(s.try_begin());
        assert_eq!(s.snapshot().scanned, 0);
    }
}
