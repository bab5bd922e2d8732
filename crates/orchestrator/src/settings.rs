use std::sync::Arc;

use parking_lot::RwLock;
use relay_core::Credentials;
use scope::ScopeConfig;

/// Configuration the scanning decisions depend on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSettings {
    pub api_key: Option<String>,
    pub workspace_id: Option<String>,
    pub scoped_domain: Option<String>,
    pub automate_scan: bool,
}

impl ScanSettings {
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::new(self.api_key.as_deref(), self.workspace_id.as_deref())
    }

    pub fn scope(&self) -> ScopeConfig {
        ScopeConfig::parse(self.scoped_domain.as_deref().unwrap_or(""))
    }
}

/// Shared, mutable settings. Readers take one [`snapshot`](SettingsStore::snapshot) per
/// decision and never see a half-applied update.
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: RwLock<Arc<ScanSettings>>,
}

impl SettingsStore {
    pub fn new(settings: ScanSettings) -> Self {
        SettingsStore { current: RwLock::new(Arc::new(settings)) }
    }

    pub fn snapshot(&self) -> Arc<ScanSettings> {
        self.current.read().clone()
    }

    pub fn replace(&self, settings: ScanSettings) {
        *self.current.write() = Arc::new(settings);
    }

    /// Copy-on-write update; returns the new snapshot.
    pub fn update(&self, f: impl FnOnce(&mut ScanSettings)) -> Arc<ScanSettings> {
        let mut guard = self.current.write();
        let mut next = ScanSettings::clone(&guard);
        f(&mut next);
        let next = Arc::new(next);
        *guard = next.clone();
        next
    }
}
