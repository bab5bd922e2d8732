use anyhow::{bail, Context, Result};
use backend::ClientOptions;
use orchestrator::ScanSettings;
use relay_core::Credentials;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "jsrelay.yaml";

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Comma separated root domains; absent means every domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoped_domain: Option<String>,
    #[serde(default)]
    pub automate_scan: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_qps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl Config {
    /// Blank strings become absent.
    pub fn normalized(self) -> Self {
        Config {
            api_key: non_empty(self.api_key),
            workspace_id: non_empty(self.workspace_id),
            scoped_domain: non_empty(self.scoped_domain),
            base_url: non_empty(self.base_url),
            ..self
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::new(self.api_key.as_deref(), self.workspace_id.as_deref())
    }

    /// Credentials for a `watch` session; refused while automatic scanning is off.
    pub fn require_automation(&self) -> Result<Credentials> {
        if !self.automate_scan {
            bail!("automatic scanning is off; enable it with `jsrelay config set --automate on`");
        }
        match self.credentials() {
            Some(c) => Ok(c),
            None => bail!("automatic scanning requires an API key and workspace ID"),
        }
    }

    pub fn scan_settings(&self) -> ScanSettings {
        ScanSettings {
            api_key: self.api_key.clone(),
            workspace_id: self.workspace_id.clone(),
            scoped_domain: self.scoped_domain.clone(),
            automate_scan: self.automate_scan,
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        let mut opts = ClientOptions::default();
        if let Some(url) = &self.base_url {
            opts.base_url = url.clone();
        }
        if let Some(ms) = self.timeout_ms {
            opts.timeout_ms = ms;
        }
        opts
    }

    pub fn masked_key(&self) -> String {
        match &self.api_key {
            Some(k) => mask(k),
            None => "(not set)".into(),
        }
    }
}

pub fn mask(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    if key.chars().count() <= 8 {
        return "********".into();
    }
    format!("{}********", visible)
}

pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// A missing file is an empty configuration.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if s.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = serde_yaml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg.normalized())
}

pub fn save_config(path: &Path, cfg: &Config) -> Result<()> {
    let s = serde_yaml::to_string(&cfg.clone().normalized())?;
    fs::write(path, s).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_absent() {
        let cfg: Config = serde_yaml::from_str("api_key: '  '\nworkspace_id: ws-1\nscoped_domain: ''\n").unwrap();
        let cfg = cfg.normalized();
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.workspace_id.as_deref(), Some("ws-1"));
        assert_eq!(cfg.scoped_domain, None);
        assert!(!cfg.automate_scan);
        assert!(cfg.credentials().is_none());
    }

    #[test]
    fn saved_yaml_omits_absent_keys() {
        let cfg = Config { workspace_id: Some("ws-1".into()), api_key: Some(" ".into()), ..Default::default() };
        let s = serde_yaml::to_string(&cfg.normalized()).unwrap();
        assert!(s.contains("workspace_id: ws-1"));
        assert!(!s.contains("api_key"));
    }

    #[test]
    fn automation_gate_honours_saved_flag() {
        let mut cfg = Config {
            api_key: Some("abcd1234efgh".into()),
            workspace_id: Some("ws-1".into()),
            ..Default::default()
        };
        let err = cfg.require_automation().unwrap_err();
        assert!(err.to_string().contains("automatic scanning is off"));

        cfg.automate_scan = true;
        assert_eq!(cfg.require_automation().unwrap().workspace_id, "ws-1");

        cfg.workspace_id = None;
        assert!(cfg.require_automation().is_err());
    }

    #[test]
    fn key_is_masked() {
        assert_eq!(mask("abcd1234efgh"), "abcd********");
        assert_eq!(mask("short"), "********");
    }

    #[test]
    fn client_options_override_defaults() {
        let cfg = Config { base_url: Some("http://localhost:8080/api".into()), ..Default::default() };
        let opts = cfg.client_options();
        assert_eq!(opts.base_url, "http://localhost:8080/api");
        assert_eq!(opts.timeout_ms, ClientOptions::default().timeout_ms);
    }
}
