//! Core types shared by the relay crates: observed traffic, scan targets and outcomes.

pub mod pacer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Request headers that are never forwarded to the scanning backend.
pub const SKIPPED_HEADERS: &[&str] = &[
    "Host",
    "Connection",
    "Content-Length",
    "Transfer-Encoding",
    "Upgrade",
    "TE",
    "Trailer",
    "Keep-Alive",
];

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("traffic history unavailable: {0}")]
    History(String),
    #[error("API key or workspace ID not configured")]
    MissingConfig,
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

impl HeaderPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        HeaderPair { name: name.into(), value: value.into() }
    }
}

/// Read-only view of one proxied exchange. Host integrations implement this once;
/// the scanning code only ever asks for these three things.
pub trait Exchange {
    fn url(&self) -> &str;
    /// Request headers, or `None` when the original request is no longer available.
    fn headers(&self) -> Option<&[HeaderPair]>;
    fn content_type(&self) -> Option<&str>;
}

/// One exchange as delivered by the traffic source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficEvent {
    pub url: String,
    #[serde(default)]
    pub request_headers: Option<Vec<HeaderPair>>,
    #[serde(default)]
    pub response_content_type: Option<String>,
}

impl TrafficEvent {
    pub fn new(url: impl Into<String>) -> Self {
        TrafficEvent { url: url.into(), request_headers: None, response_content_type: None }
    }

    pub fn with_headers(mut self, headers: Vec<HeaderPair>) -> Self {
        self.request_headers = Some(headers);
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.response_content_type = Some(content_type.into());
        self
    }
}

impl Exchange for TrafficEvent {
    fn url(&self) -> &str {
        &self.url
    }

    fn headers(&self) -> Option<&[HeaderPair]> {
        self.request_headers.as_deref()
    }

    fn content_type(&self) -> Option<&str> {
        self.response_content_type.as_deref()
    }
}

/// Ordered, front-to-back traffic history.
pub trait TrafficSource: Send + Sync {
    type Entry: Exchange + Send;

    fn history(&self) -> Result<Vec<Self::Entry>, RelayError>;
}

impl TrafficSource for Vec<TrafficEvent> {
    type Entry = TrafficEvent;

    fn history(&self) -> Result<Vec<TrafficEvent>, RelayError> {
        Ok(self.clone())
    }
}

/// The unit submitted to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub url: String,
    pub source_headers: Option<Vec<HeaderPair>>,
}

impl ScanTarget {
    pub fn from_exchange<E: Exchange + ?Sized>(exchange: &E) -> Self {
        ScanTarget {
            url: exchange.url().to_string(),
            source_headers: exchange.headers().map(|h| h.to_vec()),
        }
    }

    /// Header-less target built from the URL alone.
    pub fn bare(url: impl Into<String>) -> Self {
        ScanTarget { url: url.into(), source_headers: None }
    }

    /// Headers worth forwarding: skip-list entries (any case) and empty values are dropped.
    pub fn forwarded_headers(&self) -> Vec<&HeaderPair> {
        self.source_headers
            .iter()
            .flatten()
            .filter(|h| !h.value.is_empty())
            .filter(|h| !SKIPPED_HEADERS.iter().any(|s| s.eq_ignore_ascii_case(h.name.trim())))
            .collect()
    }
}

/// Result of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub url: String,
    pub succeeded: bool,
    pub http_status: Option<u16>,
    pub error_message: Option<String>,
}

impl ScanOutcome {
    pub fn success(url: impl Into<String>, status: u16) -> Self {
        ScanOutcome { url: url.into(), succeeded: true, http_status: Some(status), error_message: None }
    }

    pub fn failure(url: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        ScanOutcome {
            url: url.into(),
            succeeded: false,
            http_status: status,
            error_message: Some(message.into()),
        }
    }
}

/// Sends one target to the scanning backend. Failures are reported in the outcome,
/// never raised.
#[async_trait::async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, creds: &Credentials, target: &ScanTarget) -> ScanOutcome;
}

/// API key and workspace, both present and trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub workspace_id: String,
}

impl Credentials {
    pub fn new(api_key: Option<&str>, workspace_id: Option<&str>) -> Option<Self> {
        let api_key = api_key.map(str::trim).filter(|s| !s.is_empty())?;
        let workspace_id = workspace_id.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Credentials { api_key: api_key.to_string(), workspace_id: workspace_id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn forwarded_headers_drop_hop_by_hop() {
        let target = ScanTarget::from_exchange(&TrafficEvent::new("https://a.example/x.js").with_headers(vec![
            HeaderPair::new("Host", "a.example"),
            HeaderPair::new("cookie", "sid=1"),
            HeaderPair::new("content-length", "0"),
            HeaderPair::new("Keep-Alive", "timeout=5"),
            HeaderPair::new("X-Empty", ""),
            HeaderPair::new("User-Agent", "test"),
        ]));
        let names: Vec<&str> = target.forwarded_headers().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["cookie", "User-Agent"]);
    }

    #[test]
    fn bare_target_has_no_headers() {
        assert!(ScanTarget::bare("https://a.example/x.js").forwarded_headers().is_empty());
    }

    #[test]
    fn credentials_require_both_values() {
        assert!(Credentials::new(Some("key"), None).is_none());
        assert!(Credentials::new(Some("  "), Some("w1")).is_none());
        let c = Credentials::new(Some(" key "), Some("w1")).unwrap();
        assert_eq!(c.api_key, "key");
    }
}
