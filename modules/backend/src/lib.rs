//! REST client for the remote scanning service.
//!
//! Every call authenticates with the trimmed API key in `X-Jsmon-Key`. Read operations
//! degrade to an empty value on failure and log why; the secrets page keeps the failure
//! so callers can tell an unauthorized key apart from other errors.

use std::future::Future;
use std::time::Duration;

use intel::{
    Category, CountSnapshot, IntelligenceEntry, PageWalker, SecretRow, UserProfile, Workspace, MAX_PAGES, PAGE_SIZE,
};
use relay_core::{Credentials, ScanOutcome, ScanTarget, Submitter};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.jsmon.sh/api/v2";
pub const API_KEY_HEADER: &str = "X-Jsmon-Key";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("HTTP {code}")]
    Status { code: u16, body: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API key or workspace ID not configured")]
    MissingConfig,
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub timeout_ms: u64,
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30_000,
            user_agent: format!("jsrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new(opts: ClientOptions) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(opts.timeout_ms))
            .user_agent(opts.user_agent)
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .build()?;
        Ok(Client { http, base_url: opts.base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, api_key: &str, path: &str) -> RequestBuilder {
        self.http.get(format!("{}{}", self.base_url, path)).header(API_KEY_HEADER, api_key.trim())
    }

    fn post(&self, api_key: &str, path: &str) -> RequestBuilder {
        self.http.post(format!("{}{}", self.base_url, path)).header(API_KEY_HEADER, api_key.trim())
    }

    pub async fn list_workspaces(&self, api_key: &str) -> Vec<Workspace> {
        if api_key.trim().is_empty() {
            warn!("API key not set, not listing workspaces");
            return Vec::new();
        }
        match fetch(self.get(api_key, "/getWorkspaces")).await {
            Ok((StatusCode::OK, body)) => intel::parse_workspaces(&body),
            Ok((status, _)) => {
                error!("getWorkspaces failed (HTTP {})", status.as_u16());
                Vec::new()
            }
            Err(e) => {
                error!("error fetching workspaces: {}", e);
                Vec::new()
            }
        }
    }

    /// Returns the new workspace id.
    pub async fn create_workspace(&self, api_key: &str, name: &str) -> Option<String> {
        if api_key.trim().is_empty() {
            warn!("API key not set, not creating workspace");
            return None;
        }
        if name.trim().is_empty() {
            warn!("workspace name cannot be empty");
            return None;
        }
        let req = self.post(api_key, "/createWorkspace").json(&json!({ "name": name }));
        match fetch(req).await {
            Ok((status, body)) if status.is_success() => {
                let id = intel::parse_created_workspace_id(&body);
                if id.is_none() {
                    error!("could not extract workspace ID from response: {}", preview(&body));
                }
                id
            }
            Ok((status, body)) => {
                error!("createWorkspace failed (HTTP {}): {}", status.as_u16(), preview(&body));
                None
            }
            Err(e) => {
                error!("error creating workspace: {}", e);
                None
            }
        }
    }

    pub async fn view_profile(&self, api_key: &str) -> Option<UserProfile> {
        if api_key.trim().is_empty() {
            return None;
        }
        match fetch(self.get(api_key, "/viewProfile")).await {
            Ok((status, body)) if status.is_success() => Some(intel::parse_profile(&body)),
            Ok((status, body)) => {
                error!("viewProfile failed (HTTP {}): {}", status.as_u16(), preview(&body));
                None
            }
            Err(e) => {
                error!("error fetching user profile: {}", e);
                None
            }
        }
    }

    pub async fn upload_url(&self, creds: &Credentials, target: &ScanTarget) -> ScanOutcome {
        let req = self
            .post(&creds.api_key, "/uploadUrl")
            .query(&[("wkspId", creds.workspace_id.as_str())])
            .json(&upload_body(target));
        match fetch(req).await {
            Ok((status, _)) if status.is_success() => ScanOutcome::success(&target.url, status.as_u16()),
            Ok((status, body)) => {
                error!("failed to send {} (HTTP {}): {}", target.url, status.as_u16(), preview(&body));
                let msg = if body.trim().is_empty() { format!("HTTP {}", status.as_u16()) } else { preview(&body) };
                ScanOutcome::failure(&target.url, Some(status.as_u16()), msg)
            }
            Err(e) => {
                error!("error calling backend for {}: {}", target.url, e);
                ScanOutcome::failure(&target.url, None, e.to_string())
            }
        }
    }

    pub async fn total_counts(&self, creds: &Credentials) -> CountSnapshot {
        let req = self
            .get(&creds.api_key, "/totalCountAnalysis")
            .query(&[("wkspId", creds.workspace_id.as_str()), ("runId", "")]);
        match fetch(req).await {
            Ok((StatusCode::OK, body)) => intel::parse_counts(&body),
            Ok((status, _)) => {
                error!("failed to fetch counts (HTTP {})", status.as_u16());
                CountSnapshot::default()
            }
            Err(e) => {
                error!("error fetching counts: {}", e);
                CountSnapshot::default()
            }
        }
    }

    pub async fn secrets_page(&self, creds: &Credentials, page: u32) -> Result<Vec<SecretRow>, BackendError> {
        let page = page.max(1).to_string();
        let limit = PAGE_SIZE.to_string();
        let req = self.get(&creds.api_key, "/keysAndSecrets").query(&[
            ("wkspId", creds.workspace_id.as_str()),
            ("page", page.as_str()),
            ("runId", ""),
            ("lastScannedOn", ""),
            ("formDate", ""),
            ("toDate", ""),
            ("limit", limit.as_str()),
        ]);
        let (status, body) = fetch(req).await?;
        match status {
            StatusCode::OK => Ok(intel::parse_secrets(&body)),
            StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized),
            other => Err(BackendError::Status { code: other.as_u16(), body: preview(&body) }),
        }
    }

    pub async fn intelligence_page(&self, creds: &Credentials, category: Category, page: u32) -> Vec<IntelligenceEntry> {
        if category == Category::Secrets {
            warn!("secrets are not served by the intelligence endpoint");
            return Vec::new();
        }
        let page = page.max(1).to_string();
        let req = self.get(&creds.api_key, "/intelligence").query(&[
            ("wkspId", creds.workspace_id.as_str()),
            ("options", category.key()),
            ("page", page.as_str()),
            ("runId", ""),
            ("search", ""),
            ("status", ""),
        ]);
        match fetch(req).await {
            Ok((StatusCode::OK, body)) => intel::parse_intelligence(&body),
            Ok((StatusCode::UNAUTHORIZED, _)) => {
                error!("failed to fetch {} (unauthorized)", category);
                Vec::new()
            }
            Ok((status, _)) => {
                error!("failed to fetch {} (HTTP {})", category, status.as_u16());
                Vec::new()
            }
            Err(e) => {
                error!("error fetching {}: {}", category, e);
                Vec::new()
            }
        }
    }

    /// Every page of a category, values de-duplicated in first-seen order.
    pub async fn all_intelligence(
        &self,
        creds: &Credentials,
        category: Category,
        counts: &CountSnapshot,
    ) -> Vec<IntelligenceEntry> {
        let pages = walk_pages(category.key(), counts, |page| async move {
            Ok::<_, BackendError>(self.intelligence_page(creds, category, page).await)
        });
        match pages.await {
            Ok(entries) => intel::dedup_values(entries),
            Err(e) => {
                error!("error fetching {}: {}", category, e);
                Vec::new()
            }
        }
    }

    /// Every secrets page. Without a known total, walks until a page is short.
    pub async fn all_secrets(&self, creds: &Credentials, counts: &CountSnapshot) -> Result<Vec<SecretRow>, BackendError> {
        walk_pages(Category::Secrets.key(), counts, |page| self.secrets_page(creds, page)).await
    }
}

/// Fetch pages in order until the walker says stop; the first error aborts the walk.
async fn walk_pages<T, E, F, Fut>(field_key: &str, counts: &CountSnapshot, mut fetch_page: F) -> Result<Vec<T>, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>, E>>,
{
    let mut walk = PageWalker::new(field_key, counts);
    let mut rows = Vec::new();
    while let Some(page) = walk.next_page() {
        let batch = fetch_page(page).await?;
        walk.record(batch.len());
        rows.extend(batch);
    }
    if walk.hit_cap() {
        warn!("{}: stopped after {} pages", field_key, MAX_PAGES);
    }
    Ok(rows)
}

#[async_trait::async_trait]
impl Submitter for Client {
    async fn submit(&self, creds: &Credentials, target: &ScanTarget) -> ScanOutcome {
        self.upload_url(creds, target).await
    }
}

async fn fetch(req: RequestBuilder) -> Result<(StatusCode, String), reqwest::Error> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    debug!("backend responded HTTP {} ({} bytes)", status.as_u16(), body.len());
    Ok((status, body))
}

/// `{"url": ..., "headers": [{"Name": "value"}, ...]}`; `headers` only when something survives filtering.
pub fn upload_body(target: &ScanTarget) -> Value {
    let mut body = Map::new();
    body.insert("url".into(), Value::String(target.url.clone()));
    let headers: Vec<Value> = target
        .forwarded_headers()
        .into_iter()
        .map(|h| {
            let mut one = Map::new();
            one.insert(h.name.clone(), Value::String(h.value.clone()));
            Value::Object(one)
        })
        .collect();
    if !headers.is_empty() {
        body.insert("headers".into(), Value::Array(headers));
    }
    Value::Object(body)
}

fn preview(body: &str) -> String {
    let t = body.trim();
    match t.char_indices().nth(300) {
        Some((i, _)) => format!("{}...", &t[..i]),
        None => t.to_string(),
    }
}
