use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// Rows per page on every paginated endpoint.
pub const PAGE_SIZE: usize = 100;

/// Upper bound on pages fetched by one "fetch everything" walk.
pub const MAX_PAGES: u32 = 100;

/// Data categories the service counts and pages through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Secrets,
    JsUrls,
    ApiPaths,
    Urls,
    Domains,
    IpAddresses,
    Emails,
    S3Domains,
    InvalidNodeModules,
}

#[derive(Debug, Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl Category {
    /// Categories served by the intelligence endpoint (everything but secrets).
    pub const INTELLIGENCE: [Category; 8] = [
        Category::JsUrls,
        Category::ApiPaths,
        Category::Urls,
        Category::Domains,
        Category::IpAddresses,
        Category::Emails,
        Category::S3Domains,
        Category::InvalidNodeModules,
    ];

    /// Field key, also the `options` value of the intelligence endpoint.
    pub fn key(self) -> &'static str {
        match self {
            Category::Secrets => "secrets",
            Category::JsUrls => "jsurls",
            Category::ApiPaths => "apipaths",
            Category::Urls => "urls",
            Category::Domains => "domains",
            Category::IpAddresses => "ipaddresses",
            Category::Emails => "emails",
            Category::S3Domains => "s3domains",
            Category::InvalidNodeModules => "invalidnodemodules",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Secrets => "Secrets",
            Category::JsUrls => "JS URLs",
            Category::ApiPaths => "API Paths",
            Category::Urls => "URLs",
            Category::Domains => "Domains",
            Category::IpAddresses => "IP Addresses",
            Category::Emails => "Emails",
            Category::S3Domains => "S3 Buckets",
            Category::InvalidNodeModules => "Invalid Node Modules",
        }
    }

    /// Backend count names for this category, most current first.
    pub fn count_aliases(self) -> &'static [&'static str] {
        match self {
            Category::Secrets => &["totalJwtTokens", "totalSecrets", "secrets"],
            Category::JsUrls => &["totalJsUrls", "jsurls"],
            Category::ApiPaths => &["totalApiPaths", "apipaths"],
            Category::Urls => &["totalUrls", "urls"],
            Category::Domains => &["totalDomains", "domains"],
            Category::IpAddresses => &["totalIpAddresses", "ipaddresses"],
            Category::Emails => &["totalEmails", "emails"],
            Category::S3Domains => &["totalS3Domains", "s3domains"],
            Category::InvalidNodeModules => &[
                "totalInvalidNodeModules",
                "invalidnodemodules",
                "totalNpmConfusion",
                "totalNpmConfusions",
                "npmconfusion",
            ],
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let k = s.trim().to_lowercase();
        if k == "secrets" {
            return Ok(Category::Secrets);
        }
        Category::INTELLIGENCE
            .into_iter()
            .find(|c| c.key() == k)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Last fetched per-field totals. May lag the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CountSnapshot {
    pub counts: HashMap<String, u64>,
}

impl CountSnapshot {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, u64)>,
        K: Into<String>,
    {
        CountSnapshot { counts: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// First non-zero count among the field's aliases; unknown keys are looked up as-is.
    pub fn resolve(&self, field_key: &str) -> Option<u64> {
        let owned = [field_key];
        let aliases: &[&str] = match field_key.parse::<Category>() {
            Ok(c) => c.count_aliases(),
            Err(_) => &owned,
        };
        aliases
            .iter()
            .filter_map(|a| self.counts.get(*a).copied())
            .find(|n| *n > 0)
    }
}

/// Where the caller currently is in a paginated list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based.
    pub current_page: u32,
    /// Rows the current page returned.
    pub last_page_rows: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination { current_page: 1, last_page_rows: 0 }
    }
}

impl Pagination {
    pub fn new(current_page: u32, last_page_rows: usize) -> Self {
        Pagination { current_page: current_page.max(1), last_page_rows }
    }

    pub fn total_pages(&self, field_key: &str, counts: &CountSnapshot) -> u32 {
        total_pages(field_key, counts, self)
    }

    pub fn has_next(&self, field_key: &str, counts: &CountSnapshot) -> bool {
        self.current_page < self.total_pages(field_key, counts) || self.last_page_rows == PAGE_SIZE
    }
}

/// Page count for a field. Never below 1.
///
/// Without a known count, a full last page implies at least one more page; a short
/// one means the current page is the last.
pub fn total_pages(field_key: &str, counts: &CountSnapshot, page: &Pagination) -> u32 {
    match counts.resolve(field_key) {
        Some(n) => {
            let pages = (n as usize).div_ceil(PAGE_SIZE);
            u32::try_from(pages).unwrap_or(u32::MAX).max(1)
        }
        None if page.last_page_rows == PAGE_SIZE => page.current_page.max(1).saturating_add(1),
        None => page.current_page.max(1),
    }
}

/// Drives a fetch-every-page loop for one field.
///
/// Ask for [`next_page`](Self::next_page), fetch it, then [`record`](Self::record) how
/// many rows came back. Stops on an empty page, when [`Pagination::has_next`] says
/// there is nothing more, or after [`MAX_PAGES`].
#[derive(Debug, Clone)]
pub struct PageWalker {
    field_key: String,
    counts: CountSnapshot,
    current: u32,
    done: bool,
    capped: bool,
}

impl PageWalker {
    pub fn new(field_key: impl Into<String>, counts: &CountSnapshot) -> Self {
        PageWalker { field_key: field_key.into(), counts: counts.clone(), current: 1, done: false, capped: false }
    }

    pub fn next_page(&self) -> Option<u32> {
        (!self.done).then_some(self.current)
    }

    pub fn record(&mut self, rows: usize) {
        if self.done {
            return;
        }
        let page = Pagination::new(self.current, rows);
        if rows == 0 || !page.has_next(&self.field_key, &self.counts) {
            self.done = true;
        } else if self.current >= MAX_PAGES {
            self.done = true;
            self.capped = true;
        } else {
            self.current += 1;
        }
    }

    /// Whether the walk ended on the page cap rather than running out of rows.
    pub fn hit_cap(&self) -> bool {
        self.capped
    }
}
