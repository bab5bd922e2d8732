use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

/// Placeholder shown for a missing timestamp.
pub const NO_TIMESTAMP: &str = "—";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Workspace {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub account_type: Option<String>,
    /// Remaining JS scan credits.
    pub remaining: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecretRow {
    pub module_name: String,
    pub matched_word: String,
    pub severity: String,
    pub created_at: String,
}

/// One row of a paginated intelligence category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntelligenceEntry {
    pub value: String,
    pub observed_at: Option<String>,
}

impl IntelligenceEntry {
    pub fn new(value: impl Into<String>, observed_at: Option<String>) -> Self {
        IntelligenceEntry { value: value.into(), observed_at }
    }

    pub fn display_time(&self) -> &str {
        self.observed_at.as_deref().unwrap_or(NO_TIMESTAMP)
    }
}

/// Newest first; entries without a timestamp go last and keep their relative order.
pub fn sort_newest_first(entries: &mut [IntelligenceEntry]) {
    entries.sort_by(|a, b| match (&a.observed_at, &b.observed_at) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => y.cmp(x),
    });
}

/// Drops repeated values, keeping each first occurrence where it was.
pub fn dedup_values(entries: Vec<IntelligenceEntry>) -> Vec<IntelligenceEntry> {
    let mut seen = HashSet::new();
    entries.into_iter().filter(|e| seen.insert(e.value.clone())).collect()
}

/// `2024-01-02T03:04:05.000Z` -> `2024-01-02 03:04:05`.
pub fn format_timestamp(raw: &str) -> String {
    let cut = match raw.char_indices().nth(19) {
        Some((i, _)) => &raw[..i],
        None => raw,
    };
    cut.replace('T', " ")
}
