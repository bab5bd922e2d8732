//! Traffic history read from files: JSON lines (one event per line) or HAR 1.2 captures.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use relay_core::{HeaderPair, RelayError, TrafficEvent, TrafficSource};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFormat {
    Jsonl,
    Har,
}

impl HistoryFormat {
    /// `.har` files are HAR, anything else is treated as JSON lines.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("har") => HistoryFormat::Har,
            _ => HistoryFormat::Jsonl,
        }
    }
}

/// A capture file, re-read on every enumeration so appended traffic is picked up.
#[derive(Debug, Clone)]
pub struct FileHistory {
    path: PathBuf,
    format: HistoryFormat,
}

impl FileHistory {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = HistoryFormat::from_path(&path);
        FileHistory { path, format }
    }

    pub fn with_format(mut self, format: HistoryFormat) -> Self {
        self.format = format;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<TrafficEvent>> {
        let text = fs::read_to_string(&self.path).with_context(|| format!("reading {}", self.path.display()))?;
        let events = match self.format {
            HistoryFormat::Jsonl => parse_jsonl(&text),
            HistoryFormat::Har => parse_har(&text),
        }
        .with_context(|| format!("parsing {}", self.path.display()))?;
        debug!("loaded {} event(s) from {}", events.len(), self.path.display());
        Ok(events)
    }
}

impl TrafficSource for FileHistory {
    type Entry = TrafficEvent;

    fn history(&self) -> Result<Vec<TrafficEvent>, RelayError> {
        self.load().map_err(|e| RelayError::History(format!("{:#}", e)))
    }
}

/// One JSONL record. Blank lines and `#` comments yield `None`.
pub fn parse_jsonl_line(line: &str) -> Result<Option<TrafficEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let event: TrafficEvent = serde_json::from_str(line)?;
    if event.url.trim().is_empty() {
        return Err(anyhow!("event has an empty url"));
    }
    Ok(Some(event))
}

pub fn parse_jsonl(text: &str) -> Result<Vec<TrafficEvent>> {
    let mut events = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(ev) = parse_jsonl_line(line).with_context(|| format!("line {}", i + 1))? {
            events.push(ev);
        }
    }
    Ok(events)
}

#[derive(Deserialize)]
struct Har {
    log: HarLog,
}

#[derive(Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Deserialize)]
struct HarEntry {
    request: HarRequest,
    #[serde(default)]
    response: Option<HarResponse>,
}

#[derive(Deserialize)]
struct HarRequest {
    url: String,
    #[serde(default)]
    headers: Option<Vec<HarHeader>>,
}

#[derive(Deserialize)]
struct HarResponse {
    #[serde(default)]
    headers: Vec<HarHeader>,
    #[serde(default)]
    content: Option<HarContent>,
}

#[derive(Deserialize)]
struct HarContent {
    #[serde(rename = "mimeType", default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct HarHeader {
    name: String,
    value: String,
}

pub fn parse_har(text: &str) -> Result<Vec<TrafficEvent>> {
    let har: Har = serde_json::from_str(text).context("not a HAR document")?;
    Ok(har.log.entries.into_iter().map(har_event).collect())
}

fn har_event(entry: HarEntry) -> TrafficEvent {
    let content_type = entry.response.and_then(|r| {
        let from_content = r.content.and_then(|c| c.mime_type).filter(|m| !m.trim().is_empty());
        from_content.or_else(|| {
            r.headers
                .into_iter()
                .find(|h| h.name.eq_ignore_ascii_case("content-type"))
                .map(|h| h.value)
                .filter(|v| !v.trim().is_empty())
        })
    });
    TrafficEvent {
        url: entry.request.url,
        request_headers: entry
            .request
            .headers
            .map(|hs| hs.into_iter().map(|h| HeaderPair::new(h.name, h.value)).collect()),
        response_content_type: content_type,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonl_skips_blanks_and_comments() {
        let text = r#"
# captured 2024-05-01
{"url":"https://a.example/app.js","request_headers":[{"name":"Cookie","value":"x=1"}]}

{"url":"https://a.example/data","response_content_type":"application/json"}
"#;
        let events = parse_jsonl(text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].request_headers.as_ref().map(Vec::len), Some(1));
        assert_eq!(events[1].request_headers, None);
        assert_eq!(events[1].response_content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn jsonl_reports_bad_line_number() {
        let text = "{\"url\":\"https://a.example/a.js\"}\n{not json}\n";
        let err = parse_jsonl(text).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }

    #[test]
    fn har_entries_map_to_events() {
        let text = r#"{"log":{"version":"1.2","entries":[
            {"request":{"method":"GET","url":"https://a.example/main.js","headers":[{"name":"Accept","value":"*/*"}]},
             "response":{"status":200,"headers":[],"content":{"mimeType":"application/javascript"}}},
            {"request":{"method":"GET","url":"https://a.example/api"},
             "response":{"status":200,"headers":[{"name":"content-type","value":"application/json"}],"content":{"mimeType":""}}}
        ]}}"#;
        let events = parse_har(text).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].response_content_type.as_deref(), Some("application/javascript"));
        assert_eq!(events[0].request_headers, Some(vec![HeaderPair::new("Accept", "*/*")]));
        assert_eq!(events[1].request_headers, None);
        assert_eq!(events[1].response_content_type.as_deref(), Some("application/json"));
    }

    #[test]
    fn missing_file_is_a_history_error() {
        let src = FileHistory::open("/nonexistent/capture.har");
        match src.history() {
            Err(RelayError::History(msg)) => assert!(msg.contains("capture.har")),
            other => panic!("unexpected: {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(HistoryFormat::from_path(Path::new("x.HAR")), HistoryFormat::Har);
        assert_eq!(HistoryFormat::from_path(Path::new("x.jsonl")), HistoryFormat::Jsonl);
    }
}
