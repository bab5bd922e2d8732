//! Payload decoding.
//!
//! Bodies are parsed with `serde_json` and the wanted keys are searched for anywhere in
//! the document, so wrapper objects and extra fields do not matter. A body that is not
//! valid JSON falls back to `json_extract`.

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::{format_timestamp, sort_newest_first, CountSnapshot, IntelligenceEntry, SecretRow, UserProfile, Workspace};

/// Timestamp field names seen on intelligence rows, in preference order.
pub const TIMESTAMP_FIELDS: &[&str] =
    &["createdAt", "scannedAt", "lastScannedOn", "scannedOn", "timestamp", "time", "date"];

const ISO_DATETIME: &str = r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}";

fn parse(body: &str) -> Option<Value> {
    match serde_json::from_str(body) {
        Ok(v) => Some(v),
        Err(e) => {
            debug!("payload is not valid JSON ({}), using lenient extraction", e);
            None
        }
    }
}

/// Depth-first search for the first value stored under `key`.
fn find_key<'a>(v: &'a Value, key: &str) -> Option<&'a Value> {
    match v {
        Value::Object(map) => map
            .iter()
            .find_map(|(k, child)| if k == key { Some(child) } else { find_key(child, key) }),
        Value::Array(items) => items.iter().find_map(|child| find_key(child, key)),
        _ => None,
    }
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn present(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.is_empty() && s != "null")
}

fn objects<'a>(v: &'a Value, out: &mut Vec<&'a serde_json::Map<String, Value>>) {
    match v {
        Value::Object(map) => {
            out.push(map);
            map.values().for_each(|c| objects(c, out));
        }
        Value::Array(items) => items.iter().for_each(|c| objects(c, out)),
        _ => {}
    }
}

pub fn parse_workspaces(body: &str) -> Vec<Workspace> {
    if let Some(v) = parse(body) {
        let mut maps = Vec::new();
        objects(&v, &mut maps);
        return maps
            .into_iter()
            .filter_map(|m| {
                let id = m.get("wkspId").and_then(scalar)?;
                let name = m.get("name").and_then(scalar)?;
                Some(Workspace { id, name })
            })
            .collect();
    }
    let (Some(open), Some(close)) = (body.find('['), body.rfind(']')) else {
        return Vec::new();
    };
    if close <= open {
        return Vec::new();
    }
    json_extract::split_array_objects(&body[open + 1..close])
        .iter()
        .filter_map(|obj| {
            let id = json_extract::extract_field(obj, "wkspId")?;
            let name = json_extract::extract_field(obj, "name")?;
            Some(Workspace { id, name })
        })
        .collect()
}

pub fn parse_created_workspace_id(body: &str) -> Option<String> {
    let id = match parse(body) {
        Some(v) => find_key(&v, "workspaceId").and_then(scalar),
        None => json_extract::extract_field(body, "workspaceId"),
    };
    present(id)
}

pub fn parse_profile(body: &str) -> UserProfile {
    let field = |name: &str, v: &Option<Value>| -> Option<String> {
        let raw = match v {
            Some(v) => find_key(v, name).and_then(scalar),
            None => json_extract::extract_field(body, name),
        };
        present(raw)
    };
    let v = parse(body);
    UserProfile {
        name: field("name", &v),
        email: field("email", &v),
        account_type: field("type", &v),
        remaining: field("JsScan", &v),
    }
}

/// Every non-negative integer under an object key; later keys win on duplicates.
pub fn parse_counts(body: &str) -> CountSnapshot {
    let mut counts = HashMap::new();
    match parse(body) {
        Some(v) => {
            let mut maps = Vec::new();
            objects(&v, &mut maps);
            for m in maps {
                for (k, val) in m {
                    if let Some(n) = val.as_u64() {
                        counts.insert(k.clone(), n);
                    }
                }
            }
        }
        None => counts.extend(json_extract::extract_integer_fields(body)),
    }
    CountSnapshot { counts }
}

pub fn parse_secrets(body: &str) -> Vec<SecretRow> {
    let rows: Vec<[Option<String>; 4]> = match parse(body) {
        Some(v) => find_key(&v, "data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| item.is_object())
                    .map(|item| {
                        ["moduleName", "matchedWord", "severity", "createdAt"]
                            .map(|f| present(item.get(f).and_then(scalar)))
                    })
                    .collect()
            })
            .unwrap_or_default(),
        None => json_extract::extract_objects_under_key(body, "data")
            .iter()
            .map(|obj| {
                ["moduleName", "matchedWord", "severity", "createdAt"]
                    .map(|f| present(json_extract::extract_field(obj, f)))
            })
            .collect(),
    };
    rows.into_iter()
        .filter(|r| r.iter().any(Option::is_some))
        .map(|[module_name, matched_word, severity, created_at]| SecretRow {
            module_name: module_name.unwrap_or_default(),
            matched_word: matched_word.unwrap_or_default(),
            severity: severity.unwrap_or_default(),
            created_at: created_at.map(|t| format_timestamp(&t)).unwrap_or_default(),
        })
        .collect()
}

/// Rows of an intelligence page, newest first.
pub fn parse_intelligence(body: &str) -> Vec<IntelligenceEntry> {
    let iso = Regex::new(ISO_DATETIME).ok();
    let looks_like_time = |s: &str| iso.as_ref().is_some_and(|re| re.is_match(s));

    let mut entries: Vec<IntelligenceEntry> = match parse(body) {
        Some(v) => find_key(&v, "data")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| match item {
                        Value::String(s) if !s.is_empty() => Some(IntelligenceEntry::new(s.clone(), None)),
                        Value::Object(m) => {
                            let value = present(m.get("value").and_then(scalar))?;
                            let observed = TIMESTAMP_FIELDS
                                .iter()
                                .find_map(|f| present(m.get(*f).and_then(scalar)))
                                .or_else(|| {
                                    m.values().filter_map(Value::as_str).find(|s: &&str| looks_like_time(s)).map(String::from)
                                });
                            Some(IntelligenceEntry::new(value, observed.map(|t| format_timestamp(&t))))
                        }
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default(),
        None => lenient_intelligence(body),
    };
    sort_newest_first(&mut entries);
    entries
}

fn lenient_intelligence(body: &str) -> Vec<IntelligenceEntry> {
    let Some(array) = json_extract::array_body_under_key(body, "data") else {
        return Vec::new();
    };
    let array = array.trim();
    if array.starts_with('"') && !array.contains('{') {
        return json_extract::split_string_array(array)
            .into_iter()
            .map(|s| IntelligenceEntry::new(s, None))
            .collect();
    }
    let any_time = Regex::new(r#""[^"]+"\s*:\s*"([0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}[^"]*)""#).ok();
    json_extract::split_array_objects(array)
        .iter()
        .filter_map(|obj| {
            let value = present(json_extract::extract_field(obj, "value"))?;
            let observed = TIMESTAMP_FIELDS
                .iter()
                .find_map(|f| present(json_extract::extract_field(obj, f)))
                .or_else(|| {
                    let re = any_time.as_ref()?;
                    re.captures(obj)?.get(1).map(|m| m.as_str().to_string())
                });
            Some(IntelligenceEntry::new(value, observed.map(|t| format_timestamp(&t))))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workspaces_from_wrapped_array() {
        let body = r#"{"data":[{"wkspId":"w1","name":"Main"},{"wkspId":"w2"},{"wkspId":7,"name":"Num"}]}"#;
        let ws = parse_workspaces(body);
        assert_eq!(ws, vec![
            Workspace { id: "w1".into(), name: "Main".into() },
            Workspace { id: "7".into(), name: "Num".into() },
        ]);
    }

    #[test]
    fn workspaces_from_truncated_body() {
        let body = r#"[{"wkspId":"w1","name":"Main"},{"wkspId":"w2","name":"Side"}], "extra": ]"#;
        let ws = parse_workspaces(body);
        assert_eq!(ws.len(), 2);
        assert_eq!(ws[1].name, "Side");
    }

    #[test]
    fn created_workspace() {
        assert_eq!(parse_created_workspace_id(r#"{"message":"ok","workspaceId":"abc"}"#).as_deref(), Some("abc"));
        assert_eq!(parse_created_workspace_id(r#"{"message":"ok"}"#), None);
    }

    #[test]
    fn profile_fields() {
        let p = parse_profile(r#"{"data":{"name":"Jane","email":"j@x.com","type":"pro","limits":{"JsScan":12}}}"#);
        assert_eq!(p.name.as_deref(), Some("Jane"));
        assert_eq!(p.account_type.as_deref(), Some("pro"));
        assert_eq!(p.remaining.as_deref(), Some("12"));
    }

    #[test]
    fn profile_fields_follow_document_order() {
        let p = parse_profile(r#"{"data":{"user":{"name":"Jane"},"plan":{"name":"Pro"}}}"#);
        assert_eq!(p.name.as_deref(), Some("Jane"));
    }

    #[test]
    fn counts_flat_and_lenient() {
        let c = parse_counts(r#"{"totalJsUrls":250,"totalUrls":3,"label":"x","ratio":0.5}"#);
        assert_eq!(c.counts.get("totalJsUrls"), Some(&250));
        assert_eq!(c.counts.len(), 2);
        let lenient = parse_counts(r#"{"totalJsUrls": 250, "totalUrls": 3"#);
        assert_eq!(lenient.counts.get("totalUrls"), Some(&3));
    }

    #[test]
    fn secrets_rows() {
        let body = r#"{"data":[
            {"moduleName":"aws","matchedWord":"AKIA...","severity":"high","createdAt":"2024-05-06T07:08:09.000Z"},
            {"unrelated":true},
            {"moduleName":"jwt"}
        ]}"#;
        let rows = parse_secrets(body);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].created_at, "2024-05-06 07:08:09");
        assert_eq!(rows[1].module_name, "jwt");
        assert_eq!(rows[1].severity, "");
    }

    #[test]
    fn intelligence_string_array() {
        let entries = parse_intelligence(r#"{"data":["a.example","b.example"]}"#);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.observed_at.is_none()));
    }

    #[test]
    fn intelligence_objects_sorted() {
        let body = r#"{"data":[
            {"value":"https://a/old.js","scannedAt":"2023-01-01T00:00:00Z"},
            {"value":"https://a/none.js"},
            {"value":"https://a/new.js","firstSeen":"2024-06-01T12:00:00.000Z"},
            {"value":null,"createdAt":"2024-01-01T00:00:00Z"}
        ]}"#;
        let entries = parse_intelligence(body);
        let values: Vec<&str> = entries.iter().map(|e| e.value.as_str()).collect();
        assert_eq!(values, vec!["https://a/new.js", "https://a/old.js", "https://a/none.js"]);
        assert_eq!(entries[0].display_time(), "2024-06-01 12:00:00");
    }

    #[test]
    fn intelligence_lenient_fallback() {
        let body = r#"{"data":[{"value":"api/v1/users","createdAt":"2024-02-02T10:00:00Z"},{"value":"api/v2","date":"null"}]"#;
        let entries = parse_intelligence(body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value, "api/v1/users");
        assert_eq!(entries[1].observed_at, None);
    }
}
