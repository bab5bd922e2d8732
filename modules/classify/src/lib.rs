//! Decides whether an exchange is worth submitting, from the URL extension and/or
//! the response Content-Type.

use relay_core::Exchange;

/// Suffixes treated as scannable. Specific ones come before the shorter ones they contain.
pub const SCANNABLE_EXTENSIONS: &[&str] = &[
    ".jsx", ".tsx", ".mjs", ".cjs", ".js", ".ts", ".vue", ".svelte", ".map", ".json",
    ".xhtml", ".html", ".htm", ".xml", ".php", ".jsp", ".aspx", ".txt",
];

/// Substrings of a Content-Type that mark a scannable body.
pub const CONTENT_TYPE_MARKERS: &[&str] = &[
    "javascript", "ecmascript", "html", "xhtml", "text", "plain", "json", "xml", "php", "jsp",
    "component",
];

/// Which signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Extension,
    ContentType,
    NotScannable,
}

impl Verdict {
    pub fn is_scannable(self) -> bool {
        self != Verdict::NotScannable
    }
}

pub fn is_scannable(url: &str, content_type: Option<&str>) -> bool {
    classify(url, content_type).is_scannable()
}

pub fn is_scannable_exchange<E: Exchange + ?Sized>(exchange: &E) -> bool {
    is_scannable(exchange.url(), exchange.content_type())
}

/// Extension first since it needs nothing but the URL.
pub fn classify(url: &str, content_type: Option<&str>) -> Verdict {
    if has_scannable_extension(url) {
        Verdict::Extension
    } else if content_type.is_some_and(is_scannable_content_type) {
        Verdict::ContentType
    } else {
        Verdict::NotScannable
    }
}

pub fn has_scannable_extension(url: &str) -> bool {
    let lower = url.trim().to_lowercase();
    if lower.is_empty() {
        return false;
    }
    let path = match lower.find(|c: char| c == '?' || c == '#') {
        Some(i) => &lower[..i],
        None => lower.as_str(),
    };
    SCANNABLE_EXTENSIONS.iter().any(|ext| {
        path.ends_with(ext)
            || lower.contains(&format!("{}?", ext))
            || lower.contains(&format!("{}#", ext))
    })
}

pub fn is_scannable_content_type(content_type: &str) -> bool {
    let full = content_type.trim().to_lowercase();
    if full.is_empty() {
        return false;
    }
    let base = full.split(';').next().unwrap_or("").trim().to_string();
    CONTENT_TYPE_MARKERS.iter().any(|m| full.contains(m) || base.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::TrafficEvent;

    #[test]
    fn extension_with_query() {
        assert!(is_scannable("https://x/a.js?v=2", None));
        assert_eq!(classify("https://x/a.js?v=2", None), Verdict::Extension);
        assert!(is_scannable("https://x/app.bundle.MJS#frag", None));
    }

    #[test]
    fn content_type_with_parameters() {
        assert!(is_scannable("https://x/a.bin", Some("text/javascript; charset=utf-8")));
        assert_eq!(classify("https://x/a.bin", Some("application/x-component")), Verdict::ContentType);
        assert!(is_scannable("https://x/api", Some("application/vnd.api+json")));
    }

    #[test]
    fn nothing_matches() {
        assert!(!is_scannable("https://x/a.bin", None));
        assert!(!is_scannable("https://x/logo.png", Some("image/png")));
        assert!(!is_scannable("", None));
        assert!(!is_scannable("https://x/a.bin", Some("  ")));
    }

    #[test]
    fn embedded_extension_before_parameters() {
        assert!(has_scannable_extension("https://x/static/main.jsx?x=1&next=/a.png"));
        assert!(has_scannable_extension("https://x/chunk.js#/route"));
        assert!(!has_scannable_extension("https://x/image.png?v=1"));
    }

    #[test]
    fn exchange_adapter() {
        let e = TrafficEvent::new("https://x/download").with_content_type("application/json");
        assert!(is_scannable_exchange(&e));
        assert!(!is_scannable_exchange(&TrafficEvent::new("https://x/download")));
    }
}
