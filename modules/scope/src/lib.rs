//! Domain scoping: is a URL's host one of the configured root domains or a subdomain of one?

use relay_core::RelayError;
use tracing::warn;
use url::Url;

/// Normalized root domains. Empty means every URL is in scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeConfig {
    pub domains: Vec<String>,
}

impl ScopeConfig {
    /// Parse a free-form domain list separated by commas, whitespace or newlines.
    pub fn parse(list: &str) -> Self {
        let domains = list
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(|d| d.trim().to_lowercase())
            .map(|d| d.trim_matches('.').to_string())
            .filter(|d| !d.is_empty())
            .collect();
        ScopeConfig { domains }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn matches(&self, url: &str) -> bool {
        if self.is_unrestricted() {
            return true;
        }
        match host_of(url) {
            Ok(host) => self.domains.iter().any(|d| host_matches(&host, d)),
            Err(e) => {
                warn!("treating URL as out of scope: {}", e);
                false
            }
        }
    }
}

/// True when `url` falls under `domains_config`; blank config matches everything.
pub fn in_scope(url: &str, domains_config: &str) -> bool {
    ScopeConfig::parse(domains_config).matches(url)
}

/// Lower-cased host of an absolute URL.
pub fn host_of(url: &str) -> Result<String, RelayError> {
    let parsed = Url::parse(url.trim()).map_err(|e| RelayError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.host_str() {
        Some(h) if !h.is_empty() => Ok(h.to_lowercase()),
        _ => Err(RelayError::InvalidUrl { url: url.to_string(), reason: "no host".into() }),
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    // the dot before the suffix keeps `evilexample.com` out of `example.com`
    host == domain || host.strip_suffix(domain).is_some_and(|rest| rest.ends_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_config_matches_everything() {
        assert!(in_scope("https://anything.test/a.js", ""));
        assert!(in_scope("https://anything.test/a.js", "  \n "));
        assert!(in_scope("not a url", ""));
    }

    #[test]
    fn subdomain_precision() {
        assert!(!in_scope("https://evil-example.com/a", "example.com"));
        assert!(!in_scope("https://evilexample.com/a", "example.com"));
        assert!(in_scope("https://api.example.com/a", "example.com"));
        assert!(in_scope("https://example.com", "example.com"));
        assert!(in_scope("https://a.b.example.com:8443/x", "example.com"));
    }

    #[test]
    fn case_and_dots_are_normalized() {
        assert!(in_scope("https://CDN.Example.COM/app.js", " .Example.com. "));
    }

    #[test]
    fn separators_mix_freely() {
        let cfg = ScopeConfig::parse("foo.test,, bar.test\nbaz.test\t,qux.test");
        assert_eq!(cfg.domains, vec!["foo.test", "bar.test", "baz.test", "qux.test"]);
        assert!(cfg.matches("https://x.baz.test/"));
        assert!(!cfg.matches("https://other.test/"));
    }

    #[test]
    fn malformed_url_is_out_of_scope() {
        assert!(!in_scope("::nope", "example.com"));
        assert!(!in_scope("/relative/path.js", "example.com"));
        assert!(host_of("mailto:someone@example.com").is_err());
    }
}
