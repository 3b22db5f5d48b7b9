//! Origin allow-list rules.
//!
//! A rule is either `*` or `scheme://host[:port]`, where `host` may start
//! with `*.` to match any subdomain. An empty rule list allows every origin.

use serde::Serialize;
use url::Url;

use crate::error::{BridgeError, BridgeResult};

/// One compiled rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginRule {
    pub scheme: String,
    /// Host without the `*.` prefix; empty matches any host.
    pub host: String,
    pub subdomains: bool,
    pub port: Option<u16>,
}

impl OriginRule {
    fn parse(rule: &str) -> BridgeResult<Self> {
        let invalid = |reason: &str| BridgeError::config(format!("invalid origin rule '{}': {}", rule, reason));

        let (scheme, rest) = rule
            .split_once("://")
            .ok_or_else(|| invalid("missing scheme"))?;
        if scheme.is_empty() {
            return Err(invalid("missing scheme"));
        }

        let (subdomains, rest) = match rest.strip_prefix("*.") {
            Some(stripped) => (true, stripped),
            None => (false, rest),
        };
        if rest.contains('*') {
            return Err(invalid("wildcard is only allowed as a leading '*.'"));
        }

        let url = Url::parse(&format!("{}://{}", scheme, rest)).map_err(|e| invalid(&e.to_string()))?;
        if url.path() != "/" && !url.path().is_empty() {
            return Err(invalid("must not contain a path"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("must not contain a query or fragment"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("must not contain credentials"));
        }
        if subdomains && url.host_str().is_none_or(str::is_empty) {
            return Err(invalid("subdomain wildcard needs a host"));
        }

        Ok(Self {
            scheme: url.scheme().to_string(),
            host: url.host_str().unwrap_or_default().to_ascii_lowercase(),
            subdomains,
            port: url.port_or_known_default(),
        })
    }

    fn matches(&self, origin: &Url) -> bool {
        if origin.scheme() != self.scheme {
            return false;
        }
        if origin.port_or_known_default() != self.port {
            return false;
        }
        let host = origin.host_str().unwrap_or_default().to_ascii_lowercase();
        if self.host.is_empty() {
            return true;
        }
        if self.subdomains {
            host.len() > self.host.len()
                && host.ends_with(&self.host)
                && host[..host.len() - self.host.len()].ends_with('.')
        } else {
            host == self.host
        }
    }
}

/// A compiled allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginRules {
    allow_all: bool,
    rules: Vec<OriginRule>,
}

impl OriginRules {
    /// Compile `rules`, rejecting malformed entries.
    pub fn compile(rules: &[String]) -> BridgeResult<Self> {
        if rules.is_empty() {
            return Ok(Self {
                allow_all: true,
                rules: Vec::new(),
            });
        }
        let mut compiled = Self::default();
        for rule in rules {
            if rule == "*" {
                compiled.allow_all = true;
            } else {
                compiled.rules.push(OriginRule::parse(rule)?);
            }
        }
        Ok(compiled)
    }

    pub fn allows_all(&self) -> bool {
        self.allow_all
    }

    pub fn rules(&self) -> &[OriginRule] {
        &self.rules
    }

    /// Whether a page at `origin` (an origin or any URL) may use the bridge.
    pub fn allows(&self, origin: &str) -> bool {
        if self.allow_all {
            return true;
        }
        match Url::parse(origin) {
            Ok(url) => self.rules.iter().any(|rule| rule.matches(&url)),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rules(list: &[&str]) -> OriginRules {
        let list: Vec<String> = list.iter().map(|s| s.to_string()).collect();
        OriginRules::compile(&list).unwrap()
    }

    #[test]
    fn empty_rule_list_allows_everything() {
        assert!(rules(&[]).allows("https://anything.test"));
        assert!(rules(&["*"]).allows("null"));
    }

    #[rstest]
    #[case("https://example.com", true)]
    #[case("https://example.com:443", true)]
    #[case("https://example.com/page?q=1", true)]
    #[case("http://example.com", false)]
    #[case("https://example.com:8443", false)]
    #[case("https://www.example.com", false)]
    fn exact_rule(#[case] origin: &str, #[case] allowed: bool) {
        assert_eq!(rules(&["https://example.com"]).allows(origin), allowed);
    }

    #[rstest]
    #[case("https://a.example.com", true)]
    #[case("https://a.b.example.com", true)]
    #[case("https://example.com", false)]
    #[case("https://badexample.com", false)]
    fn subdomain_wildcard_rule(#[case] origin: &str, #[case] allowed: bool) {
        assert_eq!(rules(&["https://*.example.com"]).allows(origin), allowed);
    }

    #[rstest]
    #[case("example.com")]
    #[case("https://example.com/path")]
    #[case("https://ex*ample.com")]
    #[case("https://example.com?x=1")]
    fn malformed_rules_are_rejected(#[case] rule: &str) {
        let result = OriginRules::compile(&[rule.to_string()]);
        assert!(matches!(result, Err(BridgeError::Config { .. })), "{}", rule);
    }

    #[test]
    fn unparsable_origin_is_denied_when_restricted() {
        assert!(!rules(&["https://example.com"]).allows("about:blank"));
        assert!(!rules(&["https://example.com"]).allows(""));
    }
}
