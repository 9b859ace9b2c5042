// * Per-request egress selection.
// *
// * Outbound traffic splits across two topologically distinct paths: the
// * dashboard sits on the open internet, the state-store only behind a local
// * SOCKS5 tunnel onto the overlay network. The router makes that decision
// * explicitly per request from an ordered rule set. Ambient proxy
// * environment variables are never consulted: the direct client is built
// * with `no_proxy()`, and the tunneled client carries its proxy explicitly.

use std::time::Duration;

use reqwest::{Client, Proxy};
use url::Url;

use crate::network::errors::NetworkError;

// * Where a request leaves the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Egress {
    Direct,
    Socks5(String),
}

// * One routing rule: destination host pattern plus the egress it forces.
// * Patterns are either an exact host or a `*.suffix` wildcard.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pattern: String,
    pub egress: Egress,
}

impl RouteRule {
    pub fn new(pattern: impl Into<String>, egress: Egress) -> Self {
        Self {
            pattern: pattern.into().to_lowercase(),
            egress,
        }
    }

    fn matches(&self, host: &str) -> bool {
        if let Some(suffix) = self.pattern.strip_prefix("*.") {
            host == suffix || host.ends_with(&format!(".{suffix}"))
        } else {
            host == self.pattern
        }
    }
}

pub struct ProxyRouter {
    rules: Vec<RouteRule>,
    direct: Client,
    // * One client per distinct SOCKS5 address, paired with that address.
    tunneled: Vec<(String, Client)>,
}

impl ProxyRouter {
    pub fn new(rules: Vec<RouteRule>, timeout: Duration) -> Result<Self, NetworkError> {
        let direct = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .no_proxy()
            .build()?;

        let mut tunneled: Vec<(String, Client)> = Vec::new();
        for rule in &rules {
            if let Egress::Socks5(addr) = &rule.egress {
                if tunneled.iter().any(|(known, _)| known == addr) {
                    continue;
                }
                // * socks5h so destination names resolve through the tunnel,
                // * not via local DNS.
                let proxy = Proxy::all(format!("socks5h://{addr}"))
                    .map_err(|_| NetworkError::InvalidProxyAddress(addr.clone()))?;
                let client = Client::builder()
                    .timeout(timeout)
                    .proxy(proxy)
                    .build()?;
                tunneled.push((addr.clone(), client));
            }
        }

        Ok(Self {
            rules,
            direct,
            tunneled,
        })
    }

    // * First matching rule wins; no match defaults to direct egress.
    pub fn classify(&self, host: &str) -> Egress {
        let host = host.to_lowercase();
        for rule in &self.rules {
            if rule.matches(&host) {
                return rule.egress.clone();
            }
        }
        Egress::Direct
    }

    // * Resolves the client a request to `url` must use.
    pub fn client_for(&self, url: &str) -> Result<&Client, NetworkError> {
        let parsed = Url::parse(url).map_err(|_| NetworkError::InvalidUrl(url.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| NetworkError::InvalidUrl(url.to_string()))?;

        match self.classify(host) {
            Egress::Direct => Ok(&self.direct),
            Egress::Socks5(addr) => self
                .tunneled
                .iter()
                .find(|(known, _)| *known == addr)
                .map(|(_, client)| client)
                // * Unreachable by construction: every Socks5 rule got a client above.
                .ok_or(NetworkError::InvalidProxyAddress(addr)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> ProxyRouter {
        ProxyRouter::new(
            vec![
                RouteRule::new("100.67.69.31", Egress::Socks5("127.0.0.1:1055".into())),
                RouteRule::new("*.solarweb.com", Egress::Direct),
            ],
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn test_first_match_wins_and_default_is_direct() {
        let r = router();
        assert_eq!(
            r.classify("100.67.69.31"),
            Egress::Socks5("127.0.0.1:1055".into())
        );
        assert_eq!(r.classify("www.solarweb.com"), Egress::Direct);
        assert_eq!(r.classify("unrelated.example.org"), Egress::Direct);
    }

    #[test]
    fn test_classify_is_deterministic() {
        let r = router();
        for _ in 0..3 {
            assert_eq!(
                r.classify("100.67.69.31"),
                Egress::Socks5("127.0.0.1:1055".into())
            );
        }
    }

    #[test]
    fn test_wildcard_matches_apex_and_subdomains() {
        let rule = RouteRule::new("*.solarweb.com", Egress::Direct);
        assert!(rule.matches("solarweb.com"));
        assert!(rule.matches("www.solarweb.com"));
        assert!(!rule.matches("notsolarweb.com"));
    }

    #[test]
    fn test_host_matching_is_case_insensitive() {
        let r = router();
        assert_eq!(r.classify("WWW.SolarWeb.COM"), Egress::Direct);
    }

    #[test]
    fn test_client_for_rejects_invalid_url() {
        let r = router();
        assert!(matches!(
            r.client_for("not a url"),
            Err(NetworkError::InvalidUrl(_))
        ));
    }
}
