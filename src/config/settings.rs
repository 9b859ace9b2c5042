// * Startup configuration loaded from the environment.
// * Read once in main, immutable afterwards. A missing required key is the
// * only condition under which the process exits non-zero.

use std::env;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::network::router::{Egress, RouteRule};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("required configuration `{0}` is missing")]
    Missing(&'static str),

    #[error("configuration `{key}` has invalid value `{value}`")]
    Invalid { key: &'static str, value: String },
}

// * Dashboard side: login flow and the page the readings live on.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub login_url: String,
    pub system_url: String,
    pub email: String,
    pub password: String,
    pub headless: bool,
}

// * Destination state-store API. Shared read-only by all publish calls.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub base_url: String,
    pub token: String,
    pub entity_production: String,
    pub entity_consumption: String,
    pub entity_grid: String,
    pub request_timeout: Duration,
}

// * XPath fallbacks for the three on-page figures. The text-wise extraction
// * runs first; these are consulted when a phrase match comes up empty.
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub xpath_production: String,
    pub xpath_consumption: String,
    pub xpath_grid: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            xpath_production: "/html/body/div[3]/div[1]/div/div/div[2]/div/div/div[2]/div[2]/div[2]/div/span[1]/b".to_string(),
            xpath_consumption: "/html/body/div[3]/div[1]/div/div/div[2]/div/div/div[2]/div[2]/div[1]/div/span[1]/b".to_string(),
            xpath_grid: "/html/body/div[3]/div[1]/div/div/div[2]/div[2]/div[3]/div/span[1]/b".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub scrape_interval: Duration,
    pub iteration_timeout: Duration,
    pub max_consecutive_failures: u32,
    pub session_freshness: Duration,
    pub relogin_after: Duration,
    pub tunnel_socks_address: String,
    pub metrics_port: u16,
    pub dashboard: DashboardConfig,
    pub endpoint: EndpointConfig,
    pub selectors: SelectorConfig,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = EndpointConfig {
            base_url: required("DESTINATION_BASE_URL")?,
            token: required("DESTINATION_TOKEN")?,
            entity_production: optional("ENTITY_PV_PRODUCTION", "sensor.pv_production"),
            entity_consumption: optional("ENTITY_HOUSE_CONSUMPTION", "sensor.house_consumption"),
            entity_grid: optional("ENTITY_GRID_FLOW", "sensor.grid_flow"),
            request_timeout: Duration::from_secs(optional_u64("PUBLISH_TIMEOUT_SECONDS", 10)?),
        };

        let dashboard = DashboardConfig {
            login_url: required("LOGIN_URL")?,
            system_url: required("PV_SYSTEM_URL")?,
            email: required("SOURCE_EMAIL")?,
            password: required("SOURCE_PASSWORD")?,
            headless: optional_flag("HEADLESS", true),
        };

        let defaults = SelectorConfig::default();
        let selectors = SelectorConfig {
            xpath_production: optional("XPATH_PRODUCTION", &defaults.xpath_production),
            xpath_consumption: optional("XPATH_CONSUMPTION", &defaults.xpath_consumption),
            xpath_grid: optional("XPATH_GRID", &defaults.xpath_grid),
        };

        Ok(Self {
            scrape_interval: Duration::from_secs(optional_u64("SCRAPE_INTERVAL_SECONDS", 5)?),
            iteration_timeout: Duration::from_secs(optional_u64("ITERATION_TIMEOUT_SECONDS", 90)?),
            max_consecutive_failures: optional_u64("MAX_CONSECUTIVE_FAILURES", 3)? as u32,
            session_freshness: Duration::from_secs(optional_u64("SESSION_FRESHNESS_SECONDS", 90)?),
            relogin_after: Duration::from_secs(optional_u64("RELOGIN_MINUTES", 120)? * 60),
            tunnel_socks_address: required("TUNNEL_SOCKS_ADDRESS")?,
            metrics_port: optional_u64("METRICS_PORT", 9000)? as u16,
            dashboard,
            endpoint,
            selectors,
        })
    }

    // * Derives the routing table: the destination API host is pinned to the
    // * SOCKS5 tunnel, the dashboard hosts explicitly to direct egress.
    // * Everything else falls through to the router's direct default.
    pub fn proxy_routes(&self) -> Result<Vec<RouteRule>, ConfigError> {
        let mut rules = Vec::new();

        let destination_host = host_of("DESTINATION_BASE_URL", &self.endpoint.base_url)?;
        rules.push(RouteRule::new(
            destination_host,
            Egress::Socks5(self.tunnel_socks_address.clone()),
        ));

        for (key, url) in [
            ("LOGIN_URL", &self.dashboard.login_url),
            ("PV_SYSTEM_URL", &self.dashboard.system_url),
        ] {
            rules.push(RouteRule::new(host_of(key, url)?, Egress::Direct));
        }

        Ok(rules)
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

fn optional(key: &'static str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn optional_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: v }),
        _ => Ok(default),
    }
}

fn optional_flag(key: &'static str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => !matches!(v.trim(), "0" | "false" | "False"),
        Err(_) => default,
    }
}

fn host_of(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|_| ConfigError::Invalid {
        key,
        value: raw.to_string(),
    })?;
    parsed
        .host_str()
        .map(str::to_string)
        .ok_or(ConfigError::Invalid {
            key,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_of_extracts_host() {
        assert_eq!(
            host_of("DESTINATION_BASE_URL", "http://100.67.69.31:8123").unwrap(),
            "100.67.69.31"
        );
        assert_eq!(
            host_of("LOGIN_URL", "https://login.example.com/oauth").unwrap(),
            "login.example.com"
        );
    }

    #[test]
    fn test_host_of_rejects_garbage() {
        assert!(matches!(
            host_of("LOGIN_URL", "not a url"),
            Err(ConfigError::Invalid { key: "LOGIN_URL", .. })
        ));
    }

    #[test]
    fn test_selector_defaults_are_absolute_xpaths() {
        let selectors = SelectorConfig::default();
        assert!(selectors.xpath_production.starts_with("/html"));
        assert!(selectors.xpath_consumption.starts_with("/html"));
        assert!(selectors.xpath_grid.starts_with("/html"));
    }

    #[test]
    fn test_proxy_routes_pin_destination_to_tunnel() {
        let cfg = AgentConfig {
            scrape_interval: Duration::from_secs(5),
            iteration_timeout: Duration::from_secs(90),
            max_consecutive_failures: 3,
            session_freshness: Duration::from_secs(90),
            relogin_after: Duration::from_secs(7200),
            tunnel_socks_address: "127.0.0.1:1055".to_string(),
            metrics_port: 9000,
            dashboard: DashboardConfig {
                login_url: "https://login.example.com".to_string(),
                system_url: "https://dash.example.com/system".to_string(),
                email: "user@example.com".to_string(),
                password: "secret".to_string(),
                headless: true,
            },
            endpoint: EndpointConfig {
                base_url: "http://100.67.69.31:8123".to_string(),
                token: "token".to_string(),
                entity_production: "sensor.pv_production".to_string(),
                entity_consumption: "sensor.house_consumption".to_string(),
                entity_grid: "sensor.grid_flow".to_string(),
                request_timeout: Duration::from_secs(10),
            },
            selectors: SelectorConfig::default(),
        };

        let rules = cfg.proxy_routes().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(
            rules[0].egress,
            Egress::Socks5("127.0.0.1:1055".to_string())
        );
        assert_eq!(rules[1].egress, Egress::Direct);
        assert_eq!(rules[2].egress, Egress::Direct);
    }
}
