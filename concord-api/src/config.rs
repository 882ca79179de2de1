//! API Configuration Module
//!
//! Server, CORS and engine settings. Configuration is loaded from environment
//! variables with defaults suitable for local development; the engine part is
//! validated before the server starts.

use concord_core::{ConcordError, ConcordResult, ConfigError, EngineConfig};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for the HTTP listener, CORS and the sync engine.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // Listener
    // ========================================================================
    pub bind_addr: IpAddr,
    pub port: u16,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    /// Example: "https://concord.dev,https://app.concord.dev"
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Engine
    // ========================================================================
    /// How often abandoned operations are swept.
    pub sweep_interval: Duration,

    pub engine: EngineConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,
            sweep_interval: Duration::from_secs(30),
            engine: EngineConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `CONCORD_BIND_ADDR`: Listen address (default: 0.0.0.0)
    /// - `CONCORD_PORT` or `PORT`: Listen port (default: 3000)
    /// - `CONCORD_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `CONCORD_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `CONCORD_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `CONCORD_LOCK_TTL_SECS`: Memory lock TTL (default: 30)
    /// - `CONCORD_LOCK_MAX_ATTEMPTS`: Lock acquisition attempts (default: 5)
    /// - `CONCORD_RECENCY_WINDOW_SECS`: Recency bias window (default: 300)
    /// - `CONCORD_SIMILARITY_THRESHOLD`: Merge similarity threshold (default: 0.6)
    /// - `CONCORD_SWEEP_INTERVAL_SECS`: Abandoned operation sweep period (default: 30)
    /// - `CONCORD_HISTORY_CAPACITY`: Finished operations kept for lookups (default: 1000)
    pub fn from_env() -> ConcordResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source, then validate the engine part.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConcordResult<Self> {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let bind_addr = lookup("CONCORD_BIND_ADDR")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.bind_addr);

        let port = lookup("CONCORD_PORT")
            .or_else(|| lookup("PORT"))
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.port);

        let cors_origins = lookup("CONCORD_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = lookup("CONCORD_CORS_ALLOW_CREDENTIALS")
            .map(|s| s.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(defaults.cors_allow_credentials);

        let cors_max_age_secs = parsed("CONCORD_CORS_MAX_AGE_SECS").unwrap_or(defaults.cors_max_age_secs);

        let sweep_interval = parsed("CONCORD_SWEEP_INTERVAL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);
        if sweep_interval.is_zero() {
            return Err(ConcordError::Config(ConfigError::InvalidValue {
                field: "CONCORD_SWEEP_INTERVAL_SECS".to_string(),
                value: "0".to_string(),
                reason: "sweep interval must be greater than 0".to_string(),
            }));
        }

        let mut engine = defaults.engine;
        if let Some(secs) = parsed("CONCORD_LOCK_TTL_SECS") {
            engine.lock.ttl = Duration::from_secs(secs);
        }
        if let Some(attempts) = lookup("CONCORD_LOCK_MAX_ATTEMPTS").and_then(|s| s.trim().parse().ok()) {
            engine.lock.max_attempts = attempts;
        }
        if let Some(secs) = parsed("CONCORD_RECENCY_WINDOW_SECS") {
            engine.resolver.recency_window = Duration::from_secs(secs);
        }
        if let Some(threshold) = lookup("CONCORD_SIMILARITY_THRESHOLD").and_then(|s| s.trim().parse().ok()) {
            engine.resolver.similarity_threshold = threshold;
        }
        if let Some(capacity) = parsed("CONCORD_HISTORY_CAPACITY") {
            engine.limits.history_capacity = capacity as usize;
        }
        engine.validate()?;

        Ok(Self {
            bind_addr,
            port,
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            sweep_interval,
            engine,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // *.concord.dev matches https://<anything>.concord.dev
            if let Some(domain) = allowed.strip_prefix("*.") {
                if let Some(host) = origin.strip_prefix("https://") {
                    return host
                        .strip_suffix(domain)
                        .is_some_and(|sub| sub.ends_with('.') && sub.len() > 1);
                }
            }
            false
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert!(!config.cors_allow_credentials);
        assert_eq!(config.cors_max_age_secs, 86400);
        assert_eq!(config.port, 3000);
        assert_eq!(config.engine.lock.ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("CONCORD_BIND_ADDR", "127.0.0.1"),
            ("PORT", "8080"),
            ("CONCORD_CORS_ORIGINS", "https://a.dev, https://b.dev,"),
            ("CONCORD_CORS_ALLOW_CREDENTIALS", "TRUE"),
            ("CONCORD_LOCK_TTL_SECS", "10"),
            ("CONCORD_LOCK_MAX_ATTEMPTS", "7"),
            ("CONCORD_SIMILARITY_THRESHOLD", "0.75"),
            ("CONCORD_SWEEP_INTERVAL_SECS", "5"),
            ("CONCORD_HISTORY_CAPACITY", "50"),
        ]))
        .unwrap();

        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(config.cors_origins, vec!["https://a.dev", "https://b.dev"]);
        assert!(config.cors_allow_credentials);
        assert_eq!(config.engine.lock.ttl, Duration::from_secs(10));
        assert_eq!(config.engine.lock.max_attempts, 7);
        assert_eq!(config.engine.resolver.similarity_threshold, 0.75);
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.engine.limits.history_capacity, 50);
    }

    #[test]
    fn test_concord_port_takes_precedence() {
        let config =
            ApiConfig::from_lookup(lookup_from(&[("CONCORD_PORT", "4000"), ("PORT", "5000")]))
                .unwrap();
        assert_eq!(config.port, 4000);
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("CONCORD_PORT", "not-a-port"),
            ("CONCORD_LOCK_TTL_SECS", "soon"),
        ]))
        .unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.engine.lock.ttl, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_engine_values_are_rejected() {
        let result = ApiConfig::from_lookup(lookup_from(&[("CONCORD_SIMILARITY_THRESHOLD", "1.5")]));
        assert_eq!(result.unwrap_err().kind(), "configuration_error");

        let result = ApiConfig::from_lookup(lookup_from(&[("CONCORD_LOCK_MAX_ATTEMPTS", "0")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_sweep_interval_is_rejected() {
        let err = ApiConfig::from_lookup(lookup_from(&[("CONCORD_SWEEP_INTERVAL_SECS", "0")]))
            .unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!(err.to_string().contains("CONCORD_SWEEP_INTERVAL_SECS"));
    }

    #[test]
    fn test_oversized_lock_ttl_is_rejected() {
        let result = ApiConfig::from_lookup(lookup_from(&[(
            "CONCORD_LOCK_TTL_SECS",
            "10000000000000",
        )]));
        assert_eq!(result.unwrap_err().kind(), "configuration_error");
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(!config.is_production());
        assert!(config.is_origin_allowed("https://anything.com"));
        assert!(config.is_origin_allowed("http://localhost:3000"));
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec![
                "https://concord.dev".to_string(),
                "https://app.concord.dev".to_string(),
            ],
            ..ApiConfig::default()
        };

        assert!(config.is_production());
        assert!(config.is_origin_allowed("https://concord.dev"));
        assert!(config.is_origin_allowed("https://app.concord.dev"));
        assert!(!config.is_origin_allowed("https://evil.com"));
        assert!(!config.is_origin_allowed("https://notconcord.dev"));
    }

    #[test]
    fn test_wildcard_subdomain() {
        let config = ApiConfig {
            cors_origins: vec!["*.concord.dev".to_string()],
            ..ApiConfig::default()
        };

        assert!(config.is_origin_allowed("https://app.concord.dev"));
        assert!(config.is_origin_allowed("https://api.concord.dev"));
        assert!(!config.is_origin_allowed("https://notconcord.dev"));
        assert!(!config.is_origin_allowed("http://app.concord.dev"));
    }
}
