//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! All configuration is loaded from environment variables with sensible defaults
//! for development. In production, configure via environment variables or a `.env` file.
//!
//! # Security Configuration
//!
//! - `AUTH_PUBLIC_KEY`: base64-encoded PEM key verifying RS256 tokens
//! - `ACCESS_TOKEN_SECRET`: shared secret for HS256 access tokens
//! - `PRIVACY_ZONES`: JSON list of `{"coords": {"latitude", "longitude"}, "radius"}`
//! - `ALLOWED_HOSTS`, `DISALLOWED_IP_ADDRESSES`, `DISALLOWED_USER_AGENTS`, `RED_FLAGS`:
//!   prevalidation gate lists
//!
//! # Caching
//!
//! - `ENABLE_CACHING`: turn on cache header resolution (default: false)
//! - `CACHE_ROUTE_OVERRIDES`: `path=seconds` pairs, comma-separated

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::geo::PrivacyZones;

/// One year, the default response lifetime for public data.
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 31_536_000;

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Root of the generated archive files (default: ".")
    pub generated_path: PathBuf,

    /// Static client files (default: "./public")
    pub public_path: PathBuf,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Authentication
    // =========================================================================
    /// Base64-encoded PEM public key for RS256 tokens
    pub auth_public_key: Option<String>,

    /// Shared secret for HS256 access tokens
    pub access_token_secret: Option<String>,

    /// Scope a token must carry (default: "walks.read")
    pub required_scope: String,

    /// Public origin, used as token issuer and login redirect target
    pub public_host: Option<String>,

    // =========================================================================
    // Privacy
    // =========================================================================
    /// Zones withheld from unauthenticated callers
    pub privacy_zones: PrivacyZones,

    // =========================================================================
    // Prevalidation Gate
    // =========================================================================
    /// Hosts accepted in the `Host` header; empty accepts any
    pub allowed_hosts: Vec<String>,

    /// Statically denied client addresses
    pub disallowed_ips: Vec<String>,

    /// Denied user agents, matched exactly
    pub disallowed_user_agents: Vec<String>,

    /// Path substrings that get the caller banned
    pub red_flags: Vec<String>,

    /// Append-only ban list file (default: "./garbage.txt")
    pub ban_list_path: PathBuf,

    // =========================================================================
    // Caching
    // =========================================================================
    /// Whether cache headers are resolved at all
    pub caching_enabled: bool,

    /// Per-route max-age overrides in seconds
    pub cache_route_overrides: Vec<(String, u64)>,

    // =========================================================================
    // Upstream Services
    // =========================================================================
    pub sunx_latitude: Option<f64>,
    pub sunx_longitude: Option<f64>,
    pub sunx_api_url: String,
    pub thumbnail_base_url: String,
    pub cdn_invalidation_url: Option<String>,
    pub cdn_distribution_id: Option<String>,

    /// Timeout for outbound calls (default: 10 seconds)
    pub upstream_timeout: Duration,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests per second limit per client (default: 0 = disabled)
    pub rate_limit_rps: u32,

    /// Burst capacity - allows temporary spikes above rps limit (default: 50)
    pub rate_limit_burst: u32,

    /// Comma-separated list of allowed CORS origins
    pub cors_allowed_origins: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Log level (e.g., "info", "debug", "trace")
    pub log_level: String,

    /// Emit JSON log lines instead of text
    pub log_json: bool,

    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` naming the offending variable when a
    /// value cannot be parsed or fails validation.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            generated_path: env::var("GENERATED_PATH")
                .unwrap_or_else(|_| ".".to_string())
                .into(),
            public_path: env::var("PUBLIC_PATH")
                .unwrap_or_else(|_| "./public".to_string())
                .into(),
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,

            // Authentication
            auth_public_key: Self::optional("AUTH_PUBLIC_KEY"),
            access_token_secret: Self::optional("ACCESS_TOKEN_SECRET"),
            required_scope: env::var("AUTH_REQUIRED_SCOPE")
                .unwrap_or_else(|_| "walks.read".to_string()),
            public_host: Self::optional("PUBLIC_HOST"),

            // Privacy
            privacy_zones: Self::parse_privacy_zones()?,

            // Prevalidation
            allowed_hosts: Self::parse_list("ALLOWED_HOSTS"),
            disallowed_ips: Self::parse_list("DISALLOWED_IP_ADDRESSES"),
            disallowed_user_agents: Self::parse_json_list("DISALLOWED_USER_AGENTS")?,
            red_flags: Self::parse_list("RED_FLAGS"),
            ban_list_path: env::var("BAN_LIST_PATH")
                .unwrap_or_else(|_| "./garbage.txt".to_string())
                .into(),

            // Caching
            caching_enabled: Self::parse_env("ENABLE_CACHING", false)?,
            cache_route_overrides: Self::parse_cache_overrides()?,

            // Upstream
            sunx_latitude: Self::parse_optional("SUNX_LATITUDE")?,
            sunx_longitude: Self::parse_optional("SUNX_LONGITUDE")?,
            sunx_api_url: env::var("SUNX_API_URL")
                .unwrap_or_else(|_| "https://api.sunrise-sunset.org/json".to_string()),
            thumbnail_base_url: env::var("THUMBNAIL_BASE_URL")
                .unwrap_or_else(|_| "https://i.ytimg.com/vi".to_string()),
            cdn_invalidation_url: Self::optional("CDN_INVALIDATION_URL"),
            cdn_distribution_id: Self::optional("CDN_DISTRIBUTION_ID"),
            upstream_timeout: Duration::from_secs(Self::parse_env("UPSTREAM_TIMEOUT_SECS", 10)?),

            // Rate limiting
            rate_limit_rps: Self::parse_env("RATE_LIMIT_RPS", 0)?,
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", 50)?,
            cors_allowed_origins: Self::parse_cors_origins(),

            // Observability
            log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")),
            metrics_port: Self::parse_env("METRICS_PORT", 0)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.max_request_body_size == 0 {
            return Err(AppError::ConfigError(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.upstream_timeout.is_zero() {
            return Err(AppError::ConfigError(
                "UPSTREAM_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.required_scope.trim().is_empty() {
            return Err(AppError::ConfigError(
                "AUTH_REQUIRED_SCOPE cannot be empty".to_string(),
            ));
        }

        if self.sunx_latitude.is_some() != self.sunx_longitude.is_some() {
            return Err(AppError::ConfigError(
                "SUNX_LATITUDE and SUNX_LONGITUDE must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_rps > 0
    }

    /// Check if any token verification key is configured.
    pub fn auth_enabled(&self) -> bool {
        self.auth_public_key.is_some() || self.access_token_secret.is_some()
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr + ToString,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    fn parse_optional<T>(name: &str) -> AppResult<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        Self::optional(name)
            .map(|val| {
                val.parse()
                    .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}")))
            })
            .transpose()
    }

    fn optional(name: &str) -> Option<String> {
        env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Comma-separated list; empty entries dropped.
    fn parse_list(name: &str) -> Vec<String> {
        env::var(name)
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// JSON array of strings; user agents contain commas so they cannot be split.
    fn parse_json_list(name: &str) -> AppResult<Vec<String>> {
        match Self::optional(name) {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            None => Ok(Vec::new()),
        }
    }

    fn parse_privacy_zones() -> AppResult<PrivacyZones> {
        let raw = env::var("PRIVACY_ZONES").unwrap_or_else(|_| "[]".to_string());
        privacy_zones_from(&raw)
    }

    /// Parse `path=seconds` pairs.
    fn parse_cache_overrides() -> AppResult<Vec<(String, u64)>> {
        let raw = env::var("CACHE_ROUTE_OVERRIDES")
            .unwrap_or_else(|_| format!("/api/yt-thumbnail={DEFAULT_CACHE_MAX_AGE_SECS}"));
        parse_override_pairs(&raw)
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn parse_override_pairs(raw: &str) -> AppResult<Vec<(String, u64)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (path, secs) = pair.split_once('=').ok_or_else(|| {
                AppError::ConfigError(format!(
                    "Invalid CACHE_ROUTE_OVERRIDES entry {pair:?}: expected path=seconds"
                ))
            })?;
            let secs = secs.trim().parse::<u64>().map_err(|e| {
                AppError::ConfigError(format!("Invalid CACHE_ROUTE_OVERRIDES entry {pair:?}: {e}"))
            })?;
            Ok((path.trim().to_string(), secs))
        })
        .collect()
}

/// Parse the `PRIVACY_ZONES` value; a zone that could never redact fails startup.
fn privacy_zones_from(raw: &str) -> AppResult<PrivacyZones> {
    PrivacyZones::from_json(raw)
        .map_err(|e| AppError::ConfigError(format!("Invalid PRIVACY_ZONES: {e}")))
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 3000,
            generated_path: PathBuf::from("."),
            public_path: PathBuf::from("./public"),
            max_request_body_size: 1024 * 1024,
            // Authentication
            auth_public_key: None,
            access_token_secret: None,
            required_scope: "walks.read".to_string(),
            public_host: None,
            // Privacy
            privacy_zones: PrivacyZones::default(),
            // Prevalidation
            allowed_hosts: vec![],
            disallowed_ips: vec![],
            disallowed_user_agents: vec![],
            red_flags: vec![],
            ban_list_path: PathBuf::from("./garbage.txt"),
            // Caching
            caching_enabled: false,
            cache_route_overrides: vec![(
                "/api/yt-thumbnail".to_string(),
                DEFAULT_CACHE_MAX_AGE_SECS,
            )],
            // Upstream
            sunx_latitude: None,
            sunx_longitude: None,
            sunx_api_url: "https://api.sunrise-sunset.org/json".to_string(),
            thumbnail_base_url: "https://i.ytimg.com/vi".to_string(),
            cdn_invalidation_url: None,
            cdn_distribution_id: None,
            upstream_timeout: Duration::from_secs(10),
            // Rate limiting
            rate_limit_rps: 0,
            rate_limit_burst: 50,
            cors_allowed_origins: vec!["*".to_string()],
            // Observability
            log_level: "info".to_string(),
            log_json: false,
            metrics_port: 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.required_scope, "walks.read");
        assert!(!config.caching_enabled);
        assert!(!config.rate_limiting_enabled());
        assert!(!config.auth_enabled());
        assert!(config.privacy_zones.is_empty());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "localhost".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "localhost:8080");
    }

    #[test]
    fn test_parse_override_pairs() {
        let pairs = parse_override_pairs("/api/a=60, /api/b=3600").unwrap();
        assert_eq!(
            pairs,
            vec![("/api/a".to_string(), 60), ("/api/b".to_string(), 3600)]
        );
        assert!(parse_override_pairs("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_override_pairs_invalid() {
        let err = parse_override_pairs("/api/a").unwrap_err();
        assert!(err.to_string().contains("CACHE_ROUTE_OVERRIDES"));
        assert!(parse_override_pairs("/api/a=soon").is_err());
    }

    #[test]
    fn test_auth_enabled() {
        let config = Config {
            access_token_secret: Some("secret".to_string()),
            ..Config::default()
        };
        assert!(config.auth_enabled());
    }

    #[test]
    fn test_validate_sunx_pair() {
        let config = Config {
            sunx_latitude: Some(47.6),
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SUNX_LONGITUDE"));
    }

    #[test]
    fn test_validate_body_size_zero() {
        let config = Config {
            max_request_body_size: 0,
            ..Config::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("MAX_REQUEST_BODY_SIZE"));
    }

    #[test]
    fn test_privacy_zones_with_bad_radius_fail_startup() {
        let err = privacy_zones_from(
            r#"[{"coords":{"latitude":47.6,"longitude":-122.3},"radius":-5}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
        assert!(err.to_string().contains("Invalid PRIVACY_ZONES"));
        assert!(err.to_string().contains("radius -5"));

        let zones = privacy_zones_from(
            r#"[{"coords":{"latitude":47.6,"longitude":-122.3},"radius":150}]"#,
        )
        .unwrap();
        assert_eq!(zones.len(), 1);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }
}
