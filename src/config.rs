//! Application configuration loaded from environment variables.
//!
//! Tier TTLs, import leases and the upstream fetch limits all live here so
//! that the cache layers never read the environment themselves.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Upstream ---
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Webhook verification token echoed during the subscription handshake
    pub webhook_verify_token: String,
    /// Push subscription ID; events for other subscriptions are rejected
    pub strava_subscription_id: Option<u64>,
    /// Skip the cold tier entirely (no upstream calls)
    pub offline: bool,
    /// Maximum in-flight upstream requests per import
    pub fetch_concurrency: usize,
    /// Page size for activity listing
    pub page_size: u32,
    /// Strava host; overridden in tests
    pub strava_base_url: String,

    // --- Storage ---
    /// GCP project ID (Firestore warm tier)
    pub gcp_project_id: String,
    /// Use the in-process warm tier instead of Firestore
    pub memory_store: bool,
    /// Redis/Valkey URL for the hot tier; in-process cache when absent
    pub redis_url: Option<String>,
    /// Maximum pooled hot-tier connections
    pub redis_pool_size: usize,
    /// Hot-tier expiry for streams blobs
    pub hot_ttl: Duration,
    /// Warm-tier expiry for streams documents
    pub warm_ttl: Duration,
    /// Lease length of the per-user import flag
    pub import_flag_ttl: Duration,
    /// How long an import error stays visible under the flag key
    pub import_error_ttl: Duration,
    /// Index entries of users idle for longer than this are triaged
    pub index_retention: Duration,
    /// Hot-tier writes are flushed in groups of this many blobs
    pub hot_write_batch: usize,
    /// Interval between maintenance sweeps
    pub triage_interval: Duration,

    // --- Server ---
    /// Server port
    pub port: u16,
}

impl Default for Config {
    /// Default config for testing only.
    fn default() -> Self {
        Self::test_default()
    }
}

impl Config {
    /// Deterministic configuration for tests: in-memory tiers, no upstream.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            webhook_verify_token: "test_verify_token".to_string(),
            strava_subscription_id: None,
            offline: false,
            fetch_concurrency: 4,
            page_size: 200,
            strava_base_url: crate::strava::client::DEFAULT_BASE_URL.to_string(),
            gcp_project_id: "test-project".to_string(),
            memory_store: true,
            redis_url: None,
            redis_pool_size: 4,
            hot_ttl: Duration::from_secs(3 * 24 * 3600),
            warm_ttl: Duration::from_secs(30 * 24 * 3600),
            import_flag_ttl: Duration::from_secs(20),
            import_error_ttl: Duration::from_secs(10),
            index_retention: Duration::from_secs(365 * 24 * 3600),
            hot_write_batch: 25,
            triage_interval: Duration::from_secs(24 * 3600),
            port: 8080,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            webhook_verify_token: env::var("WEBHOOK_VERIFY_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_VERIFY_TOKEN"))?,
            strava_subscription_id: optional("STRAVA_SUBSCRIPTION_ID")?,
            offline: flag("OFFLINE"),
            fetch_concurrency: parse_or("FETCH_CONCURRENCY", 10)?,
            page_size: parse_or("PAGE_SIZE", 200)?,
            strava_base_url: env::var("STRAVA_BASE_URL")
                .unwrap_or_else(|_| crate::strava::client::DEFAULT_BASE_URL.to_string()),

            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            memory_store: flag("TRACKCACHE_MEMORY_STORE"),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            redis_pool_size: parse_or("REDIS_POOL_SIZE", 16)?,
            hot_ttl: secs_or("HOT_TTL_SECS", 3 * 24 * 3600)?,
            warm_ttl: secs_or("WARM_TTL_SECS", 30 * 24 * 3600)?,
            import_flag_ttl: secs_or("IMPORT_FLAG_TTL_SECS", 20)?,
            import_error_ttl: secs_or("IMPORT_ERROR_TTL_SECS", 10)?,
            index_retention: Duration::from_secs(
                parse_or::<u64>("INDEX_RETENTION_DAYS", 365)? * 24 * 3600,
            ),
            hot_write_batch: parse_or("HOT_WRITE_BATCH", 25)?,
            triage_interval: secs_or("TRIAGE_INTERVAL_SECS", 24 * 3600)?,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
        })
    }
}

fn flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn optional<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        _ => Ok(None),
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(optional(name)?.unwrap_or(default))
}

fn secs_or(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    parse_or(name, default).map(Duration::from_secs)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        // Set required env vars for test
        env::set_var("STRAVA_CLIENT_ID", "test_id");
        env::set_var("STRAVA_CLIENT_SECRET", " test_secret ");
        env::set_var("WEBHOOK_VERIFY_TOKEN", "test_verify");
        env::set_var("FETCH_CONCURRENCY", "7");
        env::set_var("OFFLINE", "true");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.strava_client_id, "test_id");
        assert_eq!(config.strava_client_secret, "test_secret");
        assert_eq!(config.fetch_concurrency, 7);
        assert!(config.offline);
        assert_eq!(config.import_flag_ttl, Duration::from_secs(20));
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_test_default_uses_memory_tiers() {
        let config = Config::test_default();
        assert!(config.memory_store);
        assert!(config.redis_url.is_none());
        assert!(config.hot_ttl < config.warm_ttl);
    }
}
