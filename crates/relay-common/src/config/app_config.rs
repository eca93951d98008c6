//! Application configuration structs
//!
//! Loaded from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub api: ServerConfig,
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub cors: CorsConfig,
    pub rate_limit: RateLimitConfig,
    pub snowflake: SnowflakeConfig,
    pub fanout: FanoutConfig,
    pub delivery: DeliveryConfig,
    pub offline: OfflineConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// WebSocket gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub heartbeat_interval_ms: u64,
    /// Identity of this node in presence records; unique per process
    pub node_id: String,
}

impl GatewayConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Redis configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub max_connections: u32,
}

/// JWT configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    /// Lifetime in seconds of tokens issued by tooling
    pub token_expiry: i64,
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

/// Global request rate limit of the REST API
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 50,
            burst: 100,
        }
    }
}

/// Snowflake ID generator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SnowflakeConfig {
    pub worker_id: u16,
}

/// Fan-out decision configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Live member count at which sends switch to read fan-out
    pub read_threshold: i64,
    /// Words that send a message to review instead of straight to NORMAL
    pub moderation_keywords: Vec<String>,
}

/// Publish pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Redis stream every gateway node reads committed events from
    pub events_stream: String,
    /// Approximate number of events kept in the stream
    #[serde(default = "default_events_stream_max_len")]
    pub events_stream_max_len: usize,
    pub local_write_timeout_ms: u64,
    pub reconcile_interval_ms: u64,
    /// Age after which a half message is presumed orphaned
    pub reconcile_stale_after_ms: u64,
    pub check_state_attempts: u32,
    /// How long a publisher may hold a half message before others take over
    #[serde(default = "default_publish_lease_ms")]
    pub publish_lease_ms: u64,
    /// Wait before check_state after a write timed out
    #[serde(default = "default_unknown_settle_ms")]
    pub unknown_settle_ms: u64,
}

impl DeliveryConfig {
    pub fn local_write_timeout(&self) -> Duration {
        Duration::from_millis(self.local_write_timeout_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_interval_ms)
    }

    pub fn reconcile_stale_after(&self) -> Duration {
        Duration::from_millis(self.reconcile_stale_after_ms)
    }

    pub fn publish_lease(&self) -> Duration {
        Duration::from_millis(self.publish_lease_ms)
    }

    pub fn unknown_settle(&self) -> Duration {
        Duration::from_millis(self.unknown_settle_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            events_stream: default_events_stream(),
            events_stream_max_len: default_events_stream_max_len(),
            local_write_timeout_ms: 5_000,
            reconcile_interval_ms: 10_000,
            reconcile_stale_after_ms: 30_000,
            check_state_attempts: 3,
            publish_lease_ms: default_publish_lease_ms(),
            unknown_settle_ms: default_unknown_settle_ms(),
        }
    }
}

/// Offline queue configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
    pub max_retry: i32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub sweep_interval_ms: u64,
    pub drain_batch_size: i64,
    /// How long a pushed entry waits for the client's ack before it is due again
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
}

impl OfflineConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            max_retry: 5,
            base_backoff_ms: 2_000,
            max_backoff_ms: 300_000,
            sweep_interval_ms: 15_000,
            drain_batch_size: 100,
            ack_timeout_ms: default_ack_timeout_ms(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "relay".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_events_stream() -> String {
    "relay:events".to_string()
}

fn default_events_stream_max_len() -> usize {
    100_000
}

fn default_publish_lease_ms() -> u64 {
    30_000
}

fn default_unknown_settle_ms() -> u64 {
    1_000
}

fn default_ack_timeout_ms() -> u64 {
    30_000
}

fn default_node_id() -> String {
    format!("gateway-{}", std::process::id())
}

/// Optional variable parsed into `T`; present but unparsable is an error
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    Ok(parse_var(name)?.unwrap_or(default))
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

fn list_var(name: &'static str) -> Vec<String> {
    env::var(name)
        .ok()
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or a
    /// present variable cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let offline_defaults = OfflineConfig::default();
        let delivery_defaults = DeliveryConfig::default();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            api: ServerConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| default_host()),
                port: parse_or("API_PORT", 8080)?,
                request_timeout_secs: parse_or("API_REQUEST_TIMEOUT_SECS", 30)?,
            },
            gateway: GatewayConfig {
                host: env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host()),
                port: parse_or("GATEWAY_PORT", 8081)?,
                heartbeat_interval_ms: parse_or("GATEWAY_HEARTBEAT_INTERVAL_MS", 41_250)?,
                node_id: env::var("GATEWAY_NODE_ID").unwrap_or_else(|_| default_node_id()),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 20)?,
                min_connections: parse_or("DATABASE_MIN_CONNECTIONS", 5)?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
                max_connections: parse_or("REDIS_MAX_CONNECTIONS", 10)?,
            },
            jwt: JwtConfig {
                secret: required("JWT_SECRET")?,
                issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| default_app_name()),
                token_expiry: parse_or("JWT_TOKEN_EXPIRY", 3_600)?,
            },
            cors: CorsConfig {
                allowed_origins: list_var("CORS_ALLOWED_ORIGINS"),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: parse_or("RATE_LIMIT_PER_SECOND", 50)?,
                burst: parse_or("RATE_LIMIT_BURST", 100)?,
            },
            snowflake: SnowflakeConfig {
                worker_id: parse_or("WORKER_ID", 0)?,
            },
            fanout: FanoutConfig {
                read_threshold: parse_or(
                    "FANOUT_READ_THRESHOLD",
                    relay_core::DEFAULT_READ_FANOUT_THRESHOLD,
                )?,
                moderation_keywords: list_var("MODERATION_KEYWORDS"),
            },
            delivery: DeliveryConfig {
                events_stream: env::var("DELIVERY_EVENTS_STREAM")
                    .unwrap_or_else(|_| default_events_stream()),
                events_stream_max_len: parse_or(
                    "DELIVERY_EVENTS_STREAM_MAX_LEN",
                    delivery_defaults.events_stream_max_len,
                )?,
                local_write_timeout_ms: parse_or(
                    "DELIVERY_LOCAL_WRITE_TIMEOUT_MS",
                    delivery_defaults.local_write_timeout_ms,
                )?,
                reconcile_interval_ms: parse_or(
                    "DELIVERY_RECONCILE_INTERVAL_MS",
                    delivery_defaults.reconcile_interval_ms,
                )?,
                reconcile_stale_after_ms: parse_or(
                    "DELIVERY_RECONCILE_STALE_AFTER_MS",
                    delivery_defaults.reconcile_stale_after_ms,
                )?,
                check_state_attempts: parse_or(
                    "DELIVERY_CHECK_STATE_ATTEMPTS",
                    delivery_defaults.check_state_attempts,
                )?,
                publish_lease_ms: parse_or(
                    "DELIVERY_PUBLISH_LEASE_MS",
                    delivery_defaults.publish_lease_ms,
                )?,
                unknown_settle_ms: parse_or(
                    "DELIVERY_UNKNOWN_SETTLE_MS",
                    delivery_defaults.unknown_settle_ms,
                )?,
            },
            offline: OfflineConfig {
                max_retry: parse_or("OFFLINE_MAX_RETRY", offline_defaults.max_retry)?,
                base_backoff_ms: parse_or(
                    "OFFLINE_BASE_BACKOFF_MS",
                    offline_defaults.base_backoff_ms,
                )?,
                max_backoff_ms: parse_or("OFFLINE_MAX_BACKOFF_MS", offline_defaults.max_backoff_ms)?,
                sweep_interval_ms: parse_or(
                    "OFFLINE_SWEEP_INTERVAL_MS",
                    offline_defaults.sweep_interval_ms,
                )?,
                drain_batch_size: parse_or(
                    "OFFLINE_DRAIN_BATCH_SIZE",
                    offline_defaults.drain_batch_size,
                )?,
                ack_timeout_ms: parse_or("OFFLINE_ACK_TIMEOUT_MS", offline_defaults.ack_timeout_ms)?,
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
