//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, ConfigError, CorsConfig, DatabaseConfig, DeliveryConfig, Environment,
    FanoutConfig, GatewayConfig, JwtConfig, OfflineConfig, RateLimitConfig, RedisConfig, ServerConfig,
    SnowflakeConfig,
};
