//! Application state
//!
//! Holds the shared state for the Axum application: the service context,
//! the token verifier, and the backing pools probed by readiness checks.

use std::sync::Arc;

use relay_cache::RedisPool;
use relay_common::{AppConfig, JwtVerifier};
use relay_db::PgPool;
use relay_service::ServiceContext;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Service context containing all dependencies
    service_context: Arc<ServiceContext>,
    jwt: Arc<JwtVerifier>,
    pool: PgPool,
    redis: RedisPool,
    /// Application configuration
    config: Arc<AppConfig>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(
        service_context: ServiceContext,
        jwt: JwtVerifier,
        pool: PgPool,
        redis: RedisPool,
        config: AppConfig,
    ) -> Self {
        Self {
            service_context: Arc::new(service_context),
            jwt: Arc::new(jwt),
            pool,
            redis,
            config: Arc::new(config),
        }
    }

    /// Get the service context
    pub fn service_context(&self) -> &ServiceContext {
        &self.service_context
    }

    /// Verifier for caller identity tokens
    pub fn jwt(&self) -> &JwtVerifier {
        &self.jwt
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn redis(&self) -> &RedisPool {
        &self.redis
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("service_context", &self.service_context)
            .field("config", &"AppConfig")
            .finish()
    }
}
