//! Server setup and initialization
//!
//! Provides the main application builder and server runner.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use relay_cache::{RedisEventPublisher, RedisHalfMessageLog, RedisPool, RedisPresenceDirectory};
use relay_common::{AppConfig, AppError, JwtVerifier};
use relay_core::{ModerationPolicy, SnowflakeGenerator};
use relay_db::{
    create_pool, run_migrations, PgChannelRepository, PgInboxRepository, PgMessageRepository,
    PgOfflineQueueRepository, PgReactionRepository, PgReadReceiptRepository, PgSequenceRepository,
};
use relay_service::{AllowAll, EngineSettings, KeywordModeration, ServiceContextBuilder};
use tokio::net::TcpListener;
use tracing::info;

use crate::middleware::{apply_middleware, MiddlewareConfig};
use crate::routes::{create_router, health_routes};
use crate::state::AppState;

/// Build the complete Axum application with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    let config = state.config();
    let middleware = MiddlewareConfig {
        request_timeout: Duration::from_secs(config.api.request_timeout_secs),
        cors: config.cors.clone(),
        rate_limit: Some(config.rate_limit.clone()),
        is_production: config.app.env.is_production(),
    };

    apply_middleware(create_router(), &middleware)
        .merge(health_routes())
        .with_state(state)
}

/// Initialize all dependencies and create AppState
pub async fn create_app_state(config: AppConfig) -> Result<AppState, AppError> {
    info!("Connecting to PostgreSQL...");
    let pool = create_pool(&config.database)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    run_migrations(&pool)
        .await
        .map_err(|e| AppError::Database(format!("Migration failed: {e}")))?;
    info!("PostgreSQL connection established");

    info!("Connecting to Redis...");
    let redis = RedisPool::from_config(&config.redis).map_err(|e| AppError::Cache(e.to_string()))?;
    info!("Redis pool created");

    let moderation: Arc<dyn ModerationPolicy> = if config.fanout.moderation_keywords.is_empty() {
        Arc::new(AllowAll)
    } else {
        Arc::new(KeywordModeration::new(&config.fanout.moderation_keywords))
    };
    let channels = Arc::new(PgChannelRepository::new(pool.clone()));

    let service_context = ServiceContextBuilder::new()
        .sequence_repo(Arc::new(PgSequenceRepository::new(pool.clone())))
        .message_repo(Arc::new(PgMessageRepository::new(pool.clone())))
        .inbox_repo(Arc::new(PgInboxRepository::new(pool.clone())))
        .offline_repo(Arc::new(PgOfflineQueueRepository::new(pool.clone())))
        .receipt_repo(Arc::new(PgReadReceiptRepository::new(pool.clone())))
        .reaction_repo(Arc::new(PgReactionRepository::new(pool.clone())))
        .membership(channels.clone())
        .channel_repo(channels)
        .presence(Arc::new(RedisPresenceDirectory::new(redis.clone())))
        .half_log(Arc::new(RedisHalfMessageLog::new(redis.clone())))
        .publisher(Arc::new(
            RedisEventPublisher::new(redis.clone(), config.delivery.events_stream.clone())
                .with_max_len(config.delivery.events_stream_max_len),
        ))
        .moderation(moderation)
        .snowflake_generator(Arc::new(SnowflakeGenerator::new(config.snowflake.worker_id)))
        .settings(EngineSettings::from_config(&config))
        .build()
        .map_err(|e| AppError::Config(e.to_string()))?;

    let jwt = JwtVerifier::from_config(&config.jwt);

    Ok(AppState::new(service_context, jwt, pool, redis, config))
}

/// Run the HTTP server
pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), AppError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))?;

    Ok(())
}

/// Run the complete server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr: SocketAddr = config
        .api
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid API address: {e}")))?;

    let state = create_app_state(config).await?;
    run_server(create_app(state), addr).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
