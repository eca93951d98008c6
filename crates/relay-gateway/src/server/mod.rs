//! Gateway server setup
//!
//! Wires the node: service context, session registry, event subscription
//! and background tasks, then serves `/gateway` and `/health`.

mod handler;
mod state;
mod tasks;

pub use handler::{gateway_handler, ConnectParams};
pub use state::GatewayState;
pub use tasks::{run_offline_sweep, spawn_background_tasks};

use crate::connection::SessionRegistry;
use axum::{routing::get, Router};
use relay_cache::{
    EventSubscriber, RedisEventPublisher, RedisHalfMessageLog, RedisPool, RedisPresenceDirectory,
    SubscriberConfig,
};
use relay_common::{AppConfig, AppError, JwtVerifier};
use relay_core::{ModerationPolicy, PresenceDirectory, SnowflakeGenerator};
use relay_db::{
    create_pool, PgChannelRepository, PgInboxRepository, PgMessageRepository,
    PgOfflineQueueRepository, PgReactionRepository, PgReadReceiptRepository, PgSequenceRepository,
};
use relay_service::{AllowAll, EngineSettings, KeywordModeration, ServiceContextBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/gateway", get(gateway_handler))
        .route("/health", get(health_check))
}

async fn health_check() -> &'static str {
    "OK"
}

pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize all dependencies and create `GatewayState`
pub async fn create_gateway_state(config: AppConfig) -> Result<GatewayState, AppError> {
    tracing::info!("Connecting to PostgreSQL...");
    let pool = create_pool(&config.database)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    tracing::info!("PostgreSQL connection established");

    tracing::info!("Connecting to Redis...");
    let redis = RedisPool::from_config(&config.redis).map_err(|e| AppError::Cache(e.to_string()))?;
    tracing::info!("Redis pool created");

    let presence: Arc<dyn PresenceDirectory> = Arc::new(RedisPresenceDirectory::new(redis.clone()));
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
        .presence(presence.clone())
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

    let registry = SessionRegistry::new_shared(presence, config.gateway.node_id.clone());
    let jwt = JwtVerifier::from_config(&config.jwt);

    Ok(GatewayState::new(service_context, registry, jwt, config))
}

/// Run the gateway server until ctrl-c
pub async fn run_server(app: Router, addr: SocketAddr) -> Result<(), AppError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::Config(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Gateway listening on ws://{}/gateway", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::Config(format!("Server error: {e}")))
}

/// Run the complete gateway node with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr: SocketAddr = config
        .gateway
        .address()
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid gateway address: {e}")))?;

    let state = create_gateway_state(config).await?;

    let subscriber = EventSubscriber::start(SubscriberConfig {
        redis_url: state.config().redis.url.clone(),
        stream: state.config().delivery.events_stream.clone(),
        node_id: state.config().gateway.node_id.clone(),
        ..SubscriberConfig::default()
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = spawn_background_tasks(&state, subscriber.receiver(), shutdown_rx);

    tracing::info!(node_id = %state.registry().node_id(), "Gateway node started");

    let result = run_server(create_app(state), addr).await;

    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    if let Err(e) = subscriber.shutdown().await {
        tracing::warn!(error = %e, "Failed to stop event subscriber");
    }

    result
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
