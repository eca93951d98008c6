//! Gateway state

use crate::connection::SessionRegistry;
use relay_common::{AppConfig, JwtVerifier};
use relay_service::ServiceContext;
use std::sync::Arc;

/// Shared dependencies of the gateway node
#[derive(Clone)]
pub struct GatewayState {
    service_context: Arc<ServiceContext>,
    registry: Arc<SessionRegistry>,
    jwt: Arc<JwtVerifier>,
    config: Arc<AppConfig>,
}

impl GatewayState {
    pub fn new(
        service_context: ServiceContext,
        registry: Arc<SessionRegistry>,
        jwt: JwtVerifier,
        config: AppConfig,
    ) -> Self {
        Self {
            service_context: Arc::new(service_context),
            registry,
            jwt: Arc::new(jwt),
            config: Arc::new(config),
        }
    }

    pub fn service_context(&self) -> &ServiceContext {
        &self.service_context
    }

    /// Sessions held by this node
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn jwt(&self) -> &JwtVerifier {
        &self.jwt
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("registry", &self.registry)
            .field("config", &"AppConfig")
            .finish()
    }
}
