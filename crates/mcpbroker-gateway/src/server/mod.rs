//! Gateway Server
//!
//! HTTP surface of the broker: outer OAuth endpoints for MCP clients,
//! upstream callbacks and composite status. All collaborators are injected
//! through `GatewayDependencies`.

mod config;
mod dependencies;
mod error;
mod handlers;
pub mod logging_middleware;
mod service_container;

pub use config::{GatewayConfig, DEFAULT_PORT, DEFAULT_USER_HEADER};
pub use dependencies::{DependenciesBuilder, GatewayDependencies};
pub use error::{status_for, ApiError, ErrorBody};
pub use handlers::AppState;
pub use service_container::ServiceContainer;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cleanup::{spawn_cleanup, CleanupConfig};

/// OAuth broker server
pub struct GatewayServer {
    config: GatewayConfig,
    services: ServiceContainer,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, dependencies: GatewayDependencies) -> Self {
        info!("[Gateway] Initializing services...");
        let services = ServiceContainer::initialize(&dependencies, &config);
        Self { config, services }
    }

    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    fn app_state(&self) -> AppState {
        AppState {
            services: Arc::new(self.services.clone()),
            base_url: self.config.base_url.trim_end_matches('/').to_string(),
            user_header: self.config.user_header.clone(),
            token_secret: self.services.dependencies.token_secret.clone(),
            request_ttl: self.config.pending_ttl_chrono(),
        }
    }

    /// Build the Axum router
    pub fn router(&self) -> Router {
        let app_state = self.app_state();

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/.well-known/oauth-authorization-server/{mcp_id}",
                get(handlers::oauth_metadata),
            )
            // Outer flow
            .route("/oauth/authorize/{mcp_id}", get(handlers::oauth_authorize))
            .route("/oauth/token/{mcp_id}", post(handlers::oauth_token))
            .route(
                "/oauth/register/{id}",
                post(handlers::oauth_register)
                    .get(handlers::oauth_get_client)
                    .put(handlers::oauth_update_client)
                    .delete(handlers::oauth_delete_client),
            )
            // Upstream callbacks
            .route(
                "/oauth/callback/{oauth_auth_request}/{mcp_id}",
                get(handlers::oauth_callback),
            )
            .route(
                "/oauth/mcp/callback/{oauth_auth_request}/{mcp_id}",
                get(handlers::oauth_mcp_callback),
            )
            // Grants
            .route("/mcp/{mcp_id}/composite-auth", get(handlers::composite_auth))
            .route("/mcp/{mcp_id}/oauth", delete(handlers::disconnect))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn_with_state(
                app_state.clone(),
                logging_middleware::http_logging_middleware,
            ))
            .with_state(app_state);

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Serve until `cancel` fires. The cleanup loop shares the same token.
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let addr = self.config.addr()?;
        info!("[Gateway] Starting on {}", addr);
        info!(
            "[Gateway] CORS: {}",
            if self.config.enable_cors {
                "enabled"
            } else {
                "disabled"
            }
        );

        let deps = &self.services.dependencies;
        let cleanup = spawn_cleanup(
            deps.pending_repo.clone(),
            deps.auth_request_repo.clone(),
            CleanupConfig::with_ttl(self.config.pending_ttl),
            cancel.clone(),
        );

        let router = self.router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("[Gateway] Ready to accept connections");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        if let Err(e) = cleanup.await {
            tracing::warn!("[Gateway] Cleanup task ended abnormally: {}", e);
        }
        info!("[Gateway] Stopped");
        Ok(())
    }

    /// Start the server in the background
    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}
