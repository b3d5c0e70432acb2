//! Service Container - holds all initialized services
//!
//! Services are wired once from `GatewayDependencies` and shared by every
//! handler through `AppState`.

use std::sync::Arc;

use mcpbroker_core::McpAuthChecker;

use super::config::GatewayConfig;
use super::dependencies::GatewayDependencies;
use crate::oauth::{
    AuthCodeIssuer, CompositeCoordinator, GrantAuthChecker, OAuthDiscovery, TokenExchanger,
    UpstreamOAuthClient,
};

#[derive(Clone)]
pub struct ServiceContainer {
    pub exchanger: Arc<TokenExchanger>,
    pub checker: Arc<dyn McpAuthChecker>,
    pub issuer: Arc<AuthCodeIssuer>,
    pub coordinator: Arc<CompositeCoordinator>,
    pub dependencies: GatewayDependencies,
}

impl ServiceContainer {
    pub fn initialize(deps: &GatewayDependencies, config: &GatewayConfig) -> Self {
        let ttl = config.pending_ttl_chrono();

        let exchanger = Arc::new(
            TokenExchanger::new(
                deps.pending_repo.clone(),
                deps.token_repo.clone(),
                UpstreamOAuthClient::new(deps.http_client.clone()),
                deps.audit.clone(),
            )
            .with_pending_ttl(ttl),
        );

        let checker: Arc<dyn McpAuthChecker> = match &deps.auth_checker {
            Some(checker) => checker.clone(),
            None => Arc::new(GrantAuthChecker::new(
                exchanger.clone(),
                OAuthDiscovery::new(deps.http_client.clone()),
            )),
        };

        let issuer = Arc::new(AuthCodeIssuer::new(
            deps.auth_request_repo.clone(),
            deps.audit.clone(),
        ));

        let coordinator = Arc::new(CompositeCoordinator::new(
            deps.catalog.clone(),
            checker.clone(),
            issuer.clone(),
            deps.auth_request_repo.clone(),
            config.base_url.clone(),
            ttl,
        ));

        Self {
            exchanger,
            checker,
            issuer,
            coordinator,
            dependencies: deps.clone(),
        }
    }
}
