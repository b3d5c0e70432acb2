//! McpBroker Gateway
//!
//! OAuth token broker for MCP servers:
//! - Upstream authorization code flow with PKCE and encrypted grants
//! - Composite servers gated on every enabled component's authorization
//! - Outer OAuth 2.1 authorization server for MCP clients (DCR, PKCE, tokens)
//! - Background cleanup of stale authorization state

pub mod auth;
pub mod catalog;
pub mod cleanup;
pub mod logging;
pub mod oauth;
pub mod server;

pub use catalog::StaticServerCatalog;
pub use cleanup::{cleanup_once, spawn_cleanup, CleanupConfig, CleanupStats};
pub use oauth::{
    AuthCodeIssuer, CallbackOutcome, CallbackParams, CompositeAuthStatus, CompositeCoordinator,
    GrantAuthChecker, OAuthDiscovery, TokenExchanger, UpstreamOAuthClient,
};
pub use server::{
    AppState, DependenciesBuilder, GatewayConfig, GatewayDependencies, GatewayServer,
    ServiceContainer, DEFAULT_USER_HEADER,
};
