//! Collaborator traits
//!
//! Narrow interfaces to systems outside the broker: the server catalog,
//! the launcher that knows whether a server needs authorization, and the
//! audit pipeline.

use async_trait::async_trait;
use tracing::info;

use crate::domain::{AuditEvent, McpServer, ServerConfig};
use crate::error::OAuthResult;

/// Server configuration lookup.
#[async_trait]
pub trait ServerCatalog: Send + Sync {
    /// Resolve a server instance by ID. Unknown IDs yield `OAuthError::NotFound`.
    async fn server_for_action(&self, mcp_id: &str) -> OAuthResult<McpServer>;

    /// Connection details for a server.
    async fn server_config_for_action(&self, server: &McpServer) -> OAuthResult<ServerConfig>;

    /// Every server instance whose `composite_name` is `composite.id`.
    async fn component_servers(&self, composite: &McpServer) -> OAuthResult<Vec<McpServer>>;
}

/// Answers whether a server still needs authorization for a user.
#[async_trait]
pub trait McpAuthChecker: Send + Sync {
    /// Returns the URL the user must visit, or `None` when the server is
    /// already authorized (or needs no authorization).
    async fn check_for_mcp_auth(
        &self,
        server: &McpServer,
        config: &ServerConfig,
        user_id: &str,
        oauth_auth_request_id: &str,
        redirect_url: &str,
    ) -> OAuthResult<Option<String>>;
}

/// Sink for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Audit sink that writes events to the `audit` tracing target.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        info!(
            target: "audit",
            user_id = %event.user_id,
            mcp_id = %event.mcp_id,
            action = ?event.action,
            outcome = ?event.outcome,
            detail = event.detail.as_deref().unwrap_or(""),
            "oauth flow event"
        );
    }
}
