//! Grant-based authorization check for remote servers.

use std::sync::Arc;

use async_trait::async_trait;
use mcpbroker_core::{McpAuthChecker, McpServer, OAuthResult, ServerConfig};
use tracing::debug;

use super::discovery::OAuthDiscovery;
use super::state_manager::TokenExchanger;

/// Answers "does this server still need authorization" from the Token Store.
///
/// A server needs authorization when it is remote, has upstream OAuth
/// settings, and no valid (or refreshable) grant exists for the user. The
/// returned URL reuses a live pending entry when there is one.
pub struct GrantAuthChecker {
    exchanger: Arc<TokenExchanger>,
    discovery: OAuthDiscovery,
}

impl GrantAuthChecker {
    pub fn new(exchanger: Arc<TokenExchanger>, discovery: OAuthDiscovery) -> Self {
        Self {
            exchanger,
            discovery,
        }
    }
}

#[async_trait]
impl McpAuthChecker for GrantAuthChecker {
    async fn check_for_mcp_auth(
        &self,
        server: &McpServer,
        config: &ServerConfig,
        user_id: &str,
        oauth_auth_request_id: &str,
        redirect_url: &str,
    ) -> OAuthResult<Option<String>> {
        if !server.is_remote() {
            return Ok(None);
        }
        let Some(settings) = &config.oauth else {
            debug!(mcp_id = %server.id, "[OAuth] Remote server has no OAuth settings");
            return Ok(None);
        };

        if self
            .exchanger
            .valid_grant(user_id, &server.id, &config.url)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let client_config = self
            .discovery
            .client_config(settings, &config.url, redirect_url)
            .await?;
        let auth_url = self
            .exchanger
            .pending_auth_url(
                user_id,
                &server.id,
                &config.url,
                oauth_auth_request_id,
                client_config,
            )
            .await?;
        Ok(Some(auth_url))
    }
}
