//! Composite Authorization Coordinator
//!
//! A composite MCP server is authorized for a user once every enabled
//! remote component holds a grant. Until then the coordinator reports the
//! outstanding component auth URLs; afterwards it completes the outer flow
//! by issuing the client's authorization code.

use std::sync::Arc;

use chrono::Duration;
use mcpbroker_core::{
    AuthRequestRepository, CompositeComponentStatus, McpAuthChecker, OAuthAuthRequest,
    OAuthError, OAuthResult, ServerCatalog,
};
use tracing::{debug, info};

use super::authorization_code::AuthCodeIssuer;
use super::{storage_error, NO_OUTER_REQUEST};

/// Result of one composite check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositeAuthStatus {
    /// Components that still need the user to authorize.
    Pending(Vec<CompositeComponentStatus>),
    /// All components satisfied; send the user-agent here.
    Complete { redirect_url: String },
    /// All components satisfied and no outer request to complete.
    Satisfied,
}

impl CompositeAuthStatus {
    pub fn pending_components(&self) -> &[CompositeComponentStatus] {
        match self {
            Self::Pending(list) => list,
            _ => &[],
        }
    }
}

/// Callback URL used for a component's upstream flow.
pub fn component_redirect_url(
    base_url: &str,
    oauth_auth_request_id: Option<&str>,
    component_id: &str,
) -> String {
    let outer = oauth_auth_request_id
        .filter(|id| !id.is_empty())
        .unwrap_or(NO_OUTER_REQUEST);
    format!(
        "{}/oauth/mcp/callback/{}/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(outer),
        urlencoding::encode(component_id)
    )
}

pub struct CompositeCoordinator {
    catalog: Arc<dyn ServerCatalog>,
    checker: Arc<dyn McpAuthChecker>,
    issuer: Arc<AuthCodeIssuer>,
    requests: Arc<dyn AuthRequestRepository>,
    base_url: String,
    request_ttl: Duration,
}

impl CompositeCoordinator {
    pub fn new(
        catalog: Arc<dyn ServerCatalog>,
        checker: Arc<dyn McpAuthChecker>,
        issuer: Arc<AuthCodeIssuer>,
        requests: Arc<dyn AuthRequestRepository>,
        base_url: impl Into<String>,
        request_ttl: Duration,
    ) -> Self {
        Self {
            catalog,
            checker,
            issuer,
            requests,
            base_url: base_url.into(),
            request_ttl,
        }
    }

    /// Evaluate the composite for `user_id`, completing the outer request
    /// when every component is satisfied.
    pub async fn check_composite_auth(
        &self,
        composite_id: &str,
        user_id: &str,
        oauth_auth_request_id: Option<&str>,
    ) -> OAuthResult<CompositeAuthStatus> {
        let composite = self.catalog.server_for_action(composite_id).await?;
        if !composite.is_composite() {
            return Err(OAuthError::invalid_request(format!(
                "MCP server {} is not a composite server",
                composite_id
            )));
        }

        let outer_id = oauth_auth_request_id.filter(|id| !id.is_empty() && *id != NO_OUTER_REQUEST);
        let outer = match outer_id {
            Some(id) => Some(self.outer_request(id, composite_id, user_id).await?),
            None => None,
        };

        let mut pending = Vec::new();
        for component in self.catalog.component_servers(&composite).await? {
            if !composite.component_enabled(&component) {
                debug!(
                    mcp_id = %component.id,
                    "[Composite] Skipping disabled component"
                );
                continue;
            }
            // Non-remote runtimes never need OAuth
            if !component.is_remote() {
                continue;
            }

            let config = self.catalog.server_config_for_action(&component).await?;
            let redirect_url = component_redirect_url(&self.base_url, outer_id, &component.id);
            let auth_url = self
                .checker
                .check_for_mcp_auth(
                    &component,
                    &config,
                    user_id,
                    outer_id.unwrap_or_default(),
                    &redirect_url,
                )
                .await?;

            if let Some(auth_url) = auth_url {
                pending.push(CompositeComponentStatus {
                    catalog_entry_id: component.catalog_entry_id.clone(),
                    mcp_server_id: component.id.clone(),
                    auth_url,
                });
            }
        }

        if !pending.is_empty() {
            debug!(
                mcp_id = %composite_id,
                user_id = %user_id,
                "[Composite] {} component(s) still need authorization",
                pending.len()
            );
            return Ok(CompositeAuthStatus::Pending(pending));
        }

        match outer {
            Some(request) => {
                info!(
                    mcp_id = %composite_id,
                    user_id = %user_id,
                    "[Composite] All components authorized, completing request {}",
                    request.id
                );
                let redirect_url = self.issuer.issue(&request).await?;
                Ok(CompositeAuthStatus::Complete { redirect_url })
            }
            None => Ok(CompositeAuthStatus::Satisfied),
        }
    }

    async fn outer_request(
        &self,
        id: &str,
        composite_id: &str,
        user_id: &str,
    ) -> OAuthResult<OAuthAuthRequest> {
        let request = self
            .requests
            .get(id)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| OAuthError::not_found("authorization request"))?;

        if request.mcp_id != composite_id || request.user_id != user_id {
            return Err(OAuthError::invalid_request(
                "authorization request does not belong to this server and user",
            ));
        }
        if request.is_expired(self.request_ttl) {
            return Err(OAuthError::ExpiredState);
        }
        Ok(request)
    }
}
