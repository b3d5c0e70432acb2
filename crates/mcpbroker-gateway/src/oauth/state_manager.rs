//! Token Exchanger
//!
//! Drives one upstream authorization per pending state:
//! `authorize` records the pending entry and returns the provider URL,
//! `callback` claims it, exchanges the code, persists the grant and only
//! then removes the pending entry. Grant reuse and refresh live here too.

use std::sync::Arc;

use chrono::Duration;
use mcpbroker_core::{
    AuditAction, AuditEvent, AuditSink, FlowOutcome, OAuthClientConfig, OAuthError, OAuthGrant,
    OAuthResult, OAuthTokenRepository, PendingAuthorization, PendingStateRepository,
};
use tracing::{debug, info, warn};

use super::flow::{authorization_url, UpstreamOAuthClient};
use super::pkce::{random_url_token, PkceChallenge};
use super::storage_error;

/// Default lifetime of a pending authorization.
pub const DEFAULT_PENDING_TTL_SECS: i64 = 30 * 60;

/// Grants expiring within this window are refreshed before use.
const REFRESH_BUFFER_SECS: i64 = 300;

/// Where a completed callback leaves the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackOutcome {
    /// Outer first-level request to resume (empty if none).
    pub oauth_auth_request_id: String,
    pub mcp_id: String,
    pub user_id: String,
}

/// Parameters the upstream provider sent back to the callback.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    pub state: String,
    pub code: String,
    pub error: String,
    pub error_description: String,
    /// Server the callback URL was issued for; empty skips the check.
    pub mcp_id: String,
}

pub struct TokenExchanger {
    pending: Arc<dyn PendingStateRepository>,
    tokens: Arc<dyn OAuthTokenRepository>,
    client: UpstreamOAuthClient,
    audit: Arc<dyn AuditSink>,
    pending_ttl: Duration,
}

impl TokenExchanger {
    pub fn new(
        pending: Arc<dyn PendingStateRepository>,
        tokens: Arc<dyn OAuthTokenRepository>,
        client: UpstreamOAuthClient,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            pending,
            tokens,
            client,
            audit,
            pending_ttl: Duration::seconds(DEFAULT_PENDING_TTL_SECS),
        }
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn pending_ttl(&self) -> Duration {
        self.pending_ttl
    }

    /// Start an upstream authorization and return the provider URL.
    pub async fn authorize(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        config: OAuthClientConfig,
    ) -> OAuthResult<String> {
        let state = random_url_token(32);
        let pkce = PkceChallenge::generate();
        let auth_url = authorization_url(&config, &state, &pkce.challenge, url)?;

        let pending = PendingAuthorization::new(
            user_id,
            mcp_id,
            url,
            oauth_auth_request_id,
            &state,
            &pkce.verifier,
            &pkce.challenge,
            config,
        );
        self.pending.create(&pending).await.map_err(|e| match storage_error(e) {
            OAuthError::Storage(e) => {
                OAuthError::Internal(format!("failed to record pending authorization: {}", e))
            }
            other => other,
        })?;

        info!(
            mcp_id = %mcp_id,
            user_id = %user_id,
            "[OAuth] Started authorization (state hash {})",
            pending.short_hash()
        );
        Ok(auth_url)
    }

    /// Authorization URL for the tuple, reusing a live pending entry.
    pub async fn pending_auth_url(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        config: OAuthClientConfig,
    ) -> OAuthResult<String> {
        let active = self
            .pending
            .find_active(user_id, mcp_id, url, oauth_auth_request_id, self.pending_ttl)
            .await
            .map_err(storage_error)?;

        if let Some(pending) = active {
            debug!(
                mcp_id = %mcp_id,
                "[OAuth] Reusing pending authorization {}",
                pending.short_hash()
            );
            return authorization_url(
                &pending.config,
                &pending.state,
                &pending.code_challenge,
                &pending.url,
            );
        }

        self.authorize(user_id, mcp_id, url, oauth_auth_request_id, config)
            .await
    }

    /// Complete an upstream authorization.
    pub async fn callback(&self, params: &CallbackParams) -> OAuthResult<CallbackOutcome> {
        if params.state.is_empty() {
            return Err(OAuthError::invalid_request("missing state"));
        }

        let Some(pending) = self
            .pending
            .claim(&params.state)
            .await
            .map_err(storage_error)?
        else {
            warn!("[OAuth] Callback for unknown or already used state");
            return Err(OAuthError::not_found("authorization state"));
        };

        if !params.mcp_id.is_empty() && params.mcp_id != pending.mcp_id {
            warn!(
                "[OAuth] Callback for {} carries state issued for {}",
                params.mcp_id, pending.mcp_id
            );
            if let Err(e) = self.pending.release(&pending.hashed_state).await {
                warn!(
                    "[OAuth] Failed to release pending state {}: {}",
                    pending.short_hash(),
                    e
                );
            }
            self.record(
                &pending,
                AuditAction::Callback,
                FlowOutcome::Failed,
                Some("server mismatch".to_string()),
            );
            return Err(OAuthError::invalid_request(
                "callback does not match the authorized server",
            ));
        }

        if pending.is_expired(self.pending_ttl) {
            self.discard(&pending).await;
            self.record(&pending, AuditAction::Callback, FlowOutcome::Expired, None);
            return Err(OAuthError::ExpiredState);
        }

        if !params.error.is_empty() {
            self.discard(&pending).await;
            let description =
                (!params.error_description.is_empty()).then(|| params.error_description.clone());
            self.record(
                &pending,
                AuditAction::Callback,
                FlowOutcome::Failed,
                Some(params.error.clone()),
            );
            return Err(OAuthError::UpstreamAuthorization {
                error: params.error.clone(),
                description,
            });
        }

        if params.code.is_empty() {
            self.discard(&pending).await;
            self.record(
                &pending,
                AuditAction::Callback,
                FlowOutcome::Failed,
                Some("missing code".to_string()),
            );
            return Err(OAuthError::invalid_request("missing authorization code"));
        }

        let token = match self
            .client
            .exchange_code(&pending.config, &params.code, &pending.verifier)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                warn!(mcp_id = %pending.mcp_id, "[OAuth] Code exchange failed: {}", e);
                self.discard(&pending).await;
                self.record(
                    &pending,
                    AuditAction::Callback,
                    FlowOutcome::Failed,
                    Some(e.to_string()),
                );
                return Err(e);
            }
        };

        // The pending row stays until the grant is durable
        if let Err(e) = self
            .tokens
            .replace(
                &pending.user_id,
                &pending.mcp_id,
                &pending.url,
                &pending.oauth_auth_request_id,
                &pending.config,
                &token,
            )
            .await
        {
            let err = storage_error(e);
            // Keep the entry usable so the same callback can be retried
            if let Err(e) = self.pending.release(&pending.hashed_state).await {
                warn!(
                    "[OAuth] Failed to release pending state {}: {}",
                    pending.short_hash(),
                    e
                );
            }
            self.record(
                &pending,
                AuditAction::Callback,
                FlowOutcome::Failed,
                Some(err.to_string()),
            );
            return Err(err);
        }

        self.discard(&pending).await;
        self.record(&pending, AuditAction::Callback, FlowOutcome::Completed, None);
        info!(
            mcp_id = %pending.mcp_id,
            user_id = %pending.user_id,
            "[OAuth] Authorization completed"
        );

        Ok(CallbackOutcome {
            oauth_auth_request_id: pending.oauth_auth_request_id,
            mcp_id: pending.mcp_id,
            user_id: pending.user_id,
        })
    }

    /// A usable grant, refreshing it first if it is about to expire.
    ///
    /// `None` means the user has to authorize again.
    pub async fn valid_grant(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
    ) -> OAuthResult<Option<OAuthGrant>> {
        let Some(mut grant) = self
            .tokens
            .get(user_id, mcp_id, url)
            .await
            .map_err(storage_error)?
        else {
            return Ok(None);
        };

        if !grant.expires_soon(REFRESH_BUFFER_SECS) {
            return Ok(Some(grant));
        }

        if !grant.can_refresh() {
            debug!(mcp_id = %mcp_id, "[OAuth] Grant expiring and not refreshable");
            return Ok((!grant.is_expired()).then_some(grant));
        }

        match self
            .client
            .refresh(&grant.client_config(), &grant.refresh_token)
            .await
        {
            Ok(token) => {
                grant.apply_refresh(&token);
                self.tokens.save(&grant).await.map_err(storage_error)?;
                self.audit.record(AuditEvent::new(
                    user_id,
                    mcp_id,
                    AuditAction::Refresh,
                    FlowOutcome::Completed,
                ));
                info!(mcp_id = %mcp_id, user_id = %user_id, "[OAuth] Grant refreshed");
                Ok(Some(grant))
            }
            Err(e) => {
                warn!(mcp_id = %mcp_id, "[OAuth] Refresh failed: {}", e);
                self.audit.record(
                    AuditEvent::new(user_id, mcp_id, AuditAction::Refresh, FlowOutcome::Failed)
                        .with_detail(e.to_string()),
                );
                Ok(None)
            }
        }
    }

    /// Access token for a proxied request.
    ///
    /// Never restarts an authorization flow; a missing or unrefreshable
    /// grant is `ReauthRequired` and the caller decides what to do.
    pub async fn access_token_for(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
    ) -> OAuthResult<String> {
        match self.valid_grant(user_id, mcp_id, url).await? {
            Some(grant) => Ok(grant.access_token),
            None => Err(OAuthError::ReauthRequired {
                mcp_id: mcp_id.to_string(),
            }),
        }
    }

    /// Remove the user's grant for one server URL.
    pub async fn disconnect(&self, user_id: &str, mcp_id: &str, url: &str) -> OAuthResult<()> {
        self.tokens
            .delete_for_url(user_id, mcp_id, url)
            .await
            .map_err(storage_error)?;
        self.audit.record(AuditEvent::new(
            user_id,
            mcp_id,
            AuditAction::Disconnect,
            FlowOutcome::Completed,
        ));
        Ok(())
    }

    /// Remove every grant the user holds for a server.
    pub async fn disconnect_all(&self, user_id: &str, mcp_id: &str) -> OAuthResult<()> {
        self.tokens
            .delete_all(user_id, mcp_id)
            .await
            .map_err(storage_error)?;
        self.audit.record(AuditEvent::new(
            user_id,
            mcp_id,
            AuditAction::Disconnect,
            FlowOutcome::Completed,
        ));
        Ok(())
    }

    /// Drop grants for all users when a server is deleted.
    pub async fn forget_server(&self, mcp_id: &str) -> OAuthResult<()> {
        self.tokens
            .delete_for_all_users(mcp_id)
            .await
            .map_err(storage_error)?;
        info!(mcp_id = %mcp_id, "[OAuth] Removed grants for all users");
        Ok(())
    }

    /// Delete a pending row. Failure is left to the cleanup loop.
    async fn discard(&self, pending: &PendingAuthorization) {
        if let Err(e) = self.pending.delete(&pending.hashed_state).await {
            warn!(
                "[OAuth] Failed to delete pending state {}: {}",
                pending.short_hash(),
                e
            );
        }
    }

    fn record(
        &self,
        pending: &PendingAuthorization,
        action: AuditAction,
        outcome: FlowOutcome,
        detail: Option<String>,
    ) {
        let mut event = AuditEvent::new(&pending.user_id, &pending.mcp_id, action, outcome);
        event.detail = detail;
        self.audit.record(event);
    }
}
