//! Outer-flow authorization codes.
//!
//! Codes are 32 random bytes, base64url encoded. Only `SHA256(code)` is
//! stored on the outer request; the plaintext exists solely in the redirect.

use std::sync::Arc;

use mcpbroker_core::{
    sha256_hex, AuditAction, AuditEvent, AuditSink, AuthRequestRepository, FlowOutcome,
    OAuthAuthRequest, OAuthError, OAuthResult,
};
use tracing::{error, info};
use url::Url;

use super::pkce::random_url_token;

const CODE_BYTES: usize = 32;

/// Mints codes for outer requests and builds the client redirect.
pub struct AuthCodeIssuer {
    requests: Arc<dyn AuthRequestRepository>,
    audit: Arc<dyn AuditSink>,
}

impl AuthCodeIssuer {
    pub fn new(requests: Arc<dyn AuthRequestRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { requests, audit }
    }

    pub fn mint_code() -> String {
        random_url_token(CODE_BYTES)
    }

    /// Attach a fresh code to `request` and return the client redirect URL.
    ///
    /// If the code cannot be recorded the redirect carries `server_error`
    /// instead. Only an unusable `redirect_uri` is returned as an error.
    pub async fn issue(&self, request: &OAuthAuthRequest) -> OAuthResult<String> {
        let code = Self::mint_code();
        let recorded = self
            .requests
            .set_hashed_auth_code(&request.id, &sha256_hex(&code))
            .await;

        match recorded {
            Ok(true) => {
                info!(
                    mcp_id = %request.mcp_id,
                    user_id = %request.user_id,
                    "[OAuth] Issued authorization code for request {}",
                    request.id
                );
                self.audit.record(AuditEvent::new(
                    &request.user_id,
                    &request.mcp_id,
                    AuditAction::OuterCodeIssued,
                    FlowOutcome::Completed,
                ));
                code_redirect_url(&request.redirect_uri, &code, request.state.as_deref())
            }
            Ok(false) => {
                error!("[OAuth] Auth request {} vanished before code issue", request.id);
                self.failed(request, "authorization request no longer exists")
            }
            Err(e) => {
                error!("[OAuth] Failed to store authorization code: {:#}", e);
                self.failed(request, "failed to store authorization code")
            }
        }
    }

    fn failed(&self, request: &OAuthAuthRequest, detail: &str) -> OAuthResult<String> {
        self.audit.record(
            AuditEvent::new(
                &request.user_id,
                &request.mcp_id,
                AuditAction::OuterCodeIssued,
                FlowOutcome::Failed,
            )
            .with_detail(detail),
        );
        oauth_error_redirect_url(
            &request.redirect_uri,
            "server_error",
            detail,
            request.state.as_deref(),
        )
    }
}

fn parse_redirect(redirect_uri: &str) -> OAuthResult<Url> {
    Url::parse(redirect_uri)
        .map_err(|e| OAuthError::invalid_request(format!("invalid redirect_uri: {}", e)))
}

fn code_redirect_url(redirect_uri: &str, code: &str, state: Option<&str>) -> OAuthResult<String> {
    let mut url = parse_redirect(redirect_uri)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("code", code);
        if let Some(state) = state.filter(|s| !s.is_empty()) {
            query.append_pair("state", state);
        }
    }
    Ok(url.to_string())
}

/// Redirect to a client with standard OAuth error parameters.
pub fn oauth_error_redirect_url(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> OAuthResult<String> {
    let mut url = parse_redirect(redirect_uri)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", error);
        if !description.is_empty() {
            query.append_pair("error_description", description);
        }
        if let Some(state) = state.filter(|s| !s.is_empty()) {
            query.append_pair("state", state);
        }
    }
    Ok(url.to_string())
}
