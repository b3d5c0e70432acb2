//! Error taxonomy for the broker.
//!
//! Callers branch on the variant, never on message content.

use thiserror::Error;

/// Result type for flow-level operations.
pub type OAuthResult<T> = Result<T, OAuthError>;

/// Tagged error variants surfaced by the OAuth flows.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The requested record does not exist (or was already consumed).
    #[error("not found: {0}")]
    NotFound(String),

    /// A pending authorization outlived its TTL.
    #[error("authorization state expired")]
    ExpiredState,

    /// The upstream code-for-token (or refresh) exchange failed.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// A secret field could not be encrypted or decrypted.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// No usable grant exists; the user must authorize again.
    #[error("re-authorization required for MCP server {mcp_id}")]
    ReauthRequired { mcp_id: String },

    /// The upstream provider redirected back with an `error` parameter.
    #[error("upstream authorization failed: {error}{}", description_suffix(.description))]
    UpstreamAuthorization {
        error: String,
        description: Option<String>,
    },

    /// The request is malformed or violates a protocol rule.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The durable store failed.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// Invariant violation inside the broker.
    #[error("internal error: {0}")]
    Internal(String),
}

fn description_suffix(description: &Option<String>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!(": {}", d),
        _ => String::new(),
    }
}

impl OAuthError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// The standard OAuth 2.0 error code for this variant.
    pub fn oauth_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::ExpiredState => "invalid_request",
            Self::UpstreamAuthorization { .. } => "access_denied",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ReauthRequired { .. } => "invalid_token",
            Self::ExchangeFailed(_) => "temporarily_unavailable",
            Self::Encryption(_) | Self::Storage(_) | Self::Internal(_) => "server_error",
        }
    }

    /// Whether the error came from the protocol rather than from I/O.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::ExpiredState
                | Self::UpstreamAuthorization { .. }
                | Self::InvalidRequest(_)
        )
    }
}
