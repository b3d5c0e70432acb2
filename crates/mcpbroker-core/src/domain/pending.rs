//! In-flight upstream authorizations.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{sha256_hex, OAuthClientConfig};

/// Durable record of an upstream authorization that has not completed yet.
///
/// Keyed by `hashed_state`; the plaintext `state` never leaves this record
/// except inside the redirect sent to the provider. `state`, `verifier`,
/// `config.client_id` and `config.client_secret` hold ciphertext in storage
/// when `encrypted` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub hashed_state: String,
    pub state: String,
    pub verifier: String,
    /// S256 challenge derived from `verifier`, kept to rebuild the auth URL.
    pub code_challenge: String,
    pub user_id: String,
    pub mcp_id: String,
    pub url: String,
    #[serde(default)]
    pub oauth_auth_request_id: String,
    pub config: OAuthClientConfig,
    #[serde(default)]
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
}

impl PendingAuthorization {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        state: &str,
        verifier: &str,
        code_challenge: &str,
        config: OAuthClientConfig,
    ) -> Self {
        Self {
            hashed_state: Self::hash_state(state),
            state: state.to_string(),
            verifier: verifier.to_string(),
            code_challenge: code_challenge.to_string(),
            user_id: user_id.to_string(),
            mcp_id: mcp_id.to_string(),
            url: url.to_string(),
            oauth_auth_request_id: oauth_auth_request_id.to_string(),
            config,
            encrypted: false,
            created_at: Utc::now(),
        }
    }

    /// Lookup key for a presented `state`.
    pub fn hash_state(state: &str) -> String {
        sha256_hex(state)
    }

    /// Whether this entry is older than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.created_at > ttl
    }

    /// Shortened hash for log lines.
    pub fn short_hash(&self) -> &str {
        &self.hashed_state[..self.hashed_state.len().min(12)]
    }
}
