//! Outer (first-level) authorization requests.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// An authorization request from an MCP client to the broker itself.
///
/// Created at `/oauth/authorize`, completed when the broker hands the client
/// a one-time code (stored only as `hashed_auth_code`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthAuthRequest {
    pub id: String,
    pub mcp_id: String,
    pub user_id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
    pub hashed_auth_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OAuthAuthRequest {
    pub fn new(
        id: impl Into<String>,
        mcp_id: &str,
        user_id: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> Self {
        Self {
            id: id.into(),
            mcp_id: mcp_id.to_string(),
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            state: None,
            code_challenge: None,
            code_challenge_method: None,
            scope: None,
            hashed_auth_code: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() - self.created_at > ttl
    }
}
