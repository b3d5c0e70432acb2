//! OAuth clients registered with the broker (RFC 7591).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A dynamically registered public client of the outer flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    /// MCP server the client registered against.
    pub mcp_id: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    pub scope: Option<String>,
    /// SHA-256 of the RFC 7592 registration access token.
    pub registration_access_token_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RegisteredClient {
    /// Exact-match redirect URI check.
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }
}
