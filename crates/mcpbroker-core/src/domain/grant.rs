//! OAuth grants held on behalf of a user for an upstream MCP server.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How client credentials are presented at the upstream token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// Try HTTP Basic first, fall back to form params.
    #[default]
    AutoDetect,
    /// `client_id` / `client_secret` in the form body.
    InParams,
    /// HTTP Basic authorization header.
    InHeader,
}

impl AuthStyle {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::AutoDetect => 0,
            Self::InParams => 1,
            Self::InHeader => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => Self::InParams,
            2 => Self::InHeader,
            _ => Self::AutoDetect,
        }
    }
}

/// Upstream authorization server endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OAuthEndpoint {
    pub auth_url: String,
    pub token_url: String,
    #[serde(default)]
    pub auth_style: AuthStyle,
}

/// OAuth2 client configuration used against one upstream provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub endpoint: OAuthEndpoint,
    /// Where the upstream provider sends the user back to (our callback).
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OAuthClientConfig {
    /// Scopes joined with single spaces, as sent on the wire and stored.
    pub fn scopes_joined(&self) -> String {
        self.scopes.join(" ")
    }

    pub fn split_scopes(scopes: &str) -> Vec<String> {
        scopes.split_whitespace().map(String::from).collect()
    }
}

/// Token material returned by an upstream token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpstreamToken {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: String,
    pub expiry: Option<DateTime<Utc>>,
    /// Provider-reported lifetime in seconds (0 when not reported).
    pub expires_in: i64,
}

/// A completed OAuth grant for (MCP server, user, URL).
///
/// `access_token`, `refresh_token`, `client_id` and `client_secret` hold
/// base64 ciphertext in storage when `encrypted` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthGrant {
    pub mcp_id: String,
    pub user_id: String,
    pub url: String,
    /// Outer first-level request this grant was obtained under (empty if none).
    #[serde(default)]
    pub oauth_auth_request_id: String,

    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_in: i64,

    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub endpoint: OAuthEndpoint,
    pub redirect_url: String,
    /// Space-joined scopes.
    #[serde(default)]
    pub scopes: String,

    #[serde(default)]
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthGrant {
    /// Build a grant from a successful upstream exchange.
    pub fn from_exchange(
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        config: &OAuthClientConfig,
        token: &UpstreamToken,
    ) -> Self {
        let now = Utc::now();
        let expiry = token.expiry.or_else(|| {
            (token.expires_in > 0).then(|| now + Duration::seconds(token.expires_in))
        });

        Self {
            mcp_id: mcp_id.to_string(),
            user_id: user_id.to_string(),
            url: url.to_string(),
            oauth_auth_request_id: oauth_auth_request_id.to_string(),
            access_token: token.access_token.clone(),
            token_type: token.token_type.clone(),
            refresh_token: token.refresh_token.clone(),
            expiry,
            expires_in: token.expires_in,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            endpoint: config.endpoint.clone(),
            redirect_url: config.redirect_url.clone(),
            scopes: config.scopes_joined(),
            encrypted: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Client configuration this grant was obtained with (used for refresh).
    pub fn client_config(&self) -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            endpoint: self.endpoint.clone(),
            redirect_url: self.redirect_url.clone(),
            scopes: OAuthClientConfig::split_scopes(&self.scopes),
        }
    }

    /// Check if the access token is expired. No expiry means it never expires.
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() >= expiry,
            None => false,
        }
    }

    /// Check if the access token expires within `buffer_seconds`.
    pub fn expires_soon(&self, buffer_seconds: i64) -> bool {
        match self.expiry {
            Some(expiry) => Utc::now() + Duration::seconds(buffer_seconds) >= expiry,
            None => false,
        }
    }

    pub fn can_refresh(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Apply a refreshed token, keeping the old refresh token if none came back.
    pub fn apply_refresh(&mut self, token: &UpstreamToken) {
        let now = Utc::now();
        self.access_token = token.access_token.clone();
        if !token.token_type.is_empty() {
            self.token_type = token.token_type.clone();
        }
        if !token.refresh_token.is_empty() {
            self.refresh_token = token.refresh_token.clone();
        }
        self.expires_in = token.expires_in;
        self.expiry = token.expiry.or_else(|| {
            (token.expires_in > 0).then(|| now + Duration::seconds(token.expires_in))
        });
        self.updated_at = now;
    }
}
