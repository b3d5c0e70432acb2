//! OAuth Authorization Server discovery
//!
//! Fetches RFC 8414 metadata (falling back to OpenID Connect discovery) for
//! remote servers whose OAuth settings do not name their endpoints.

use mcpbroker_core::{
    OAuthClientConfig, OAuthEndpoint, OAuthError, OAuthResult, UpstreamOAuthSettings,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Authorization server metadata (the fields the broker uses).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthServerMetadata {
    #[serde(default)]
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub registration_endpoint: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

impl AuthServerMetadata {
    /// Check if PKCE S256 is advertised
    pub fn supports_pkce(&self) -> bool {
        self.code_challenge_methods_supported
            .iter()
            .any(|m| m == "S256")
    }
}

/// OAuth discovery client
#[derive(Clone)]
pub struct OAuthDiscovery {
    http_client: reqwest::Client,
}

impl OAuthDiscovery {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Fetch metadata for an issuer.
    ///
    /// Tries `/.well-known/oauth-authorization-server` first, then
    /// `/.well-known/openid-configuration`.
    pub async fn fetch(&self, issuer: &str) -> OAuthResult<AuthServerMetadata> {
        let base = issuer.trim_end_matches('/');
        let oauth_url = format!("{}/.well-known/oauth-authorization-server", base);
        debug!("[OAuth] Trying AS metadata discovery: {}", oauth_url);

        match self.fetch_metadata(&oauth_url).await {
            Ok(metadata) => {
                info!("[OAuth] AS metadata discovery successful for {}", issuer);
                return Ok(metadata);
            }
            Err(e) => {
                debug!("[OAuth] AS metadata discovery failed: {}, trying OIDC", e);
            }
        }

        let oidc_url = format!("{}/.well-known/openid-configuration", base);
        match self.fetch_metadata(&oidc_url).await {
            Ok(metadata) => {
                info!("[OAuth] OIDC discovery successful for {}", issuer);
                Ok(metadata)
            }
            Err(e) => Err(OAuthError::ExchangeFailed(format!(
                "OAuth discovery failed for {}: {}",
                issuer, e
            ))),
        }
    }

    async fn fetch_metadata(&self, url: &str) -> anyhow::Result<AuthServerMetadata> {
        let response = self
            .http_client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Discovery request failed: HTTP {}", response.status());
        }

        Ok(response.json().await?)
    }

    /// Build the upstream client configuration for a remote server.
    ///
    /// Endpoints named in `settings` win; otherwise they are discovered from
    /// `settings.issuer` or, failing that, the origin of `server_url`.
    pub async fn client_config(
        &self,
        settings: &UpstreamOAuthSettings,
        server_url: &str,
        redirect_url: &str,
    ) -> OAuthResult<OAuthClientConfig> {
        let (auth_url, token_url) = match (&settings.auth_url, &settings.token_url) {
            (Some(auth), Some(token)) if !auth.is_empty() && !token.is_empty() => {
                (auth.clone(), token.clone())
            }
            _ => {
                let issuer = match &settings.issuer {
                    Some(issuer) if !issuer.is_empty() => issuer.clone(),
                    _ => origin_of(server_url)?,
                };
                let metadata = self.fetch(&issuer).await?;
                (
                    settings
                        .auth_url
                        .clone()
                        .filter(|u| !u.is_empty())
                        .unwrap_or(metadata.authorization_endpoint),
                    settings
                        .token_url
                        .clone()
                        .filter(|u| !u.is_empty())
                        .unwrap_or(metadata.token_endpoint),
                )
            }
        };

        Ok(OAuthClientConfig {
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            endpoint: OAuthEndpoint {
                auth_url,
                token_url,
                auth_style: settings.auth_style,
            },
            redirect_url: redirect_url.to_string(),
            scopes: settings.scopes.clone(),
        })
    }
}

/// `scheme://host[:port]` of a URL.
pub fn origin_of(url: &str) -> OAuthResult<String> {
    let parsed = Url::parse(url)
        .map_err(|e| OAuthError::invalid_request(format!("invalid server URL {}: {}", url, e)))?;
    Ok(parsed.origin().ascii_serialization())
}
