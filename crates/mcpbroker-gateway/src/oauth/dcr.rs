//! Dynamic Client Registration (RFC 7591) and management (RFC 7592)
//!
//! Registers public MCP clients for the outer flow. Each registration
//! returns a `registration_access_token`; only its SHA-256 is stored.

use chrono::Utc;
use mcpbroker_core::{sha256_hex, OAuthClientRepository, RegisteredClient};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::pkce::random_url_token;

const DEFAULT_CLIENT_NAME: &str = "MCP Client";
const SUPPORTED_GRANT_TYPES: &[&str] = &["authorization_code", "refresh_token"];

/// Dynamic Client Registration Request (RFC 7591)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DcrRequest {
    /// Present on RFC 7592 updates; must match the path client id
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub grant_types: Vec<String>,
    #[serde(default)]
    pub response_types: Vec<String>,
    #[serde(default)]
    pub token_endpoint_auth_method: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Dynamic Client Registration Response (RFC 7591)
#[derive(Debug, Clone, Serialize)]
pub struct DcrResponse {
    pub client_id: String,
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
    /// Unix seconds
    pub client_id_issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Only returned when the token is first issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,
    pub registration_client_uri: String,
}

impl DcrResponse {
    pub fn from_client(
        client: &RegisteredClient,
        registration_access_token: Option<String>,
        base_url: &str,
    ) -> Self {
        Self {
            client_id: client.client_id.clone(),
            client_name: client.client_name.clone(),
            redirect_uris: client.redirect_uris.clone(),
            grant_types: client.grant_types.clone(),
            response_types: client.response_types.clone(),
            token_endpoint_auth_method: client.token_endpoint_auth_method.clone(),
            client_id_issued_at: client.created_at.timestamp(),
            scope: client.scope.clone(),
            registration_access_token,
            registration_client_uri: format!(
                "{}/oauth/register/{}",
                base_url.trim_end_matches('/'),
                client.client_id
            ),
        }
    }
}

/// DCR Error Response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DcrError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl DcrError {
    pub fn invalid_redirect_uri(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_redirect_uri".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn invalid_client_metadata(description: impl Into<String>) -> Self {
        Self {
            error: "invalid_client_metadata".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn server_error(description: impl Into<String>) -> Self {
        Self {
            error: "server_error".to_string(),
            error_description: Some(description.into()),
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.error == "server_error"
    }
}

/// Hash stored in place of a registration access token.
pub fn hash_registration_token(token: &str) -> String {
    sha256_hex(token)
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "[::1]" | "::1")
}

/// Validate redirect URIs for public clients (RFC 8252)
///
/// Accepts https, loopback http and private-use (custom) schemes.
/// Fragments are never allowed.
pub fn validate_redirect_uris(uris: &[String]) -> Result<(), DcrError> {
    if uris.is_empty() {
        return Err(DcrError::invalid_redirect_uri(
            "At least one redirect_uri is required",
        ));
    }

    for uri in uris {
        let parsed = Url::parse(uri).map_err(|_| {
            DcrError::invalid_redirect_uri(format!("Redirect URI is not absolute: {}", uri))
        })?;

        if parsed.fragment().is_some() {
            return Err(DcrError::invalid_redirect_uri(
                "Redirect URI must not contain a fragment",
            ));
        }

        let allowed = match parsed.scheme() {
            "https" => true,
            "http" => parsed.host_str().map(is_loopback_host).unwrap_or(false),
            "javascript" | "data" | "file" => false,
            _ => true,
        };

        if !allowed {
            warn!("[DCR] Rejected redirect_uri: {}", uri);
            return Err(DcrError::invalid_redirect_uri(
                "Redirect URI must be https, loopback http or a custom URL scheme",
            ));
        }
        debug!("[DCR] Validated redirect_uri: {}", uri);
    }

    Ok(())
}

struct ClientMetadata {
    client_name: String,
    grant_types: Vec<String>,
    response_types: Vec<String>,
    token_endpoint_auth_method: String,
}

fn validate_metadata(request: &DcrRequest) -> Result<ClientMetadata, DcrError> {
    validate_redirect_uris(&request.redirect_uris)?;

    let token_endpoint_auth_method = request
        .token_endpoint_auth_method
        .clone()
        .unwrap_or_else(|| "none".to_string());
    if token_endpoint_auth_method != "none" {
        return Err(DcrError::invalid_client_metadata(
            "Only public clients (token_endpoint_auth_method=none) are supported",
        ));
    }

    let grant_types = if request.grant_types.is_empty() {
        SUPPORTED_GRANT_TYPES.iter().map(|g| g.to_string()).collect()
    } else {
        request.grant_types.clone()
    };
    if let Some(bad) = grant_types
        .iter()
        .find(|g| !SUPPORTED_GRANT_TYPES.contains(&g.as_str()))
    {
        return Err(DcrError::invalid_client_metadata(format!(
            "Unsupported grant_type: {}",
            bad
        )));
    }

    let response_types = if request.response_types.is_empty() {
        vec!["code".to_string()]
    } else {
        request.response_types.clone()
    };
    if response_types.iter().any(|r| r != "code") {
        return Err(DcrError::invalid_client_metadata(
            "Only response_type=code is supported",
        ));
    }

    let client_name = request
        .client_name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string());

    Ok(ClientMetadata {
        client_name,
        grant_types,
        response_types,
        token_endpoint_auth_method,
    })
}

/// Register a new client against `mcp_id`.
pub async fn process_dcr_request(
    repo: &dyn OAuthClientRepository,
    mcp_id: &str,
    request: DcrRequest,
    base_url: &str,
) -> Result<DcrResponse, DcrError> {
    let metadata = validate_metadata(&request)?;

    let client_id = format!("mcp_{}", Uuid::new_v4().simple());
    let registration_access_token = random_url_token(32);
    let now = Utc::now();
    let client = RegisteredClient {
        client_id: client_id.clone(),
        mcp_id: mcp_id.to_string(),
        client_name: metadata.client_name,
        redirect_uris: request.redirect_uris,
        grant_types: metadata.grant_types,
        response_types: metadata.response_types,
        token_endpoint_auth_method: metadata.token_endpoint_auth_method,
        scope: request.scope,
        registration_access_token_hash: hash_registration_token(&registration_access_token),
        created_at: now,
        updated_at: now,
    };

    repo.save(&client)
        .await
        .map_err(|e| DcrError::server_error(format!("Failed to save client: {}", e)))?;

    info!(
        mcp_id = %mcp_id,
        "[DCR] New client registered: {} ({})",
        client.client_name,
        client_id
    );
    Ok(DcrResponse::from_client(
        &client,
        Some(registration_access_token),
        base_url,
    ))
}

/// Replace the metadata of an existing client (RFC 7592 PUT).
pub async fn process_dcr_update(
    repo: &dyn OAuthClientRepository,
    existing: RegisteredClient,
    request: DcrRequest,
    base_url: &str,
) -> Result<DcrResponse, DcrError> {
    if let Some(client_id) = &request.client_id {
        if *client_id != existing.client_id {
            return Err(DcrError::invalid_client_metadata(
                "client_id does not match the registration",
            ));
        }
    }
    let metadata = validate_metadata(&request)?;

    let client = RegisteredClient {
        client_name: metadata.client_name,
        redirect_uris: request.redirect_uris,
        grant_types: metadata.grant_types,
        response_types: metadata.response_types,
        token_endpoint_auth_method: metadata.token_endpoint_auth_method,
        scope: request.scope,
        updated_at: Utc::now(),
        ..existing
    };

    repo.save(&client)
        .await
        .map_err(|e| DcrError::server_error(format!("Failed to save client: {}", e)))?;

    info!("[DCR] Updated client {}", client.client_id);
    Ok(DcrResponse::from_client(&client, None, base_url))
}
