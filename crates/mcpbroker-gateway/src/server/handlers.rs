//! HTTP handlers for the gateway server

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    Form,
};
use chrono::Duration;
use mcpbroker_core::{
    sha256_hex, McpServer, OAuthAuthRequest, OAuthError, OAuthResult, RegisteredClient,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::error::{found, oauth_error_redirect, token_error, ApiError, ErrorBody};
use super::ServiceContainer;
use crate::auth::{
    create_access_token, create_refresh_token, validate_token, AuthenticatedUser, TokenKind,
    TokenSubject,
};
use crate::oauth::{
    hash_registration_token, process_dcr_request, process_dcr_update, CallbackParams,
    CompositeAuthStatus, DcrError, DcrRequest, DcrResponse, PkceChallenge, NO_OUTER_REQUEST,
};

/// Lifetime of outer-flow access tokens
const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<ServiceContainer>,
    pub base_url: String,
    /// Header carrying the authenticated user id
    pub user_header: String,
    pub token_secret: Arc<Zeroizing<Vec<u8>>>,
    /// TTL for pending and outer authorization requests
    pub request_ttl: Duration,
}

impl AppState {
    fn deps(&self) -> &super::GatewayDependencies {
        &self.services.dependencies
    }
}

// ============================================================================
// Health and metadata
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

pub async fn health() -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// OAuth Authorization Server Metadata (RFC 8414)
#[derive(Serialize)]
pub struct OAuthServerMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub registration_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
}

/// Metadata for the outer flow of one MCP server
pub async fn oauth_metadata(
    State(state): State<AppState>,
    Path(mcp_id): Path<String>,
) -> Result<Json<OAuthServerMetadata>, ApiError> {
    state.deps().catalog.server_for_action(&mcp_id).await?;

    let base = &state.base_url;
    let id = urlencoding::encode(&mcp_id);
    Ok(Json(OAuthServerMetadata {
        issuer: base.to_string(),
        authorization_endpoint: format!("{}/oauth/authorize/{}", base, id),
        token_endpoint: format!("{}/oauth/token/{}", base, id),
        registration_endpoint: format!("{}/oauth/register/{}", base, id),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ],
        code_challenge_methods_supported: vec![PkceChallenge::METHOD.to_string()],
        token_endpoint_auth_methods_supported: vec!["none".to_string()],
    }))
}

// ============================================================================
// Outer authorization
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    #[serde(default)]
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Outer authorization endpoint
///
/// Client and redirect URI problems are answered directly; everything
/// after that goes back to the client as an OAuth error redirect.
pub async fn oauth_authorize(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(mcp_id): Path<String>,
    Query(params): Query<AuthorizeParams>,
) -> Response {
    info!(
        mcp_id = %mcp_id,
        user_id = %user_id,
        "[OAuth] Authorization request from client {}",
        params.client_id
    );

    let deps = state.deps();
    let server = match deps.catalog.server_for_action(&mcp_id).await {
        Ok(server) => server,
        Err(e) => return ApiError(e).into_response(),
    };

    let client = match deps.client_repo.get(&params.client_id).await {
        Ok(Some(client)) if client.mcp_id == mcp_id => client,
        Ok(_) => {
            warn!("[OAuth] Unknown client {} for {}", params.client_id, mcp_id);
            return ApiError(OAuthError::invalid_request("unknown client_id")).into_response();
        }
        Err(e) => return ApiError(OAuthError::Storage(e)).into_response(),
    };
    if !client.allows_redirect(&params.redirect_uri) {
        warn!("[OAuth] Redirect URI not registered for {}", client.client_id);
        return ApiError(OAuthError::invalid_request(
            "redirect_uri not registered for this client",
        ))
        .into_response();
    }

    let client_state = params.state.as_deref();
    if params.response_type != "code" {
        return oauth_error_redirect_with(
            &params.redirect_uri,
            "unsupported_response_type",
            "Only response_type=code is supported",
            client_state,
        );
    }
    let Some(code_challenge) = params.code_challenge.clone().filter(|c| !c.is_empty()) else {
        return oauth_error_redirect_with(
            &params.redirect_uri,
            "invalid_request",
            "code_challenge is required",
            client_state,
        );
    };
    let method = params
        .code_challenge_method
        .clone()
        .unwrap_or_else(|| PkceChallenge::METHOD.to_string());
    if method != PkceChallenge::METHOD {
        return oauth_error_redirect_with(
            &params.redirect_uri,
            "invalid_request",
            "Only S256 code_challenge_method is supported",
            client_state,
        );
    }

    let mut request = OAuthAuthRequest::new(
        Uuid::new_v4().to_string(),
        &mcp_id,
        &user_id,
        &client.client_id,
        &params.redirect_uri,
    );
    request.state = params.state.clone();
    request.code_challenge = Some(code_challenge);
    request.code_challenge_method = Some(method);
    request.scope = params.scope.clone();

    if let Err(e) = deps.auth_request_repo.create(&request).await {
        return oauth_error_redirect(&request.redirect_uri, OAuthError::Storage(e), client_state);
    }

    if server.is_composite() {
        let location = format!(
            "{}/mcp/{}/composite-auth?oauth_auth_request={}",
            state.base_url,
            urlencoding::encode(&mcp_id),
            urlencoding::encode(&request.id)
        );
        return found(&location);
    }

    match authorize_direct(&state, &server, &request).await {
        Ok(location) => found(&location),
        Err(e) => oauth_error_redirect(&request.redirect_uri, e, client_state),
    }
}

/// Upstream authorization URL for a plain server, or the outer-client
/// redirect when the user already holds a grant.
async fn authorize_direct(
    state: &AppState,
    server: &McpServer,
    request: &OAuthAuthRequest,
) -> OAuthResult<String> {
    let config = state.deps().catalog.server_config_for_action(server).await?;
    let redirect_url = format!(
        "{}/oauth/callback/{}/{}",
        state.base_url,
        urlencoding::encode(&request.id),
        urlencoding::encode(&server.id)
    );

    let auth_url = state
        .services
        .checker
        .check_for_mcp_auth(server, &config, &request.user_id, &request.id, &redirect_url)
        .await?;
    match auth_url {
        Some(auth_url) => Ok(auth_url),
        None => state.services.issuer.issue(request).await,
    }
}

fn oauth_error_redirect_with(
    redirect_uri: &str,
    error: &str,
    description: &str,
    state: Option<&str>,
) -> Response {
    match crate::oauth::oauth_error_redirect_url(redirect_uri, error, description, state) {
        Ok(url) => found(&url),
        Err(e) => ApiError(e).into_response(),
    }
}

// ============================================================================
// Upstream callbacks
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: String,
}

impl From<CallbackQuery> for CallbackParams {
    fn from(query: CallbackQuery) -> Self {
        Self {
            state: query.state,
            code: query.code,
            error: query.error,
            error_description: query.error_description,
            mcp_id: String::new(),
        }
    }
}

fn outer_request_id(segment: &str) -> Option<&str> {
    (!segment.is_empty() && segment != NO_OUTER_REQUEST).then_some(segment)
}

fn callback_params(query: CallbackQuery, mcp_id: String) -> CallbackParams {
    CallbackParams {
        mcp_id,
        ..query.into()
    }
}

/// Send a callback failure to the outer client if there is one.
async fn callback_failure(state: &AppState, outer: Option<&str>, err: OAuthError) -> Response {
    if let Some(id) = outer {
        if let Ok(Some(request)) = state.deps().auth_request_repo.get(id).await {
            return oauth_error_redirect(&request.redirect_uri, err, request.state.as_deref());
        }
    }
    ApiError(err).into_response()
}

/// Upstream redirect target for a directly authorized server
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path((oauth_auth_request, mcp_id)): Path<(String, String)>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let outer = outer_request_id(&oauth_auth_request);
    let params = callback_params(query, mcp_id);
    let outcome = match state.services.exchanger.callback(&params).await {
        Ok(outcome) => outcome,
        Err(e) => return callback_failure(&state, outer, e).await,
    };

    let Some(outer_id) = outer_request_id(&outcome.oauth_auth_request_id) else {
        return Json(serde_json::json!({
            "status": "authorized",
            "mcpServerID": outcome.mcp_id,
        }))
        .into_response();
    };

    let request = match state.deps().auth_request_repo.get(outer_id).await {
        Ok(Some(request)) => request,
        Ok(None) => {
            return ApiError(OAuthError::not_found("authorization request")).into_response()
        }
        Err(e) => return ApiError(OAuthError::Storage(e)).into_response(),
    };
    if request.is_expired(state.request_ttl) {
        return oauth_error_redirect(
            &request.redirect_uri,
            OAuthError::ExpiredState,
            request.state.as_deref(),
        );
    }

    match state.services.issuer.issue(&request).await {
        Ok(location) => found(&location),
        Err(e) => ApiError(e).into_response(),
    }
}

/// Upstream redirect target for a composite component
pub async fn oauth_mcp_callback(
    State(state): State<AppState>,
    Path((oauth_auth_request, component_id)): Path<(String, String)>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let outer = outer_request_id(&oauth_auth_request);
    let params = callback_params(query, component_id);
    let outcome = match state.services.exchanger.callback(&params).await {
        Ok(outcome) => outcome,
        Err(e) => return callback_failure(&state, outer, e).await,
    };
    debug!(mcp_id = %outcome.mcp_id, "[Composite] Component authorized");

    let component = match state.deps().catalog.server_for_action(&outcome.mcp_id).await {
        Ok(component) => component,
        Err(e) => return ApiError(e).into_response(),
    };
    let Some(composite_id) = component.composite_name.filter(|c| !c.is_empty()) else {
        return Json(serde_json::json!({
            "status": "authorized",
            "mcpServerID": outcome.mcp_id,
        }))
        .into_response();
    };

    let mut location = format!(
        "{}/mcp/{}/composite-auth",
        state.base_url,
        urlencoding::encode(&composite_id)
    );
    if let Some(outer_id) = outer_request_id(&outcome.oauth_auth_request_id) {
        location.push_str("?oauth_auth_request=");
        location.push_str(&urlencoding::encode(outer_id));
    }
    found(&location)
}

// ============================================================================
// Composite status
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CompositeAuthQuery {
    pub oauth_auth_request: Option<String>,
}

/// Outstanding components as JSON, or the outer-client redirect once done
pub async fn composite_auth(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(mcp_id): Path<String>,
    Query(query): Query<CompositeAuthQuery>,
) -> Response {
    let status = state
        .services
        .coordinator
        .check_composite_auth(&mcp_id, &user_id, query.oauth_auth_request.as_deref())
        .await;

    match status {
        Ok(CompositeAuthStatus::Pending(components)) => Json(components).into_response(),
        Ok(CompositeAuthStatus::Complete { redirect_url }) => found(&redirect_url),
        Ok(CompositeAuthStatus::Satisfied) => Json(Vec::<()>::new()).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

// ============================================================================
// Token endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponseBody {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

type TokenResult = Result<Json<TokenResponseBody>, (StatusCode, Json<ErrorBody>)>;

/// Token endpoint for the outer flow (authorization_code and refresh_token)
pub async fn oauth_token(
    State(state): State<AppState>,
    Path(mcp_id): Path<String>,
    Form(request): Form<TokenRequest>,
) -> TokenResult {
    info!(
        mcp_id = %mcp_id,
        "[OAuth] Token request: grant_type={}, client_id={:?}",
        request.grant_type,
        request.client_id
    );

    match request.grant_type.as_str() {
        "authorization_code" => exchange_authorization_code(&state, &mcp_id, request).await,
        "refresh_token" => exchange_refresh_token(&state, &mcp_id, request).await,
        other => {
            warn!("[OAuth] Unsupported grant_type: {}", other);
            Err(token_error(
                "unsupported_grant_type",
                "Only authorization_code and refresh_token are supported",
            ))
        }
    }
}

async fn exchange_authorization_code(
    state: &AppState,
    mcp_id: &str,
    request: TokenRequest,
) -> TokenResult {
    let Some(code) = request.code.as_deref().filter(|c| !c.is_empty()) else {
        return Err(token_error("invalid_request", "Missing authorization code"));
    };
    let Some(code_verifier) = request.code_verifier.as_deref() else {
        return Err(token_error("invalid_request", "Missing code_verifier"));
    };

    let deps = state.deps();
    let outer = deps
        .auth_request_repo
        .consume_auth_code(mcp_id, &sha256_hex(code))
        .await
        .map_err(|e| {
            warn!("[OAuth] Failed to redeem code: {:#}", e);
            token_error("server_error", "Failed to redeem authorization code")
        })?;
    let Some(outer) = outer else {
        warn!("[OAuth] Unknown or already redeemed authorization code");
        return Err(token_error(
            "invalid_grant",
            "Authorization code is invalid or expired",
        ));
    };

    // The code is spent either way; the outer request is finished
    if let Err(e) = deps.auth_request_repo.delete(&outer.id).await {
        warn!("[OAuth] Failed to delete auth request {}: {:#}", outer.id, e);
    }

    if outer.is_expired(state.request_ttl) {
        return Err(token_error("invalid_grant", "Authorization code expired"));
    }
    if request.client_id.as_deref().is_some_and(|id| id != outer.client_id) {
        return Err(token_error("invalid_grant", "Client ID mismatch"));
    }
    if request
        .redirect_uri
        .as_deref()
        .is_some_and(|uri| uri != outer.redirect_uri)
    {
        return Err(token_error("invalid_grant", "Redirect URI mismatch"));
    }
    if let Some(challenge) = outer.code_challenge.as_deref() {
        if !PkceChallenge::verify(
            code_verifier,
            challenge,
            outer.code_challenge_method.as_deref(),
        ) {
            warn!("[OAuth] PKCE verification failed");
            return Err(token_error("invalid_grant", "PKCE verification failed"));
        }
    }

    let subject = TokenSubject {
        mcp_id,
        user_id: &outer.user_id,
        client_id: &outer.client_id,
        scope: outer.scope.as_deref(),
    };
    let body = issue_tokens(state, &subject)?;
    info!(
        mcp_id = %mcp_id,
        user_id = %outer.user_id,
        "[OAuth] Issued tokens for client {}",
        outer.client_id
    );
    Ok(body)
}

async fn exchange_refresh_token(
    state: &AppState,
    mcp_id: &str,
    request: TokenRequest,
) -> TokenResult {
    let Some(refresh_token) = request.refresh_token.as_deref() else {
        return Err(token_error("invalid_request", "Missing refresh_token"));
    };

    let claims = validate_token(refresh_token, state.token_secret.as_slice())
        .filter(|c| c.token_type == TokenKind::Refresh && c.mcp_id == mcp_id)
        .ok_or_else(|| token_error("invalid_grant", "Refresh token is invalid or expired"))?;

    if request.client_id.as_deref().is_some_and(|id| id != claims.client_id) {
        return Err(token_error("invalid_grant", "Client ID mismatch"));
    }

    let client = state
        .deps()
        .client_repo
        .get(&claims.client_id)
        .await
        .map_err(|e| {
            warn!("[OAuth] Failed to load client: {:#}", e);
            token_error("server_error", "Failed to load client")
        })?;
    if client.is_none() {
        return Err(token_error("invalid_grant", "Client is no longer registered"));
    }

    let subject = TokenSubject {
        mcp_id,
        user_id: &claims.user_id,
        client_id: &claims.client_id,
        scope: claims.scope.as_deref(),
    };
    issue_tokens(state, &subject)
}

fn issue_tokens(state: &AppState, subject: &TokenSubject<'_>) -> TokenResult {
    let secret = state.token_secret.as_slice();
    let signed = create_access_token(subject, ACCESS_TOKEN_TTL_SECS, secret)
        .and_then(|access| Ok((access, create_refresh_token(subject, secret)?)));

    match signed {
        Ok((access_token, refresh_token)) => Ok(Json(TokenResponseBody {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_TTL_SECS,
            refresh_token: Some(refresh_token),
            scope: subject.scope.map(str::to_string),
        })),
        Err(e) => {
            warn!("[OAuth] Failed to sign tokens: {:#}", e);
            Err(token_error("server_error", "Failed to issue tokens"))
        }
    }
}

// ============================================================================
// Dynamic client registration
// ============================================================================

type DcrResult<T> = Result<T, (StatusCode, Json<DcrError>)>;

fn dcr_failure(error: DcrError) -> (StatusCode, Json<DcrError>) {
    let status = if error.is_server_error() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::BAD_REQUEST
    };
    (status, Json(error))
}

fn dcr_unauthorized() -> (StatusCode, Json<DcrError>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(DcrError {
            error: "invalid_token".to_string(),
            error_description: Some("Registration access token is invalid".to_string()),
        }),
    )
}

/// POST /oauth/register/{mcp_id}
pub async fn oauth_register(
    State(state): State<AppState>,
    Path(mcp_id): Path<String>,
    Json(request): Json<DcrRequest>,
) -> DcrResult<(StatusCode, Json<DcrResponse>)> {
    if let Err(e) = state.deps().catalog.server_for_action(&mcp_id).await {
        let status = match e {
            OAuthError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        return Err((
            status,
            Json(DcrError::invalid_client_metadata(format!(
                "Unknown MCP server {}",
                mcp_id
            ))),
        ));
    }

    match process_dcr_request(
        state.deps().client_repo.as_ref(),
        &mcp_id,
        request,
        &state.base_url,
    )
    .await
    {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(error) => {
            warn!(
                "[DCR] Registration failed: {} - {:?}",
                error.error, error.error_description
            );
            Err(dcr_failure(error))
        }
    }
}

/// Resolve the client named in the path and check its registration token.
async fn registered_client(
    state: &AppState,
    client_id: &str,
    headers: &HeaderMap,
) -> DcrResult<RegisteredClient> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(dcr_unauthorized)?;

    let client = state
        .deps()
        .client_repo
        .get(client_id)
        .await
        .map_err(|e| dcr_failure(DcrError::server_error(e.to_string())))?
        .ok_or_else(dcr_unauthorized)?;

    if client.registration_access_token_hash != hash_registration_token(token) {
        warn!("[DCR] Bad registration token for {}", client_id);
        return Err(dcr_unauthorized());
    }
    Ok(client)
}

/// GET /oauth/register/{client_id}
pub async fn oauth_get_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> DcrResult<Json<DcrResponse>> {
    let client = registered_client(&state, &client_id, &headers).await?;
    Ok(Json(DcrResponse::from_client(&client, None, &state.base_url)))
}

/// PUT /oauth/register/{client_id}
pub async fn oauth_update_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DcrRequest>,
) -> DcrResult<Json<DcrResponse>> {
    let client = registered_client(&state, &client_id, &headers).await?;
    process_dcr_update(
        state.deps().client_repo.as_ref(),
        client,
        request,
        &state.base_url,
    )
    .await
    .map(Json)
    .map_err(dcr_failure)
}

/// DELETE /oauth/register/{client_id}
pub async fn oauth_delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> DcrResult<StatusCode> {
    registered_client(&state, &client_id, &headers).await?;
    state
        .deps()
        .client_repo
        .delete(&client_id)
        .await
        .map_err(|e| dcr_failure(DcrError::server_error(e.to_string())))?;
    info!("[DCR] Deleted client {}", client_id);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Grants
// ============================================================================

/// DELETE /mcp/{mcp_id}/oauth
///
/// Drops the user's grants for the server, and for each component when the
/// server is a composite.
pub async fn disconnect(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(mcp_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let catalog = &state.deps().catalog;
    let server = catalog.server_for_action(&mcp_id).await?;
    let exchanger = &state.services.exchanger;

    exchanger.disconnect_all(&user_id, &server.id).await?;
    if server.is_composite() {
        for component in catalog.component_servers(&server).await? {
            exchanger.disconnect_all(&user_id, &component.id).await?;
        }
    }

    info!(mcp_id = %mcp_id, user_id = %user_id, "[OAuth] Disconnected");
    Ok(StatusCode::NO_CONTENT)
}
