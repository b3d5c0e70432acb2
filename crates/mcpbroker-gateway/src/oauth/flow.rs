//! Upstream OAuth client
//!
//! Authorization-code + PKCE against third-party providers: building the
//! authorization URL, exchanging the code, and refreshing tokens.

use mcpbroker_core::{AuthStyle, OAuthClientConfig, OAuthError, OAuthResult, UpstreamToken};
use reqwest::StatusCode;
use tracing::{debug, info, warn};
use url::Url;

use super::token::TokenResponse;

/// Hosts that reject the RFC 8707 `resource` parameter.
const RESOURCE_PARAM_DENYLIST: &[&str] = &["login.microsoftonline.com"];

/// Longest provider error body carried into an error message.
const MAX_ERROR_BODY: usize = 512;

/// Build the authorization URL the user is sent to.
pub fn authorization_url(
    config: &OAuthClientConfig,
    state: &str,
    code_challenge: &str,
    resource: &str,
) -> OAuthResult<String> {
    let mut url = Url::parse(&config.endpoint.auth_url).map_err(|e| {
        OAuthError::Internal(format!(
            "invalid authorization URL {}: {}",
            config.endpoint.auth_url, e
        ))
    })?;

    let send_resource = !resource.is_empty()
        && !url
            .host_str()
            .map(|host| RESOURCE_PARAM_DENYLIST.contains(&host))
            .unwrap_or(false);

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", &config.redirect_url);
        if !config.scopes.is_empty() {
            query.append_pair("scope", &config.scopes_joined());
        }
        query.append_pair("state", state);
        query.append_pair("code_challenge", code_challenge);
        query.append_pair("code_challenge_method", "S256");
        query.append_pair("access_type", "offline");
        if send_resource {
            query.append_pair("resource", resource);
        }
    }

    Ok(url.to_string())
}

/// HTTP client for upstream token endpoints.
#[derive(Clone)]
pub struct UpstreamOAuthClient {
    http_client: reqwest::Client,
}

impl UpstreamOAuthClient {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Exchange an authorization code for tokens, presenting `verifier`.
    pub async fn exchange_code(
        &self,
        config: &OAuthClientConfig,
        code: &str,
        verifier: &str,
    ) -> OAuthResult<UpstreamToken> {
        info!("[OAuth] Exchanging authorization code at {}", config.endpoint.token_url);

        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", config.redirect_url.as_str()),
            ("code_verifier", verifier),
        ];
        let token = self.token_request(config, &params).await?;

        info!("[OAuth] Token exchange successful");
        Ok(token)
    }

    /// Refresh an access token. The previous refresh token is kept when the
    /// provider does not rotate it.
    pub async fn refresh(
        &self,
        config: &OAuthClientConfig,
        refresh_token: &str,
    ) -> OAuthResult<UpstreamToken> {
        info!("[OAuth] Refreshing access token at {}", config.endpoint.token_url);

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        let mut token = self.token_request(config, &params).await?;
        if token.refresh_token.is_empty() {
            token.refresh_token = refresh_token.to_string();
        }

        info!("[OAuth] Token refresh successful");
        Ok(token)
    }

    async fn token_request(
        &self,
        config: &OAuthClientConfig,
        params: &[(&str, &str)],
    ) -> OAuthResult<UpstreamToken> {
        let result = match config.endpoint.auth_style {
            AuthStyle::InParams => self.post_token(config, params, AuthStyle::InParams).await,
            AuthStyle::InHeader => self.post_token(config, params, AuthStyle::InHeader).await,
            AuthStyle::AutoDetect => {
                match self.post_token(config, params, AuthStyle::InHeader).await {
                    Err(e) if e.is_credentials_rejection() => {
                        debug!("[OAuth] Header credentials rejected, retrying with form params");
                        self.post_token(config, params, AuthStyle::InParams).await
                    }
                    other => other,
                }
            }
        };
        result.map_err(OAuthError::from)
    }

    async fn post_token(
        &self,
        config: &OAuthClientConfig,
        params: &[(&str, &str)],
        style: AuthStyle,
    ) -> Result<UpstreamToken, TokenRequestError> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        let mut request = self
            .http_client
            .post(&config.endpoint.token_url)
            .header("Accept", "application/json");

        if style == AuthStyle::InHeader {
            // RFC 6749 2.3.1: credentials are form-encoded before Basic encoding
            request = request.basic_auth(
                urlencoding::encode(&config.client_id),
                Some(urlencoding::encode(&config.client_secret)),
            );
        } else {
            form.push(("client_id", config.client_id.as_str()));
            if !config.client_secret.is_empty() {
                form.push(("client_secret", config.client_secret.as_str()));
            }
        }

        let response = request
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenRequestError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenRequestError::Transport(e.to_string()))?;

        if !status.is_success() {
            warn!("[OAuth] Token endpoint returned HTTP {}", status);
            return Err(TokenRequestError::Status {
                status,
                body: truncate(&body),
            });
        }

        let parsed = parse_token_body(&body).ok_or_else(|| TokenRequestError::Malformed {
            body: truncate(&body),
        })?;
        if let Some(message) = parsed.error_message() {
            return Err(TokenRequestError::Provider(message));
        }
        if parsed.access_token.is_empty() {
            return Err(TokenRequestError::Provider(
                "response did not include an access_token".to_string(),
            ));
        }

        Ok(parsed.into())
    }
}

/// Parse a token endpoint body as JSON, falling back to form encoding.
fn parse_token_body(body: &str) -> Option<TokenResponse> {
    if let Ok(parsed) = serde_json::from_str::<TokenResponse>(body) {
        return Some(parsed);
    }

    let mut response = TokenResponse::default();
    let mut seen = false;
    for (key, value) in url::form_urlencoded::parse(body.as_bytes()) {
        seen = true;
        let value = value.into_owned();
        match key.as_ref() {
            "access_token" => response.access_token = value,
            "token_type" => response.token_type = value,
            "refresh_token" => response.refresh_token = Some(value),
            "expires_in" => response.expires_in = value.parse().ok(),
            "scope" => response.scope = Some(value),
            "error" => response.error = Some(value),
            "error_description" => response.error_description = Some(value),
            _ => {}
        }
    }
    (seen && (!response.access_token.is_empty() || response.error.is_some())).then_some(response)
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[derive(Debug)]
enum TokenRequestError {
    Transport(String),
    Status { status: StatusCode, body: String },
    Malformed { body: String },
    Provider(String),
}

impl TokenRequestError {
    /// 400/401, which providers use to refuse the credential placement.
    fn is_credentials_rejection(&self) -> bool {
        matches!(
            self,
            Self::Status { status, .. }
                if *status == StatusCode::BAD_REQUEST || *status == StatusCode::UNAUTHORIZED
        )
    }
}

impl From<TokenRequestError> for OAuthError {
    fn from(err: TokenRequestError) -> Self {
        let message = match err {
            TokenRequestError::Transport(e) => format!("request failed: {}", e),
            TokenRequestError::Status { status, body } => format!("HTTP {}: {}", status, body),
            TokenRequestError::Malformed { body } => format!("unparseable response: {}", body),
            TokenRequestError::Provider(message) => message,
        };
        OAuthError::ExchangeFailed(message)
    }
}
