//! Caller identity and outer-flow tokens
//!
//! The broker sits behind a proxy that authenticates users and forwards
//! the user id in a configured header. Tokens handed to outer OAuth
//! clients are HMAC-SHA256 signed: `base64url(payload).base64url(sig)`.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::server::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Refresh tokens expire in 30 days
pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// User id taken from the trusted identity header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(state.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match user {
            Some(user) => Ok(AuthenticatedUser(user.to_string())),
            None => {
                debug!("[Auth] Missing {} header", state.user_header);
                Err((
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({
                        "error": "unauthorized",
                        "error_description": "Missing authenticated user",
                    })),
                )
                    .into_response())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried by outer-flow tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub mcp_id: String,
    pub user_id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub exp: i64,
    pub iat: i64,
    pub token_type: TokenKind,
}

/// Who a token is issued to.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub mcp_id: &'a str,
    pub user_id: &'a str,
    pub client_id: &'a str,
    pub scope: Option<&'a str>,
}

impl TokenSubject<'_> {
    fn claims(&self, token_type: TokenKind, expires_in: i64) -> TokenClaims {
        let now = chrono::Utc::now().timestamp();
        TokenClaims {
            mcp_id: self.mcp_id.to_string(),
            user_id: self.user_id.to_string(),
            client_id: self.client_id.to_string(),
            scope: self.scope.map(str::to_string),
            exp: now + expires_in,
            iat: now,
            token_type,
        }
    }
}

/// Create a signed access token
pub fn create_access_token(
    subject: &TokenSubject<'_>,
    expires_in: i64,
    secret: &[u8],
) -> anyhow::Result<String> {
    sign_token(&subject.claims(TokenKind::Access, expires_in), secret)
}

/// Create a signed refresh token
pub fn create_refresh_token(subject: &TokenSubject<'_>, secret: &[u8]) -> anyhow::Result<String> {
    sign_token(
        &subject.claims(TokenKind::Refresh, REFRESH_TOKEN_TTL_SECS),
        secret,
    )
}

fn sign_token(claims: &TokenClaims, secret: &[u8]) -> anyhow::Result<String> {
    let payload_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("invalid token secret: {}", e))?;
    mac.update(payload_b64.as_bytes());
    let signature_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Validate a token and extract claims. Expired tokens are rejected.
pub fn validate_token(token: &str, secret: &[u8]) -> Option<TokenClaims> {
    let (payload_b64, signature_b64) = token.split_once('.')?;
    if signature_b64.contains('.') {
        debug!("[Auth] Invalid token format");
        return None;
    }

    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload_b64.as_bytes());
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;
    if mac.verify_slice(&signature).is_err() {
        debug!("[Auth] Invalid token signature");
        return None;
    }

    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let claims: TokenClaims = serde_json::from_slice(&payload).ok()?;

    let now = chrono::Utc::now().timestamp();
    if now > claims.exp {
        debug!("[Auth] Token expired at {}, now is {}", claims.exp, now);
        return None;
    }
    Some(claims)
}
