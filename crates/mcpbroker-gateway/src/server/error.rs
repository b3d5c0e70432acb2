//! HTTP error responses
//!
//! The one place where `OAuthError` becomes a status code, a JSON body or
//! an OAuth error redirect.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use mcpbroker_core::OAuthError;
use serde::Serialize;
use tracing::{error, warn};

use crate::oauth::oauth_error_redirect_url;

/// OAuth-style error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

pub fn status_for(err: &OAuthError) -> StatusCode {
    match err {
        OAuthError::NotFound(_) => StatusCode::NOT_FOUND,
        OAuthError::ExpiredState
        | OAuthError::UpstreamAuthorization { .. }
        | OAuthError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        OAuthError::ReauthRequired { .. } => StatusCode::UNAUTHORIZED,
        OAuthError::ExchangeFailed(_) => StatusCode::BAD_GATEWAY,
        OAuthError::Encryption(_) | OAuthError::Storage(_) | OAuthError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Error code and description safe to hand to a client.
fn describe(err: &OAuthError, status: StatusCode) -> (&'static str, String) {
    match err {
        OAuthError::Encryption(_) | OAuthError::Storage(_) | OAuthError::Internal(_) => {
            error!("[Gateway] Internal failure: {}", err);
            ("server_error", "internal server error".to_string())
        }
        OAuthError::UpstreamAuthorization { error, description } => (
            err.oauth_code(),
            description
                .clone()
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| error.clone()),
        ),
        _ if status.is_server_error() => {
            warn!("[Gateway] Upstream failure: {}", err);
            ("server_error", err.to_string())
        }
        _ => (err.oauth_code(), err.to_string()),
    }
}

/// Wrapper that turns `OAuthError` into a JSON response.
#[derive(Debug)]
pub struct ApiError(pub OAuthError);

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let (code, description) = describe(&self.0, status);
        (
            status,
            Json(ErrorBody {
                error: code.to_string(),
                error_description: Some(description),
            }),
        )
            .into_response()
    }
}

/// 302 to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Send the error to the client's redirect URI, or fall back to JSON when
/// that URI is unusable.
pub fn oauth_error_redirect(redirect_uri: &str, err: OAuthError, state: Option<&str>) -> Response {
    let status = status_for(&err);
    let (code, description) = describe(&err, status);
    match oauth_error_redirect_url(redirect_uri, code, &description, state) {
        Ok(url) => found(&url),
        Err(_) => ApiError(err).into_response(),
    }
}

/// Error response for the token endpoint (RFC 6749 section 5.2)
pub fn token_error(error: &str, description: &str) -> (StatusCode, Json<ErrorBody>) {
    let status = match error {
        "invalid_client" => StatusCode::UNAUTHORIZED,
        "server_error" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    };
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            error_description: Some(description.to_string()),
        }),
    )
}
