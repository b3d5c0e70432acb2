//! HTTP Request/Response Logging Middleware
//!
//! One entry and one exit line per request, correlated by trace id.
//! Query strings under `/oauth` carry codes and state and are never logged.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::{debug, Instrument};

use super::handlers::AppState;
use crate::logging::{RequestSpan, TraceContext};

const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "proxy-authorization"];

/// Path plus query, with the query masked on OAuth routes.
pub fn loggable_path(path: &str, query: Option<&str>) -> String {
    match query {
        None | Some("") => path.to_string(),
        Some(_) if is_sensitive_path(path) => format!("{}?[REDACTED]", path),
        Some(query) => format!("{}?{}", path, query),
    }
}

pub fn is_sensitive_path(path: &str) -> bool {
    path.starts_with("/oauth/") || path.contains("composite-auth")
}

/// Compact header dump for DEBUG, secrets masked.
pub fn redact_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            if SENSITIVE_HEADERS.contains(&name.as_str()) {
                format!("{}=[REDACTED]", name)
            } else {
                format!("{}={:?}", name, value)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub async fn http_logging_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let uri = request.uri();
    let path = loggable_path(uri.path(), uri.query());
    let user = request
        .headers()
        .get(state.user_header.as_str())
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let ctx = TraceContext::new(request.method().as_str(), &path).with_user(user);
    let span = RequestSpan::enter(&ctx);

    async move {
        RequestSpan::log_entry(&ctx);
        debug!(
            trace_id = %ctx.trace_id,
            headers = %redact_headers(request.headers()),
            "Request headers"
        );

        let response = next.run(request).await;
        RequestSpan::log_exit(&ctx, response.status().as_u16());
        response
    }
    .instrument(span)
    .await
}
