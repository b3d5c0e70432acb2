//! Shared test utilities and fixtures for McpBroker integration tests.


pub use mocks::{FailingTokenRepository, RecordingAuditSink, ScriptedAuthChecker};

/// Upstream provider doubles built on wiremock
pub mod upstream {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Token endpoint answering the authorization_code grant.
    pub async fn mount_code_exchange(server: &MockServer, access_token: &str, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "refresh_token": format!("{}-refresh", access_token),
                "expires_in": 3600,
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    /// Token endpoint answering the refresh_token grant.
    pub async fn mount_refresh(server: &MockServer, access_token: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": access_token,
                "token_type": "Bearer",
                "expires_in": 3600,
            })))
            .mount(server)
            .await;
    }

    /// Token endpoint that rejects every code.
    pub async fn mount_invalid_grant(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Code expired",
            })))
            .mount(server)
            .await;
    }
}
