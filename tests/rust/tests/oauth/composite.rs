//! Composite coordinator tests

use std::sync::Arc;

use chrono::{Duration, Utc};
use mcpbroker_core::{sha256_hex, AuthRequestRepository, OAuthAuthRequest, OAuthError};
use mcpbroker_gateway::oauth::{AuthCodeIssuer, CompositeAuthStatus, CompositeCoordinator};
use mcpbroker_storage::SqliteAuthRequestRepository;
use pretty_assertions::assert_eq;
use tests::fixtures::{catalog, query_param, test_db, BROKER_URL, CLIENT_REDIRECT};
use tests::{RecordingAuditSink, ScriptedAuthChecker};

struct Harness {
    coordinator: CompositeCoordinator,
    checker: Arc<ScriptedAuthChecker>,
    requests: Arc<SqliteAuthRequestRepository>,
}

fn harness(checker: ScriptedAuthChecker) -> Harness {
    let checker = Arc::new(checker);
    let requests = Arc::new(SqliteAuthRequestRepository::new(test_db()));
    let issuer = Arc::new(AuthCodeIssuer::new(
        requests.clone(),
        Arc::new(RecordingAuditSink::new()),
    ));
    let coordinator = CompositeCoordinator::new(
        Arc::new(catalog("https://auth.example.com")),
        checker.clone(),
        issuer,
        requests.clone(),
        BROKER_URL,
        Duration::minutes(30),
    );
    Harness {
        coordinator,
        checker,
        requests,
    }
}

fn scripted() -> ScriptedAuthChecker {
    ScriptedAuthChecker::new()
        .with_auth_url("c1", "https://auth.example.com/authorize?for=c1")
        .with_auth_url("c2", "https://auth.example.com/authorize?for=c2")
}

async fn outer_request(h: &Harness, id: &str, user: &str) -> OAuthAuthRequest {
    let mut request = OAuthAuthRequest::new(id, "comp1", user, "mcp_client", CLIENT_REDIRECT);
    request.state = Some("client-state".to_string());
    h.requests.create(&request).await.unwrap();
    request
}

#[tokio::test]
async fn test_only_enabled_remote_components_are_checked() {
    let h = harness(scripted());

    let status = h
        .coordinator
        .check_composite_auth("comp1", "u1", None)
        .await
        .unwrap();

    let pending = status.pending_components();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].mcp_server_id, "c1");
    assert_eq!(pending[0].catalog_entry_id, "e1");
    assert_eq!(pending[0].auth_url, "https://auth.example.com/authorize?for=c1");

    // c2 is disabled and c3 is local
    assert_eq!(
        h.checker.calls(),
        vec![(
            "c1".to_string(),
            format!("{}/oauth/mcp/callback/-/c1", BROKER_URL)
        )]
    );
}

#[tokio::test]
async fn test_satisfied_without_outer_request() {
    let h = harness(scripted());
    h.checker.mark_authorized("c1");

    let status = h
        .coordinator
        .check_composite_auth("comp1", "u1", Some("-"))
        .await
        .unwrap();
    assert_eq!(status, CompositeAuthStatus::Satisfied);
}

#[tokio::test]
async fn test_completes_outer_request_once_components_authorized() {
    let h = harness(scripted());
    outer_request(&h, "req-1", "u1").await;

    let status = h
        .coordinator
        .check_composite_auth("comp1", "u1", Some("req-1"))
        .await
        .unwrap();
    assert_eq!(status.pending_components().len(), 1);
    assert_eq!(
        h.checker.calls()[0].1,
        format!("{}/oauth/mcp/callback/req-1/c1", BROKER_URL)
    );

    h.checker.mark_authorized("c1");
    let status = h
        .coordinator
        .check_composite_auth("comp1", "u1", Some("req-1"))
        .await
        .unwrap();

    let redirect_url = match status {
        CompositeAuthStatus::Complete { redirect_url } => redirect_url,
        other => panic!("expected Complete, got {:?}", other),
    };
    assert!(redirect_url.starts_with(CLIENT_REDIRECT));
    assert_eq!(
        query_param(&redirect_url, "state").as_deref(),
        Some("client-state")
    );

    let code = query_param(&redirect_url, "code").unwrap();
    let stored = h.requests.get("req-1").await.unwrap().unwrap();
    assert_eq!(stored.hashed_auth_code, Some(sha256_hex(&code)));
}

#[tokio::test]
async fn test_rejects_foreign_missing_and_expired_requests() {
    let h = harness(scripted());
    outer_request(&h, "req-u2", "u2").await;

    let err = h
        .coordinator
        .check_composite_auth("comp1", "u1", Some("req-u2"))
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::InvalidRequest(_)));

    let err = h
        .coordinator
        .check_composite_auth("comp1", "u1", Some("missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::NotFound(_)));

    let mut stale = OAuthAuthRequest::new("stale", "comp1", "u1", "mcp_client", CLIENT_REDIRECT);
    stale.created_at = Utc::now() - Duration::hours(1);
    h.requests.create(&stale).await.unwrap();
    let err = h
        .coordinator
        .check_composite_auth("comp1", "u1", Some("stale"))
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::ExpiredState));
}

#[tokio::test]
async fn test_non_composite_and_unknown_servers() {
    let h = harness(scripted());

    let err = h
        .coordinator
        .check_composite_auth("srv1", "u1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::InvalidRequest(_)));

    let err = h
        .coordinator
        .check_composite_auth("nope", "u1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::NotFound(_)));
}

#[tokio::test]
async fn test_checker_errors_propagate() {
    let h = harness(scripted().failing_for("c1"));

    let err = h
        .coordinator
        .check_composite_auth("comp1", "u1", None)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::ExchangeFailed(_)));
}
