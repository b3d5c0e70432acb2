//! Outer authorization request repository tests

use chrono::{Duration, Utc};
use mcpbroker_core::{sha256_hex, AuthRequestRepository, OAuthAuthRequest};
use mcpbroker_storage::SqliteAuthRequestRepository;
use pretty_assertions::assert_eq;
use tests::fixtures::{test_db, CLIENT_REDIRECT};

fn request(id: &str) -> OAuthAuthRequest {
    let mut request = OAuthAuthRequest::new(id, "comp1", "u1", "mcp_client", CLIENT_REDIRECT);
    request.state = Some("client-state".to_string());
    request
}

#[tokio::test]
async fn test_code_is_bound_to_server() {
    let repo = SqliteAuthRequestRepository::new(test_db());
    repo.create(&request("req-1")).await.unwrap();
    repo.set_hashed_auth_code("req-1", &sha256_hex("code-1"))
        .await
        .unwrap();

    assert!(repo
        .consume_auth_code("srv1", &sha256_hex("code-1"))
        .await
        .unwrap()
        .is_none());

    let consumed = repo
        .consume_auth_code("comp1", &sha256_hex("code-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(consumed.id, "req-1");
    assert_eq!(consumed.state.as_deref(), Some("client-state"));

    assert!(repo
        .consume_auth_code("comp1", &sha256_hex("code-1"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cleanup_removes_requests_past_ttl() {
    let repo = SqliteAuthRequestRepository::new(test_db());

    let mut old = request("old");
    old.created_at = Utc::now() - Duration::hours(2);
    repo.create(&old).await.unwrap();
    repo.create(&request("fresh")).await.unwrap();

    // A completed request (code issued) is removed too once it is old
    let mut issued = request("issued");
    issued.created_at = Utc::now() - Duration::hours(2);
    repo.create(&issued).await.unwrap();
    repo.set_hashed_auth_code("issued", "hash").await.unwrap();

    assert_eq!(repo.cleanup(Duration::minutes(30)).await.unwrap(), 2);
    assert!(repo.get("fresh").await.unwrap().is_some());
    assert!(repo.get("old").await.unwrap().is_none());
    assert!(repo.get("issued").await.unwrap().is_none());
}
