//! Pending authorization repository tests

use std::sync::Arc;

use chrono::{Duration, Utc};
use mcpbroker_core::{PendingAuthorization, PendingStateRepository};
use mcpbroker_storage::{EncryptionConfig, SqlitePendingStateRepository};
use pretty_assertions::assert_eq;
use tests::fixtures::{encrypted, test_db, upstream_config};

fn pending(state: &str) -> PendingAuthorization {
    PendingAuthorization::new(
        "u1",
        "srv1",
        "https://srv1.example.com/mcp",
        "",
        state,
        "verifier-1",
        "challenge-1",
        upstream_config("https://auth.example.com", "http://broker.test/oauth/callback/-/srv1"),
    )
}

#[tokio::test]
async fn test_secrets_are_encrypted_at_rest() {
    let db = test_db();
    let repo = SqlitePendingStateRepository::new(db.clone(), &encrypted());
    repo.create(&pending("state-1")).await.unwrap();

    let (state, verifier, secret): (String, String, String) = db
        .lock()
        .await
        .connection()
        .query_row(
            "SELECT state, verifier, client_secret FROM mcp_oauth_pending_states",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_ne!(state, "state-1");
    assert_ne!(verifier, "verifier-1");
    assert_ne!(secret, "upstream-secret");

    let loaded = repo.get("state-1").await.unwrap().unwrap();
    assert_eq!(loaded.state, "state-1");
    assert_eq!(loaded.verifier, "verifier-1");
    assert_eq!(loaded.config.client_secret, "upstream-secret");
}

#[tokio::test]
async fn test_lookup_is_by_hashed_state() {
    let db = test_db();
    let repo = SqlitePendingStateRepository::new(db.clone(), &EncryptionConfig::new());
    repo.create(&pending("state-1")).await.unwrap();

    let key: String = db
        .lock()
        .await
        .connection()
        .query_row(
            "SELECT hashed_state FROM mcp_oauth_pending_states",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(key, PendingAuthorization::hash_state("state-1"));
    assert!(repo.get("state-2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_claims_yield_one_winner() {
    let repo = Arc::new(SqlitePendingStateRepository::new(
        test_db(),
        &EncryptionConfig::new(),
    ));
    repo.create(&pending("race")).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.claim("race").await.unwrap() })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_some() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn test_find_active_skips_claimed_and_old_entries() {
    let repo = SqlitePendingStateRepository::new(test_db(), &EncryptionConfig::new());
    let ttl = Duration::minutes(30);

    let mut old = pending("old");
    old.created_at = Utc::now() - Duration::hours(1);
    repo.create(&old).await.unwrap();
    assert!(repo
        .find_active("u1", "srv1", "https://srv1.example.com/mcp", "", ttl)
        .await
        .unwrap()
        .is_none());

    repo.create(&pending("fresh")).await.unwrap();
    let active = repo
        .find_active("u1", "srv1", "https://srv1.example.com/mcp", "", ttl)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.state, "fresh");

    // Different outer request is a different flow
    assert!(repo
        .find_active("u1", "srv1", "https://srv1.example.com/mcp", "req-1", ttl)
        .await
        .unwrap()
        .is_none());

    repo.claim("fresh").await.unwrap();
    assert!(repo
        .find_active("u1", "srv1", "https://srv1.example.com/mcp", "", ttl)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_cleanup_removes_only_expired() {
    let repo = SqlitePendingStateRepository::new(test_db(), &EncryptionConfig::new());

    let mut old = pending("old");
    old.created_at = Utc::now() - Duration::minutes(31);
    repo.create(&old).await.unwrap();
    repo.create(&pending("fresh")).await.unwrap();

    let removed = repo.cleanup(Duration::minutes(30)).await.unwrap();
    assert_eq!(removed, 1);
    assert!(repo.get("old").await.unwrap().is_none());
    assert!(repo.get("fresh").await.unwrap().is_some());
}
