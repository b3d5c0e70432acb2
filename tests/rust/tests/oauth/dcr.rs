//! Dynamic client registration tests

use mcpbroker_core::OAuthClientRepository;
use mcpbroker_gateway::oauth::{
    hash_registration_token, process_dcr_request, process_dcr_update, DcrRequest,
};
use mcpbroker_storage::SqliteOAuthClientRepository;
use pretty_assertions::assert_eq;
use tests::fixtures::{test_db, BROKER_URL, CLIENT_REDIRECT};

fn request() -> DcrRequest {
    DcrRequest {
        client_name: Some("Cursor".to_string()),
        redirect_uris: vec![CLIENT_REDIRECT.to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_register_stores_hashed_token() {
    let repo = SqliteOAuthClientRepository::new(test_db());

    let response = process_dcr_request(&repo, "srv1", request(), BROKER_URL)
        .await
        .unwrap();
    assert!(response.client_id.starts_with("mcp_"));
    assert_eq!(response.token_endpoint_auth_method, "none");
    assert_eq!(
        response.grant_types,
        vec!["authorization_code".to_string(), "refresh_token".to_string()]
    );
    assert_eq!(
        response.registration_client_uri,
        format!("{}/oauth/register/{}", BROKER_URL, response.client_id)
    );

    let token = response.registration_access_token.clone().unwrap();
    let stored = repo.get(&response.client_id).await.unwrap().unwrap();
    assert_eq!(stored.mcp_id, "srv1");
    assert_eq!(stored.registration_access_token_hash, hash_registration_token(&token));
    assert_ne!(stored.registration_access_token_hash, token);
}

#[tokio::test]
async fn test_register_rejects_bad_metadata() {
    let repo = SqliteOAuthClientRepository::new(test_db());

    let mut bad_redirect = request();
    bad_redirect.redirect_uris = vec!["http://evil.example.com/cb".to_string()];
    let err = process_dcr_request(&repo, "srv1", bad_redirect, BROKER_URL)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_redirect_uri");

    let mut confidential = request();
    confidential.token_endpoint_auth_method = Some("client_secret_basic".to_string());
    let err = process_dcr_request(&repo, "srv1", confidential, BROKER_URL)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client_metadata");

    let mut implicit = request();
    implicit.response_types = vec!["token".to_string()];
    let err = process_dcr_request(&repo, "srv1", implicit, BROKER_URL)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client_metadata");
}

#[tokio::test]
async fn test_update_replaces_metadata() {
    let repo = SqliteOAuthClientRepository::new(test_db());
    let registered = process_dcr_request(&repo, "srv1", request(), BROKER_URL)
        .await
        .unwrap();
    let existing = repo.get(&registered.client_id).await.unwrap().unwrap();

    let mut update = request();
    update.client_name = Some("Cursor IDE".to_string());
    update.redirect_uris = vec!["cursor://oauth/callback".to_string()];
    let updated = process_dcr_update(&repo, existing.clone(), update, BROKER_URL)
        .await
        .unwrap();
    assert_eq!(updated.client_id, registered.client_id);
    assert_eq!(updated.client_name, "Cursor IDE");
    assert!(updated.registration_access_token.is_none());

    let stored = repo.get(&registered.client_id).await.unwrap().unwrap();
    assert!(stored.allows_redirect("cursor://oauth/callback"));
    assert!(!stored.allows_redirect(CLIENT_REDIRECT));
    assert_eq!(
        stored.registration_access_token_hash,
        existing.registration_access_token_hash
    );

    let mut mismatched = request();
    mismatched.client_id = Some("mcp_other".to_string());
    let err = process_dcr_update(&repo, existing, mismatched, BROKER_URL)
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client_metadata");
}
