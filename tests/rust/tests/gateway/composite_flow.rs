use axum::http::StatusCode;
use mcpbroker_gateway::oauth::PkceChallenge;
use pretty_assertions::assert_eq;
use tests::fixtures::{path_and_query, query_param, BROKER_URL, CLIENT_REDIRECT};
use tests::upstream::mount_code_exchange;

use super::{body_json, location, upstream_return, Gateway};

#[tokio::test]
async fn test_composite_flow_completes_after_components() {
    let gw = Gateway::start().await;
    mount_code_exchange(&gw.upstream, "component-at", 1).await;
    let client_id = gw.register_client("comp1").await;
    let pkce = PkceChallenge::generate();

    let status_url = location(&gw.authorize("comp1", &client_id, "u1", &pkce).await);
    assert!(status_url.starts_with(&format!(
        "{}/mcp/comp1/composite-auth?oauth_auth_request=",
        BROKER_URL
    )));
    let request_id = query_param(&status_url, "oauth_auth_request").unwrap();

    // Only the enabled remote component is outstanding
    let response = gw.get(&path_and_query(&status_url), Some("u1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let pending = body_json(response).await;
    let pending = pending.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["mcpServerID"], "c1");
    assert_eq!(pending[0]["catalogEntryID"], "e1");
    let auth_url = pending[0]["authURL"].as_str().unwrap().to_string();
    assert_eq!(
        query_param(&auth_url, "redirect_uri").unwrap(),
        format!("{}/oauth/mcp/callback/{}/c1", BROKER_URL, request_id)
    );

    // Polling again hands out the same upstream state
    let again = body_json(gw.get(&path_and_query(&status_url), Some("u1")).await).await;
    assert_eq!(again[0]["authURL"], auth_url.as_str());

    // The component callback returns to the composite status page
    let back = location(&gw.get(&upstream_return(&auth_url, "component-code"), None).await);
    assert_eq!(back, status_url);

    let client_redirect = location(&gw.get(&path_and_query(&back), Some("u1")).await);
    assert!(client_redirect.starts_with(CLIENT_REDIRECT));
    assert_eq!(
        query_param(&client_redirect, "state").as_deref(),
        Some("client-state")
    );
    let code = query_param(&client_redirect, "code").unwrap();

    let response = gw.redeem("comp1", &client_id, &code, &pkce.verifier).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["refresh_token"].is_string());
}

#[tokio::test]
async fn test_composite_status_without_outer_request() {
    let gw = Gateway::start().await;
    mount_code_exchange(&gw.upstream, "component-at", 1).await;

    let pending = body_json(gw.get("/mcp/comp1/composite-auth", Some("u1")).await).await;
    let auth_url = pending[0]["authURL"].as_str().unwrap().to_string();
    assert_eq!(
        query_param(&auth_url, "redirect_uri").unwrap(),
        format!("{}/oauth/mcp/callback/-/c1", BROKER_URL)
    );

    let back = location(&gw.get(&upstream_return(&auth_url, "component-code"), None).await);
    assert_eq!(back, format!("{}/mcp/comp1/composite-auth", BROKER_URL));

    let response = gw.get("/mcp/comp1/composite-auth", Some("u1")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));

    // Grants are per user
    let pending = body_json(gw.get("/mcp/comp1/composite-auth", Some("u2")).await).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_composite_status_rejects_foreign_request() {
    let gw = Gateway::start().await;
    let client_id = gw.register_client("comp1").await;

    let status_url = location(
        &gw.authorize("comp1", &client_id, "u1", &PkceChallenge::generate())
            .await,
    );

    let response = gw.get(&path_and_query(&status_url), Some("u2")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = gw
        .get("/mcp/comp1/composite-auth?oauth_auth_request=missing", Some("u1"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = gw.get("/mcp/srv1/composite-auth", Some("u1")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
