use axum::http::StatusCode;
use mcpbroker_gateway::oauth::PkceChallenge;
use pretty_assertions::assert_eq;
use tests::fixtures::{query_param, BROKER_URL, CLIENT_REDIRECT};
use tests::upstream::{mount_code_exchange, mount_invalid_grant};

use super::{body_json, location, upstream_return, Gateway};

#[tokio::test]
async fn test_full_authorization_flow() {
    let gw = Gateway::start().await;
    mount_code_exchange(&gw.upstream, "upstream-at", 1).await;
    let client_id = gw.register_client("srv1").await;
    let pkce = PkceChallenge::generate();

    // Outer authorize sends the user-agent upstream
    let auth_url = location(&gw.authorize("srv1", &client_id, "u1", &pkce).await);
    assert!(auth_url.starts_with(&format!("{}/authorize?", gw.upstream.uri())));
    let upstream_redirect = query_param(&auth_url, "redirect_uri").unwrap();
    assert!(upstream_redirect.starts_with(&format!("{}/oauth/callback/", BROKER_URL)));
    assert!(upstream_redirect.ends_with("/srv1"));
    assert_eq!(query_param(&auth_url, "code_challenge_method").as_deref(), Some("S256"));

    // Upstream returns; the client gets its own code
    let client_redirect = location(&gw.get(&upstream_return(&auth_url, "upstream-code"), None).await);
    assert!(client_redirect.starts_with(CLIENT_REDIRECT));
    assert_eq!(
        query_param(&client_redirect, "state").as_deref(),
        Some("client-state")
    );
    let code = query_param(&client_redirect, "code").unwrap();

    // Wrong verifier burns the code
    let response = gw.redeem("srv1", &client_id, &code, "wrong-verifier").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");
    let response = gw.redeem("srv1", &client_id, &code, &pkce.verifier).await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    // Second round: the grant exists, so authorize completes immediately
    let pkce = PkceChallenge::generate();
    let client_redirect = location(&gw.authorize("srv1", &client_id, "u1", &pkce).await);
    assert!(client_redirect.starts_with(CLIENT_REDIRECT));
    let code = query_param(&client_redirect, "code").unwrap();

    let response = gw.redeem("srv1", &client_id, &code, &pkce.verifier).await;
    assert_eq!(response.status(), StatusCode::OK);
    let tokens = body_json(response).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 3600);
    let refresh_token = tokens["refresh_token"].as_str().unwrap().to_string();

    // Codes are single use
    let response = gw.redeem("srv1", &client_id, &code, &pkce.verifier).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    // Refresh tokens are bound to their server
    let response = gw
        .post_form(
            "/oauth/token/srv1",
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["access_token"].is_string());

    let response = gw
        .post_form(
            "/oauth/token/comp1",
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disconnect_forces_reauthorization() {
    let gw = Gateway::start().await;
    mount_code_exchange(&gw.upstream, "upstream-at", 1).await;
    let client_id = gw.register_client("srv1").await;

    let auth_url = location(
        &gw.authorize("srv1", &client_id, "u1", &PkceChallenge::generate())
            .await,
    );
    location(&gw.get(&upstream_return(&auth_url, "upstream-code"), None).await);

    let response = gw
        .send(
            axum::http::Request::delete("/mcp/srv1/oauth")
                .header(mcpbroker_gateway::DEFAULT_USER_HEADER, "u1")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let redirect = location(
        &gw.authorize("srv1", &client_id, "u1", &PkceChallenge::generate())
            .await,
    );
    assert!(redirect.starts_with(&gw.upstream.uri()));
}

#[tokio::test]
async fn test_upstream_failure_reaches_client() {
    let gw = Gateway::start().await;
    mount_invalid_grant(&gw.upstream).await;
    let client_id = gw.register_client("srv1").await;

    let auth_url = location(
        &gw.authorize("srv1", &client_id, "u1", &PkceChallenge::generate())
            .await,
    );
    let redirect = location(&gw.get(&upstream_return(&auth_url, "stale-code"), None).await);
    assert!(redirect.starts_with(CLIENT_REDIRECT));
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("server_error"));
    assert_eq!(
        query_param(&redirect, "state").as_deref(),
        Some("client-state")
    );
}

#[tokio::test]
async fn test_upstream_denial_reaches_client() {
    let gw = Gateway::start().await;
    let client_id = gw.register_client("srv1").await;

    let auth_url = location(
        &gw.authorize("srv1", &client_id, "u1", &PkceChallenge::generate())
            .await,
    );
    let redirect_uri = query_param(&auth_url, "redirect_uri").unwrap();
    let state = query_param(&auth_url, "state").unwrap();
    let callback = format!(
        "{}?error=access_denied&error_description=User+declined&state={}",
        tests::fixtures::path_and_query(&redirect_uri),
        state
    );

    let redirect = location(&gw.get(&callback, None).await);
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("access_denied"));
    assert_eq!(
        query_param(&redirect, "error_description").as_deref(),
        Some("User declined")
    );
}

#[tokio::test]
async fn test_callback_for_other_server_is_rejected() {
    let gw = Gateway::start().await;
    mount_code_exchange(&gw.upstream, "upstream-at", 1).await;
    let client_id = gw.register_client("srv1").await;

    let auth_url = location(
        &gw.authorize("srv1", &client_id, "u1", &PkceChallenge::generate())
            .await,
    );
    let callback = upstream_return(&auth_url, "upstream-code");
    let (callback_path, callback_query) = callback.split_once('?').unwrap();
    let other = format!(
        "{}/srv2?{}",
        callback_path.strip_suffix("/srv1").unwrap(),
        callback_query
    );

    let redirect = location(&gw.get(&other, None).await);
    assert!(redirect.starts_with(CLIENT_REDIRECT));
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("invalid_request"));

    // The genuine callback still completes, with a single upstream exchange
    let redirect = location(&gw.get(&callback, None).await);
    assert!(redirect.starts_with(CLIENT_REDIRECT));
    assert!(query_param(&redirect, "code").is_some());
}
