use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use mcpbroker_gateway::oauth::PkceChallenge;
use pretty_assertions::assert_eq;
use tests::fixtures::{query_param, BROKER_URL, CLIENT_REDIRECT};

use super::{body_json, location, Gateway};

#[tokio::test]
async fn test_health() {
    let gw = Gateway::start().await;
    let response = gw.get("/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_metadata_per_server() {
    let gw = Gateway::start().await;

    let response = gw
        .get("/.well-known/oauth-authorization-server/srv1", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["issuer"], BROKER_URL);
    assert_eq!(
        body["authorization_endpoint"],
        format!("{}/oauth/authorize/srv1", BROKER_URL)
    );
    assert_eq!(body["token_endpoint"], format!("{}/oauth/token/srv1", BROKER_URL));
    assert_eq!(body["code_challenge_methods_supported"][0], "S256");

    let response = gw
        .get("/.well-known/oauth-authorization-server/unknown", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_authorize_requires_user() {
    let gw = Gateway::start().await;
    let client_id = gw.register_client("srv1").await;

    let response = gw
        .get(
            &format!(
                "/oauth/authorize/srv1?response_type=code&client_id={}&redirect_uri={}",
                client_id, CLIENT_REDIRECT
            ),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_authorize_rejects_unknown_client_directly() {
    let gw = Gateway::start().await;
    let pkce = PkceChallenge::generate();

    let response = gw.authorize("srv1", "mcp_unknown", "u1", &pkce).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");

    // Registered for a different server
    let client_id = gw.register_client("comp1").await;
    let response = gw.authorize("srv1", &client_id, "u1", &pkce).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_authorize_without_challenge_redirects_error() {
    let gw = Gateway::start().await;
    let client_id = gw.register_client("srv1").await;

    let response = gw
        .get(
            &format!(
                "/oauth/authorize/srv1?response_type=code&client_id={}&redirect_uri={}&state=s1",
                client_id, CLIENT_REDIRECT
            ),
            Some("u1"),
        )
        .await;
    let redirect = location(&response);
    assert!(redirect.starts_with(CLIENT_REDIRECT));
    assert_eq!(query_param(&redirect, "error").as_deref(), Some("invalid_request"));
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_callback_with_unknown_state() {
    let gw = Gateway::start().await;

    let response = gw
        .get("/oauth/callback/-/srv1?code=abc&state=nope", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = gw.get("/oauth/callback/-/srv1?code=abc", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_token_endpoint_rejects_bad_grants() {
    let gw = Gateway::start().await;

    let response = gw
        .post_form("/oauth/token/srv1", &[("grant_type", "password")])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");

    let response = gw
        .post_form(
            "/oauth/token/srv1",
            &[
                ("grant_type", "authorization_code"),
                ("code", "never-issued"),
                ("code_verifier", "v"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_grant");

    let response = gw
        .post_form(
            "/oauth/token/srv1",
            &[("grant_type", "refresh_token"), ("refresh_token", "forged.token")],
        )
        .await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_registration_management() {
    let gw = Gateway::start().await;

    let response = gw
        .post_json(
            "/oauth/register/unknown",
            serde_json::json!({"redirect_uris": [CLIENT_REDIRECT]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = gw
        .post_json(
            "/oauth/register/srv1",
            serde_json::json!({"redirect_uris": ["http://evil.example.com/cb"]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_redirect_uri");

    let response = gw
        .post_json(
            "/oauth/register/srv1",
            serde_json::json!({"client_name": "Cursor", "redirect_uris": [CLIENT_REDIRECT]}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let client_id = body["client_id"].as_str().unwrap().to_string();
    let token = body["registration_access_token"].as_str().unwrap().to_string();
    let uri = format!("/oauth/register/{}", client_id);

    let read = |bearer: String| {
        Request::get(uri.as_str())
            .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
            .body(Body::empty())
            .unwrap()
    };

    let response = gw.send(read("wrong".to_string())).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_token");

    let response = gw.send(read(token.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["client_name"], "Cursor");
    assert!(body.get("registration_access_token").is_none());

    let response = gw
        .send(
            Request::put(uri.as_str())
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "client_id": client_id,
                        "client_name": "Cursor IDE",
                        "redirect_uris": [CLIENT_REDIRECT],
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["client_name"], "Cursor IDE");

    let response = gw
        .send(
            Request::delete(uri.as_str())
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = gw.send(read(token)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
