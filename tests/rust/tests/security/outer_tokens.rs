//! Outer-flow token signing tests

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use mcpbroker_gateway::auth::{
    create_access_token, create_refresh_token, validate_token, TokenKind, TokenSubject,
};
use pretty_assertions::assert_eq;

const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

fn subject() -> TokenSubject<'static> {
    TokenSubject {
        mcp_id: "srv1",
        user_id: "u1",
        client_id: "mcp_client",
        scope: Some("read"),
    }
}

#[test]
fn test_access_and_refresh_tokens_validate() {
    let access = create_access_token(&subject(), 3600, SECRET).unwrap();
    let claims = validate_token(&access, SECRET).unwrap();
    assert_eq!(claims.token_type, TokenKind::Access);
    assert_eq!(claims.user_id, "u1");
    assert_eq!(claims.scope.as_deref(), Some("read"));
    assert_eq!(claims.exp - claims.iat, 3600);

    let refresh = create_refresh_token(&subject(), SECRET).unwrap();
    assert_eq!(
        validate_token(&refresh, SECRET).unwrap().token_type,
        TokenKind::Refresh
    );
}

#[test]
fn test_rejects_wrong_secret_and_tampering() {
    let token = create_access_token(&subject(), 3600, SECRET).unwrap();
    assert!(validate_token(&token, b"another-secret-another-secret!!").is_none());

    let (_, signature) = token.split_once('.').unwrap();
    let forged_payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({
            "mcp_id": "srv1",
            "user_id": "admin",
            "client_id": "mcp_client",
            "exp": i64::MAX,
            "iat": 0,
            "token_type": "access",
        })
        .to_string(),
    );
    assert!(validate_token(&format!("{}.{}", forged_payload, signature), SECRET).is_none());
    assert!(validate_token("not-a-token", SECRET).is_none());
    assert!(validate_token(&format!("{}.extra", token), SECRET).is_none());
}

#[test]
fn test_rejects_expired() {
    let token = create_access_token(&subject(), -10, SECRET).unwrap();
    assert!(validate_token(&token, SECRET).is_none());
}
