//! PKCE and redirect URI rules

use mcpbroker_gateway::oauth::{validate_redirect_uris, PkceChallenge};

#[test]
fn test_rfc7636_example() {
    // Appendix B of RFC 7636
    let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    assert_eq!(
        PkceChallenge::challenge_for(verifier),
        "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
    );
    assert!(PkceChallenge::verify(
        verifier,
        "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM",
        Some("S256")
    ));
    assert!(!PkceChallenge::verify(verifier, verifier, Some("plain")));
}

#[test]
fn test_generated_pairs_are_unique() {
    let a = PkceChallenge::generate();
    let b = PkceChallenge::generate();
    assert_ne!(a.verifier, b.verifier);
    assert!(PkceChallenge::verify(&a.verifier, &a.challenge, None));
    assert!(!PkceChallenge::verify(&b.verifier, &a.challenge, None));
}

#[test]
fn test_redirect_uri_rules() {
    let ok = |uri: &str| validate_redirect_uris(&[uri.to_string()]).is_ok();

    assert!(ok("https://app.example.com/callback"));
    assert!(ok("http://127.0.0.1:4567/callback"));
    assert!(ok("http://localhost:3000/cb"));
    assert!(ok("cursor://anysphere.cursor-retrieval/oauth/callback"));

    assert!(!ok("http://app.example.com/callback"));
    assert!(!ok("javascript:alert(1)"));
    assert!(!ok("https://app.example.com/callback#frag"));
    assert!(!ok("not a uri"));
    assert!(validate_redirect_uris(&[]).is_err());
}
