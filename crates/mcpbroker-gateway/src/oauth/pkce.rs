//! PKCE (Proof Key for Code Exchange)
//!
//! Implements RFC 7636 with the S256 method for both directions: the broker
//! as an upstream client, and the broker verifying its own outer clients.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// PKCE code verifier and challenge pair
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// The code verifier (kept secret, sent in token exchange)
    pub verifier: String,
    /// The code challenge (sent in authorization request)
    pub challenge: String,
}

impl PkceChallenge {
    pub const METHOD: &'static str = "S256";

    /// Generate a new PKCE pair from 32 random bytes.
    pub fn generate() -> Self {
        let verifier = random_url_token(32);
        let challenge = Self::challenge_for(&verifier);
        Self { verifier, challenge }
    }

    /// S256 challenge for a verifier.
    pub fn challenge_for(verifier: &str) -> String {
        let hash = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }

    /// Verify a presented verifier against a stored challenge.
    ///
    /// Only `S256` is accepted; a missing method defaults to it.
    pub fn verify(verifier: &str, challenge: &str, method: Option<&str>) -> bool {
        match method.unwrap_or(Self::METHOD) {
            Self::METHOD => Self::challenge_for(verifier) == challenge,
            _ => false,
        }
    }
}

/// `len` random bytes, base64url-encoded without padding.
///
/// Used for states, verifiers, authorization codes and registration tokens.
pub fn random_url_token(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(&bytes)
}
