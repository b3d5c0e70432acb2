//! Security integration tests
//!
//! Field encryption, outer-flow token signing, PKCE and redirect URI rules.

mod crypto;
mod outer_tokens;
mod pkce;
