//! OAuth 2.1 Implementation
//!
//! Upstream (second-level) flows with PKCE against remote MCP server
//! providers, the composite coordinator that gates the outer flow, and the
//! outer-flow pieces the broker serves itself (codes, client registration).

mod authorization_code;
mod checker;
mod composite;
mod dcr;
mod discovery;
mod flow;
mod pkce;
mod state_manager;
mod token;

pub use authorization_code::{oauth_error_redirect_url, AuthCodeIssuer};
pub use checker::GrantAuthChecker;
pub use composite::{component_redirect_url, CompositeAuthStatus, CompositeCoordinator};
pub use dcr::{
    hash_registration_token, process_dcr_request, process_dcr_update, validate_redirect_uris,
    DcrError, DcrRequest, DcrResponse,
};
pub use discovery::{origin_of, AuthServerMetadata, OAuthDiscovery};
pub use flow::{authorization_url, UpstreamOAuthClient};
pub use pkce::{random_url_token, PkceChallenge};
pub use state_manager::{
    CallbackOutcome, CallbackParams, TokenExchanger, DEFAULT_PENDING_TTL_SECS,
};
pub use token::TokenResponse;

use mcpbroker_core::OAuthError;
use mcpbroker_storage::EncryptionError;

/// Path segment standing in for "no outer request".
pub const NO_OUTER_REQUEST: &str = "-";

/// Map a repository failure onto the error taxonomy.
///
/// Encryption failures keep their own variant; everything else is storage.
pub(crate) fn storage_error(err: anyhow::Error) -> OAuthError {
    match err.downcast::<EncryptionError>() {
        Ok(e) => e.into(),
        Err(err) => OAuthError::Storage(err),
    }
}
