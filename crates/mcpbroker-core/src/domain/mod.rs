//! Domain entities and value objects
//!
//! - Grants (completed upstream authorizations) and their client config
//! - Pending authorizations (in-flight upstream flows)
//! - Outer auth requests and registered clients (first-level flow)
//! - MCP server descriptions used by the composite coordinator
//! - Audit events emitted at flow terminal states

mod audit;
mod auth_request;
mod client;
mod grant;
mod pending;
mod server;

pub use audit::{AuditAction, AuditEvent, FlowOutcome};
pub use auth_request::OAuthAuthRequest;
pub use client::RegisteredClient;
pub use grant::{AuthStyle, OAuthClientConfig, OAuthEndpoint, OAuthGrant, UpstreamToken};
pub use pending::PendingAuthorization;
pub use server::{
    ComponentServerConfig, CompositeComponentStatus, CompositeConfig, McpServer, RuntimeType,
    ServerConfig, UpstreamOAuthSettings,
};

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a secret value.
///
/// Used for hashed state, hashed authorization codes and hashed
/// registration tokens; only the hash ever reaches the store.
pub fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
