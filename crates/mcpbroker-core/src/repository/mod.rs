//! Repository traits for data access
//!
//! These traits define the storage interface without specifying the
//! implementation (SQLite, in-memory, etc.). Absence is reported through
//! `Option`/`bool`; errors are storage or encryption failures.

use async_trait::async_trait;
use chrono::Duration;

use crate::domain::{
    OAuthAuthRequest, OAuthClientConfig, OAuthGrant, PendingAuthorization, RegisteredClient,
    UpstreamToken,
};

/// Result type for repository operations
pub type RepoResult<T> = anyhow::Result<T>;

/// Durable store of in-flight upstream authorizations.
#[async_trait]
pub trait PendingStateRepository: Send + Sync {
    /// Insert a new pending entry. A duplicate hashed state is an error.
    async fn create(&self, pending: &PendingAuthorization) -> RepoResult<()>;

    /// Look up a pending entry by its plaintext state.
    async fn get(&self, state: &str) -> RepoResult<Option<PendingAuthorization>>;

    /// Atomically mark the entry for `state` as being completed and return it.
    ///
    /// Returns `None` if no entry exists or another caller already claimed it.
    async fn claim(&self, state: &str) -> RepoResult<Option<PendingAuthorization>>;

    /// Newest entry for the tuple that is younger than `max_age`.
    async fn find_active(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        max_age: Duration,
    ) -> RepoResult<Option<PendingAuthorization>>;

    /// Undo a `claim` so the entry can be completed again. Missing rows are
    /// not an error.
    async fn release(&self, hashed_state: &str) -> RepoResult<()>;

    /// Delete by hashed state. Missing rows are not an error.
    async fn delete(&self, hashed_state: &str) -> RepoResult<()>;

    /// Delete entries created before `now - older_than`. Returns rows removed.
    async fn cleanup(&self, older_than: Duration) -> RepoResult<usize>;
}

/// Durable store of completed upstream grants.
#[async_trait]
pub trait OAuthTokenRepository: Send + Sync {
    /// Upsert the grant for (mcp_id, user_id), replacing any prior grant.
    async fn replace(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        config: &OAuthClientConfig,
        token: &UpstreamToken,
    ) -> RepoResult<()>;

    /// Persist an updated grant (e.g. after refresh).
    async fn save(&self, grant: &OAuthGrant) -> RepoResult<()>;

    async fn get(&self, user_id: &str, mcp_id: &str, url: &str) -> RepoResult<Option<OAuthGrant>>;

    async fn delete_for_url(&self, user_id: &str, mcp_id: &str, url: &str) -> RepoResult<()>;

    async fn delete_all(&self, user_id: &str, mcp_id: &str) -> RepoResult<()>;

    async fn delete_for_all_users(&self, mcp_id: &str) -> RepoResult<()>;
}

/// Outer (first-level) authorization requests.
#[async_trait]
pub trait AuthRequestRepository: Send + Sync {
    async fn create(&self, request: &OAuthAuthRequest) -> RepoResult<()>;

    async fn get(&self, id: &str) -> RepoResult<Option<OAuthAuthRequest>>;

    /// Record the hashed authorization code in a single write.
    ///
    /// Returns `false` if the request no longer exists.
    async fn set_hashed_auth_code(&self, id: &str, hashed_code: &str) -> RepoResult<bool>;

    /// Take the request holding `hashed_code` for `mcp_id`, clearing the code
    /// so it cannot be redeemed twice.
    async fn consume_auth_code(
        &self,
        mcp_id: &str,
        hashed_code: &str,
    ) -> RepoResult<Option<OAuthAuthRequest>>;

    async fn delete(&self, id: &str) -> RepoResult<()>;

    /// Delete requests created before `now - older_than`. Returns rows removed.
    async fn cleanup(&self, older_than: Duration) -> RepoResult<usize>;
}

/// Clients registered through dynamic client registration.
#[async_trait]
pub trait OAuthClientRepository: Send + Sync {
    async fn save(&self, client: &RegisteredClient) -> RepoResult<()>;

    async fn get(&self, client_id: &str) -> RepoResult<Option<RegisteredClient>>;

    /// Returns `true` if a client was deleted.
    async fn delete(&self, client_id: &str) -> RepoResult<bool>;
}
