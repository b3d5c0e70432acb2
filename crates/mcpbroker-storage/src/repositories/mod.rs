//! Repository implementations

mod auth_request_repository;
mod oauth_client_repository;
mod oauth_token_repository;
mod pending_state_repository;

pub use auth_request_repository::SqliteAuthRequestRepository;
pub use oauth_client_repository::SqliteOAuthClientRepository;
pub use oauth_token_repository::SqliteOAuthTokenRepository;
pub use pending_state_repository::SqlitePendingStateRepository;
