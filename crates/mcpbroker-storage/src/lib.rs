//! McpBroker Storage Layer
//!
//! SQLite persistence for upstream grants, pending authorizations, outer
//! authorization requests and registered clients. Secret columns are
//! encrypted per resource through a pluggable [`ValueTransformer`].
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │        Repository Traits (mcpbroker-core)            │
//! ├──────────────────────────────────────────────────────┤
//! │            SQLite Implementations                    │
//! │  (SqliteOAuthTokenRepository, SqlitePendingState..)  │
//! ├──────────────────────────────────────────────────────┤
//! │   FieldCipher  ──►  ValueTransformer per resource    │
//! │                     (AesGcmTransformer)              │
//! ├──────────────────────────────────────────────────────┤
//! │                   Database (SQLite)                  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcpbroker_storage::{
//!     AesGcmTransformer, Database, EncryptionConfig, GroupResource,
//!     SqliteOAuthTokenRepository, SqlitePendingStateRepository,
//! };
//!
//! let db = Arc::new(Mutex::new(Database::open(&path)?));
//! let encryption = EncryptionConfig::new().with_transformer(
//!     GroupResource::oauth_tokens(),
//!     Arc::new(AesGcmTransformer::new(&key)?),
//! );
//!
//! let tokens = SqliteOAuthTokenRepository::new(db.clone(), &encryption);
//! let pending = SqlitePendingStateRepository::new(db.clone(), &encryption);
//! ```

pub mod crypto;
mod database;
pub mod encryption;
mod repositories;

pub use crypto::{generate_master_key, parse_key_hex, AesGcmTransformer, KEY_SIZE};
pub use database::{parse_timestamp, timestamp, Database};
pub use encryption::{
    EncryptionConfig, EncryptionError, FieldCipher, GroupResource, ValueTransformer,
    BROKER_GROUP,
};
pub use repositories::*;

/// Default database file name.
pub const DATABASE_FILE: &str = "mcpbroker.db";

/// Get the default database path for the current platform.
pub fn default_database_path() -> Option<std::path::PathBuf> {
    dirs::data_local_dir().map(|p| p.join("mcpbroker").join(DATABASE_FILE))
}
