//! # McpBroker Core Library
//!
//! Domain types, error taxonomy and data-access traits for the OAuth token
//! broker.
//!
//! ## Modules
//!
//! - `domain` - Grants, pending authorizations, outer auth requests, servers
//! - `error` - Closed set of tagged OAuth errors
//! - `repository` - Storage traits implemented by `mcpbroker-storage`
//! - `service` - Collaborator traits (server catalog, auth checker, audit)

pub mod domain;
pub mod error;
pub mod repository;
pub mod service;

pub use domain::*;
pub use error::{OAuthError, OAuthResult};
pub use repository::*;
pub use service::*;
