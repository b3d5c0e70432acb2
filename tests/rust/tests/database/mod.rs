//! Database integration tests
//!
//! Repository behavior against a real (in-memory or on-disk) SQLite file.

mod auth_requests;
mod pending_state;
