//! OAuth integration tests
//!
//! Upstream exchanges run against a wiremock provider; storage is SQLite.

mod composite;
mod dcr;
