//! SQLite implementation of OAuthClientRepository.
//!
//! List-valued client metadata is stored as JSON text.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mcpbroker_core::{OAuthClientRepository, RegisteredClient, RepoResult};
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;

use crate::database::{parse_timestamp, timestamp};
use crate::Database;

struct RawClientRow {
    client_id: String,
    mcp_id: String,
    client_name: String,
    redirect_uris: String,
    grant_types: String,
    response_types: String,
    token_endpoint_auth_method: String,
    scope: Option<String>,
    registration_access_token_hash: String,
    created_at: String,
    updated_at: String,
}

/// SQLite-backed store of dynamically registered clients.
pub struct SqliteOAuthClientRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteOAuthClientRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    fn extract_row(row: &rusqlite::Row) -> rusqlite::Result<RawClientRow> {
        Ok(RawClientRow {
            client_id: row.get(0)?,
            mcp_id: row.get(1)?,
            client_name: row.get(2)?,
            redirect_uris: row.get(3)?,
            grant_types: row.get(4)?,
            response_types: row.get(5)?,
            token_endpoint_auth_method: row.get(6)?,
            scope: row.get(7)?,
            registration_access_token_hash: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn build_client(row: RawClientRow) -> Result<RegisteredClient> {
        Ok(RegisteredClient {
            client_id: row.client_id,
            mcp_id: row.mcp_id,
            client_name: row.client_name,
            redirect_uris: serde_json::from_str(&row.redirect_uris)?,
            grant_types: serde_json::from_str(&row.grant_types)?,
            response_types: serde_json::from_str(&row.response_types)?,
            token_endpoint_auth_method: row.token_endpoint_auth_method,
            scope: row.scope,
            registration_access_token_hash: row.registration_access_token_hash,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[async_trait]
impl OAuthClientRepository for SqliteOAuthClientRepository {
    async fn save(&self, client: &RegisteredClient) -> RepoResult<()> {
        let redirect_uris = serde_json::to_string(&client.redirect_uris)?;
        let grant_types = serde_json::to_string(&client.grant_types)?;
        let response_types = serde_json::to_string(&client.response_types)?;

        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT INTO oauth_clients (client_id, mcp_id, client_name, redirect_uris, grant_types,
                response_types, token_endpoint_auth_method, scope, registration_access_token_hash,
                created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(client_id) DO UPDATE SET
                client_name = excluded.client_name,
                redirect_uris = excluded.redirect_uris,
                grant_types = excluded.grant_types,
                response_types = excluded.response_types,
                token_endpoint_auth_method = excluded.token_endpoint_auth_method,
                scope = excluded.scope,
                registration_access_token_hash = excluded.registration_access_token_hash,
                updated_at = excluded.updated_at",
            params![
                client.client_id,
                client.mcp_id,
                client.client_name,
                redirect_uris,
                grant_types,
                response_types,
                client.token_endpoint_auth_method,
                client.scope,
                client.registration_access_token_hash,
                timestamp(&client.created_at),
                timestamp(&client.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn get(&self, client_id: &str) -> RepoResult<Option<RegisteredClient>> {
        let row = {
            let db = self.db.lock().await;
            db.connection()
                .query_row(
                    "SELECT client_id, mcp_id, client_name, redirect_uris, grant_types, response_types,
                        token_endpoint_auth_method, scope, registration_access_token_hash,
                        created_at, updated_at
                     FROM oauth_clients WHERE client_id = ?1",
                    params![client_id],
                    Self::extract_row,
                )
                .optional()?
        };
        row.map(Self::build_client).transpose()
    }

    async fn delete(&self, client_id: &str) -> RepoResult<bool> {
        let db = self.db.lock().await;
        let removed = db.connection().execute(
            "DELETE FROM oauth_clients WHERE client_id = ?1",
            params![client_id],
        )?;
        Ok(removed > 0)
    }
}
