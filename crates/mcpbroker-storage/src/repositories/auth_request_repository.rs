//! SQLite implementation of AuthRequestRepository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use mcpbroker_core::{AuthRequestRepository, OAuthAuthRequest, RepoResult};
use rusqlite::{params, types::Type, OptionalExtension};
use tokio::sync::Mutex;

use crate::database::{parse_timestamp, timestamp};
use crate::Database;

/// SQLite-backed store of outer authorization requests.
pub struct SqliteAuthRequestRepository {
    db: Arc<Mutex<Database>>,
}

impl SqliteAuthRequestRepository {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }

    const SELECT_COLUMNS: &'static str = "id, mcp_id, user_id, client_id, redirect_uri, state, \
         code_challenge, code_challenge_method, scope, hashed_auth_code, created_at";

    fn extract_row(row: &rusqlite::Row) -> rusqlite::Result<OAuthAuthRequest> {
        let created_at: String = row.get(10)?;
        Ok(OAuthAuthRequest {
            id: row.get(0)?,
            mcp_id: row.get(1)?,
            user_id: row.get(2)?,
            client_id: row.get(3)?,
            redirect_uri: row.get(4)?,
            state: row.get(5)?,
            code_challenge: row.get(6)?,
            code_challenge_method: row.get(7)?,
            scope: row.get(8)?,
            hashed_auth_code: row.get(9)?,
            created_at: parse_timestamp(&created_at).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(10, Type::Text, e.into())
            })?,
        })
    }
}

#[async_trait]
impl AuthRequestRepository for SqliteAuthRequestRepository {
    async fn create(&self, request: &OAuthAuthRequest) -> RepoResult<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT INTO oauth_auth_requests (id, mcp_id, user_id, client_id, redirect_uri, state,
                code_challenge, code_challenge_method, scope, hashed_auth_code, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                request.id,
                request.mcp_id,
                request.user_id,
                request.client_id,
                request.redirect_uri,
                request.state,
                request.code_challenge,
                request.code_challenge_method,
                request.scope,
                request.hashed_auth_code,
                timestamp(&request.created_at),
            ],
        )?;
        Ok(())
    }

    async fn get(&self, id: &str) -> RepoResult<Option<OAuthAuthRequest>> {
        let db = self.db.lock().await;
        let row = db
            .connection()
            .query_row(
                &format!(
                    "SELECT {} FROM oauth_auth_requests WHERE id = ?1",
                    Self::SELECT_COLUMNS
                ),
                params![id],
                Self::extract_row,
            )
            .optional()?;
        Ok(row)
    }

    async fn set_hashed_auth_code(&self, id: &str, hashed_code: &str) -> RepoResult<bool> {
        let db = self.db.lock().await;
        let updated = db.connection().execute(
            "UPDATE oauth_auth_requests SET hashed_auth_code = ?1 WHERE id = ?2",
            params![hashed_code, id],
        )?;
        Ok(updated > 0)
    }

    async fn consume_auth_code(
        &self,
        mcp_id: &str,
        hashed_code: &str,
    ) -> RepoResult<Option<OAuthAuthRequest>> {
        let db = self.db.lock().await;
        let row = db.transaction(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM oauth_auth_requests WHERE mcp_id = ?1 AND hashed_auth_code = ?2",
                        Self::SELECT_COLUMNS
                    ),
                    params![mcp_id, hashed_code],
                    Self::extract_row,
                )
                .optional()?;
            if row.is_some() {
                conn.execute(
                    "UPDATE oauth_auth_requests SET hashed_auth_code = NULL WHERE hashed_auth_code = ?1",
                    params![hashed_code],
                )?;
            }
            Ok(row)
        })?;
        Ok(row)
    }

    async fn delete(&self, id: &str) -> RepoResult<()> {
        let db = self.db.lock().await;
        db.connection()
            .execute("DELETE FROM oauth_auth_requests WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn cleanup(&self, older_than: Duration) -> RepoResult<usize> {
        let cutoff = timestamp(&(Utc::now() - older_than));
        let db = self.db.lock().await;
        let removed = db.connection().execute(
            "DELETE FROM oauth_auth_requests WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}
