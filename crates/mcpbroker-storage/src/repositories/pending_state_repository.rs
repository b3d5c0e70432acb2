//! SQLite implementation of PendingStateRepository.
//!
//! Rows are keyed by SHA-256(state). `state`, `verifier`, `client_id` and
//! `client_secret` are encrypted with the pending-state resource context
//! `<resource>/<hashed_state>`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use mcpbroker_core::{
    AuthStyle, OAuthClientConfig, OAuthEndpoint, PendingAuthorization, PendingStateRepository,
    RepoResult,
};
use rusqlite::{params, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;

use crate::database::{parse_timestamp, timestamp};
use crate::encryption::{EncryptionConfig, FieldCipher, GroupResource};
use crate::Database;

/// Raw row data extracted from SQLite before decryption.
struct RawPendingRow {
    hashed_state: String,
    state: String,
    verifier: String,
    code_challenge: String,
    user_id: String,
    mcp_id: String,
    url: String,
    oauth_auth_request_id: String,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    auth_style: i64,
    redirect_url: String,
    scopes: String,
    encrypted: bool,
    created_at: String,
}

/// SQLite-backed pending-state store.
pub struct SqlitePendingStateRepository {
    db: Arc<Mutex<Database>>,
    cipher: FieldCipher,
}

impl SqlitePendingStateRepository {
    /// Pending states use their own transformer if configured, otherwise the
    /// token transformer.
    pub fn new(db: Arc<Mutex<Database>>, encryption: &EncryptionConfig) -> Self {
        Self {
            db,
            cipher: FieldCipher::with_fallback(
                GroupResource::pending_states(),
                &GroupResource::oauth_tokens(),
                encryption,
            ),
        }
    }

    const SELECT_COLUMNS: &'static str = "hashed_state, state, verifier, code_challenge, user_id, mcp_id, url, \
         oauth_auth_request_id, client_id, client_secret, auth_url, token_url, auth_style, \
         redirect_url, scopes, encrypted, created_at";

    fn extract_row(row: &rusqlite::Row) -> rusqlite::Result<RawPendingRow> {
        Ok(RawPendingRow {
            hashed_state: row.get(0)?,
            state: row.get(1)?,
            verifier: row.get(2)?,
            code_challenge: row.get(3)?,
            user_id: row.get(4)?,
            mcp_id: row.get(5)?,
            url: row.get(6)?,
            oauth_auth_request_id: row.get(7)?,
            client_id: row.get(8)?,
            client_secret: row.get(9)?,
            auth_url: row.get(10)?,
            token_url: row.get(11)?,
            auth_style: row.get(12)?,
            redirect_url: row.get(13)?,
            scopes: row.get(14)?,
            encrypted: row.get(15)?,
            created_at: row.get(16)?,
        })
    }

    fn build_pending(&self, mut row: RawPendingRow) -> Result<PendingAuthorization> {
        let context = self.cipher.resource_context(&row.hashed_state);
        self.cipher.decrypt_fields(
            &context,
            row.encrypted,
            &mut [
                ("state", &mut row.state),
                ("verifier", &mut row.verifier),
                ("client_id", &mut row.client_id),
                ("client_secret", &mut row.client_secret),
            ],
        )?;

        Ok(PendingAuthorization {
            hashed_state: row.hashed_state,
            state: row.state,
            verifier: row.verifier,
            code_challenge: row.code_challenge,
            user_id: row.user_id,
            mcp_id: row.mcp_id,
            url: row.url,
            oauth_auth_request_id: row.oauth_auth_request_id,
            config: OAuthClientConfig {
                client_id: row.client_id,
                client_secret: row.client_secret,
                endpoint: OAuthEndpoint {
                    auth_url: row.auth_url,
                    token_url: row.token_url,
                    auth_style: AuthStyle::from_i64(row.auth_style),
                },
                redirect_url: row.redirect_url,
                scopes: OAuthClientConfig::split_scopes(&row.scopes),
            },
            // Decrypted in memory; the flag describes the stored form
            encrypted: false,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }

    fn select_by_hash(
        &self,
        conn: &rusqlite::Connection,
        hashed_state: &str,
    ) -> Result<Option<PendingAuthorization>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM mcp_oauth_pending_states WHERE hashed_state = ?1",
                    Self::SELECT_COLUMNS
                ),
                params![hashed_state],
                Self::extract_row,
            )
            .optional()?;

        row.map(|raw| self.build_pending(raw)).transpose()
    }
}

#[async_trait]
impl PendingStateRepository for SqlitePendingStateRepository {
    async fn create(&self, pending: &PendingAuthorization) -> RepoResult<()> {
        let mut state = pending.state.clone();
        let mut verifier = pending.verifier.clone();
        let mut client_id = pending.config.client_id.clone();
        let mut client_secret = pending.config.client_secret.clone();

        let context = self.cipher.resource_context(&pending.hashed_state);
        let encrypted = self.cipher.encrypt_fields(
            &context,
            &mut [
                ("state", &mut state),
                ("verifier", &mut verifier),
                ("client_id", &mut client_id),
                ("client_secret", &mut client_secret),
            ],
        )?;

        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT INTO mcp_oauth_pending_states (hashed_state, state, verifier, code_challenge, user_id, mcp_id, url,
                oauth_auth_request_id, client_id, client_secret, auth_url, token_url, auth_style, redirect_url,
                scopes, encrypted, claimed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 0, ?17)",
            params![
                pending.hashed_state,
                state,
                verifier,
                pending.code_challenge,
                pending.user_id,
                pending.mcp_id,
                pending.url,
                pending.oauth_auth_request_id,
                client_id,
                client_secret,
                pending.config.endpoint.auth_url,
                pending.config.endpoint.token_url,
                pending.config.endpoint.auth_style.as_i64(),
                pending.config.redirect_url,
                pending.config.scopes_joined(),
                encrypted,
                timestamp(&pending.created_at),
            ],
        )?;

        debug!(
            "[PendingState] Created {} for mcp={} user={}",
            pending.short_hash(),
            pending.mcp_id,
            pending.user_id
        );
        Ok(())
    }

    async fn get(&self, state: &str) -> RepoResult<Option<PendingAuthorization>> {
        let hashed_state = PendingAuthorization::hash_state(state);
        let db = self.db.lock().await;
        self.select_by_hash(db.connection(), &hashed_state)
    }

    async fn claim(&self, state: &str) -> RepoResult<Option<PendingAuthorization>> {
        let hashed_state = PendingAuthorization::hash_state(state);
        let db = self.db.lock().await;

        db.transaction(|conn| {
            let updated = conn.execute(
                "UPDATE mcp_oauth_pending_states SET claimed = 1 WHERE hashed_state = ?1 AND claimed = 0",
                params![hashed_state],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            self.select_by_hash(conn, &hashed_state)
        })
    }

    async fn find_active(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        max_age: Duration,
    ) -> RepoResult<Option<PendingAuthorization>> {
        let cutoff = timestamp(&(Utc::now() - max_age));
        let db = self.db.lock().await;

        let row = db
            .connection()
            .query_row(
                &format!(
                    "SELECT {} FROM mcp_oauth_pending_states
                     WHERE user_id = ?1 AND mcp_id = ?2 AND url = ?3 AND oauth_auth_request_id = ?4
                       AND claimed = 0 AND created_at > ?5
                     ORDER BY created_at DESC LIMIT 1",
                    Self::SELECT_COLUMNS
                ),
                params![user_id, mcp_id, url, oauth_auth_request_id, cutoff],
                Self::extract_row,
            )
            .optional()?;

        row.map(|raw| self.build_pending(raw)).transpose()
    }

    async fn release(&self, hashed_state: &str) -> RepoResult<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "UPDATE mcp_oauth_pending_states SET claimed = 0 WHERE hashed_state = ?1",
            params![hashed_state],
        )?;
        Ok(())
    }

    async fn delete(&self, hashed_state: &str) -> RepoResult<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "DELETE FROM mcp_oauth_pending_states WHERE hashed_state = ?1",
            params![hashed_state],
        )?;
        Ok(())
    }

    async fn cleanup(&self, older_than: Duration) -> RepoResult<usize> {
        let cutoff = timestamp(&(Utc::now() - older_than));
        let db = self.db.lock().await;
        let deleted = db.connection().execute(
            "DELETE FROM mcp_oauth_pending_states WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok(deleted)
    }
}
