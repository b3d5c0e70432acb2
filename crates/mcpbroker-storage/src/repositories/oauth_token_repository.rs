//! SQLite implementation of OAuthTokenRepository.
//!
//! One row per (mcp_id, user_id); a new grant overwrites the previous one
//! even when the URL differs. `access_token`, `refresh_token`, `client_id`
//! and `client_secret` are encrypted with the context `<resource>/<mcp_id>`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use mcpbroker_core::{
    AuthStyle, OAuthClientConfig, OAuthEndpoint, OAuthGrant, OAuthTokenRepository, RepoResult,
    UpstreamToken,
};
use rusqlite::params;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::database::{parse_timestamp, timestamp};
use crate::encryption::{EncryptionConfig, FieldCipher, GroupResource};
use crate::Database;

/// Raw row data extracted from SQLite before decryption.
struct RawTokenRow {
    mcp_id: String,
    user_id: String,
    url: String,
    oauth_auth_request_id: String,
    access_token: String,
    token_type: String,
    refresh_token: String,
    expiry: Option<String>,
    expires_in: i64,
    client_id: String,
    client_secret: String,
    auth_url: String,
    token_url: String,
    auth_style: i64,
    redirect_url: String,
    scopes: String,
    encrypted: bool,
    created_at: String,
    updated_at: String,
}

/// SQLite-backed token store with field-level encryption.
pub struct SqliteOAuthTokenRepository {
    db: Arc<Mutex<Database>>,
    cipher: FieldCipher,
}

impl SqliteOAuthTokenRepository {
    pub fn new(db: Arc<Mutex<Database>>, encryption: &EncryptionConfig) -> Self {
        Self {
            db,
            cipher: FieldCipher::new(GroupResource::oauth_tokens(), encryption),
        }
    }

    const SELECT_COLUMNS: &'static str = "mcp_id, user_id, url, oauth_auth_request_id, access_token, token_type, \
         refresh_token, expiry, expires_in, client_id, client_secret, auth_url, token_url, auth_style, \
         redirect_url, scopes, encrypted, created_at, updated_at";

    fn extract_row(row: &rusqlite::Row) -> rusqlite::Result<RawTokenRow> {
        Ok(RawTokenRow {
            mcp_id: row.get(0)?,
            user_id: row.get(1)?,
            url: row.get(2)?,
            oauth_auth_request_id: row.get(3)?,
            access_token: row.get(4)?,
            token_type: row.get(5)?,
            refresh_token: row.get(6)?,
            expiry: row.get(7)?,
            expires_in: row.get(8)?,
            client_id: row.get(9)?,
            client_secret: row.get(10)?,
            auth_url: row.get(11)?,
            token_url: row.get(12)?,
            auth_style: row.get(13)?,
            redirect_url: row.get(14)?,
            scopes: row.get(15)?,
            encrypted: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }

    fn build_grant(&self, mut row: RawTokenRow) -> Result<OAuthGrant> {
        let context = self.cipher.resource_context(&row.mcp_id);
        self.cipher.decrypt_fields(
            &context,
            row.encrypted,
            &mut [
                ("access_token", &mut row.access_token),
                ("refresh_token", &mut row.refresh_token),
                ("client_id", &mut row.client_id),
                ("client_secret", &mut row.client_secret),
            ],
        )?;

        Ok(OAuthGrant {
            mcp_id: row.mcp_id,
            user_id: row.user_id,
            url: row.url,
            oauth_auth_request_id: row.oauth_auth_request_id,
            access_token: row.access_token,
            token_type: row.token_type,
            refresh_token: row.refresh_token,
            expiry: row.expiry.as_deref().map(parse_timestamp).transpose()?,
            expires_in: row.expires_in,
            client_id: row.client_id,
            client_secret: row.client_secret,
            endpoint: OAuthEndpoint {
                auth_url: row.auth_url,
                token_url: row.token_url,
                auth_style: AuthStyle::from_i64(row.auth_style),
            },
            redirect_url: row.redirect_url,
            scopes: row.scopes,
            encrypted: false,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }

    async fn upsert(&self, grant: &OAuthGrant) -> Result<()> {
        let mut access_token = grant.access_token.clone();
        let mut refresh_token = grant.refresh_token.clone();
        let mut client_id = grant.client_id.clone();
        let mut client_secret = grant.client_secret.clone();

        let context = self.cipher.resource_context(&grant.mcp_id);
        let encrypted = self.cipher.encrypt_fields(
            &context,
            &mut [
                ("access_token", &mut access_token),
                ("refresh_token", &mut refresh_token),
                ("client_id", &mut client_id),
                ("client_secret", &mut client_secret),
            ],
        )?;

        let db = self.db.lock().await;
        db.connection().execute(
            "INSERT INTO mcp_oauth_tokens (mcp_id, user_id, url, oauth_auth_request_id, access_token, token_type,
                refresh_token, expiry, expires_in, client_id, client_secret, auth_url, token_url, auth_style,
                redirect_url, scopes, encrypted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
             ON CONFLICT(mcp_id, user_id) DO UPDATE SET
                url = excluded.url,
                oauth_auth_request_id = excluded.oauth_auth_request_id,
                access_token = excluded.access_token,
                token_type = excluded.token_type,
                refresh_token = excluded.refresh_token,
                expiry = excluded.expiry,
                expires_in = excluded.expires_in,
                client_id = excluded.client_id,
                client_secret = excluded.client_secret,
                auth_url = excluded.auth_url,
                token_url = excluded.token_url,
                auth_style = excluded.auth_style,
                redirect_url = excluded.redirect_url,
                scopes = excluded.scopes,
                encrypted = excluded.encrypted,
                updated_at = excluded.updated_at",
            params![
                grant.mcp_id,
                grant.user_id,
                grant.url,
                grant.oauth_auth_request_id,
                access_token,
                grant.token_type,
                refresh_token,
                grant.expiry.as_ref().map(timestamp),
                grant.expires_in,
                client_id,
                client_secret,
                grant.endpoint.auth_url,
                grant.endpoint.token_url,
                grant.endpoint.auth_style.as_i64(),
                grant.redirect_url,
                grant.scopes,
                encrypted,
                timestamp(&grant.created_at),
                timestamp(&grant.updated_at),
            ],
        )?;

        Ok(())
    }
}

#[async_trait]
impl OAuthTokenRepository for SqliteOAuthTokenRepository {
    async fn replace(
        &self,
        user_id: &str,
        mcp_id: &str,
        url: &str,
        oauth_auth_request_id: &str,
        config: &OAuthClientConfig,
        token: &UpstreamToken,
    ) -> RepoResult<()> {
        let grant =
            OAuthGrant::from_exchange(user_id, mcp_id, url, oauth_auth_request_id, config, token);
        self.upsert(&grant).await?;
        debug!("[Tokens] Stored grant for mcp={} user={}", mcp_id, user_id);
        Ok(())
    }

    async fn save(&self, grant: &OAuthGrant) -> RepoResult<()> {
        self.upsert(grant).await
    }

    async fn get(&self, user_id: &str, mcp_id: &str, url: &str) -> RepoResult<Option<OAuthGrant>> {
        let db = self.db.lock().await;
        let mut stmt = db.connection().prepare(&format!(
            "SELECT {} FROM mcp_oauth_tokens WHERE mcp_id = ?1 AND user_id = ?2",
            Self::SELECT_COLUMNS
        ))?;
        let mut rows = stmt
            .query_map(params![mcp_id, user_id], Self::extract_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(db);

        if let Some(pos) = rows.iter().position(|r| r.url == url) {
            return Ok(Some(self.build_grant(rows.swap_remove(pos))?));
        }

        // Compatibility shim for grants stored before the server URL was
        // tracked (or after it changed): a single row for (mcp_id, user_id) is
        // treated as the default. Heuristic only; do not rely on it in new code.
        if rows.len() == 1 {
            if let Some(row) = rows.pop() {
                warn!(
                    "[Tokens] No grant for exact URL on mcp={}, using the only stored grant",
                    mcp_id
                );
                return Ok(Some(self.build_grant(row)?));
            }
        }

        Ok(None)
    }

    async fn delete_for_url(&self, user_id: &str, mcp_id: &str, url: &str) -> RepoResult<()> {
        let db = self.db.lock().await;
        // Rows stored without a URL belong to every URL of the server
        db.connection().execute(
            "DELETE FROM mcp_oauth_tokens WHERE mcp_id = ?1 AND user_id = ?2 AND (url = ?3 OR url = '')",
            params![mcp_id, user_id, url],
        )?;
        Ok(())
    }

    async fn delete_all(&self, user_id: &str, mcp_id: &str) -> RepoResult<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "DELETE FROM mcp_oauth_tokens WHERE mcp_id = ?1 AND user_id = ?2",
            params![mcp_id, user_id],
        )?;
        Ok(())
    }

    async fn delete_for_all_users(&self, mcp_id: &str) -> RepoResult<()> {
        let db = self.db.lock().await;
        db.connection().execute(
            "DELETE FROM mcp_oauth_tokens WHERE mcp_id = ?1",
            params![mcp_id],
        )?;
        Ok(())
    }
}
