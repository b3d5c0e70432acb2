//! Dependency Injection Container
//!
//! Everything the gateway talks to is injected here, so tests can swap the
//! catalog, the auth checker or the HTTP client without touching handlers.

use std::sync::Arc;

use mcpbroker_core::{
    AuditSink, AuthRequestRepository, McpAuthChecker, OAuthClientRepository,
    OAuthTokenRepository, PendingStateRepository, ServerCatalog, TracingAuditSink,
};
use mcpbroker_storage::{
    Database, EncryptionConfig, SqliteAuthRequestRepository, SqliteOAuthClientRepository,
    SqliteOAuthTokenRepository, SqlitePendingStateRepository,
};
use tokio::sync::Mutex;
use zeroize::Zeroizing;

#[derive(Clone)]
pub struct GatewayDependencies {
    // Repositories
    pub pending_repo: Arc<dyn PendingStateRepository>,
    pub token_repo: Arc<dyn OAuthTokenRepository>,
    pub auth_request_repo: Arc<dyn AuthRequestRepository>,
    pub client_repo: Arc<dyn OAuthClientRepository>,

    // Collaborators
    pub catalog: Arc<dyn ServerCatalog>,
    pub audit: Arc<dyn AuditSink>,
    /// Replaces the grant-based checker when set
    pub auth_checker: Option<Arc<dyn McpAuthChecker>>,

    /// Shared client for upstream token and discovery requests
    pub http_client: reqwest::Client,
    /// HMAC secret for outer-flow tokens
    pub token_secret: Arc<Zeroizing<Vec<u8>>>,
}

/// Builder for GatewayDependencies
#[derive(Default)]
pub struct DependenciesBuilder {
    database: Option<SqliteParts>,
    pending_repo: Option<Arc<dyn PendingStateRepository>>,
    token_repo: Option<Arc<dyn OAuthTokenRepository>>,
    auth_request_repo: Option<Arc<dyn AuthRequestRepository>>,
    client_repo: Option<Arc<dyn OAuthClientRepository>>,
    catalog: Option<Arc<dyn ServerCatalog>>,
    audit: Option<Arc<dyn AuditSink>>,
    auth_checker: Option<Arc<dyn McpAuthChecker>>,
    http_client: Option<reqwest::Client>,
    token_secret: Option<Zeroizing<Vec<u8>>>,
}

impl DependenciesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// SQLite repositories for anything not set explicitly.
    pub fn with_database(mut self, db: Arc<Mutex<Database>>, encryption: EncryptionConfig) -> Self {
        self.database = Some((db, encryption));
        self
    }

    pub fn with_pending_repo(mut self, repo: Arc<dyn PendingStateRepository>) -> Self {
        self.pending_repo = Some(repo);
        self
    }

    pub fn with_token_repo(mut self, repo: Arc<dyn OAuthTokenRepository>) -> Self {
        self.token_repo = Some(repo);
        self
    }

    pub fn with_auth_request_repo(mut self, repo: Arc<dyn AuthRequestRepository>) -> Self {
        self.auth_request_repo = Some(repo);
        self
    }

    pub fn with_client_repo(mut self, repo: Arc<dyn OAuthClientRepository>) -> Self {
        self.client_repo = Some(repo);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn ServerCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_auth_checker(mut self, checker: Arc<dyn McpAuthChecker>) -> Self {
        self.auth_checker = Some(checker);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_token_secret(mut self, secret: Zeroizing<Vec<u8>>) -> Self {
        self.token_secret = Some(secret);
        self
    }

    pub fn build(self) -> Result<GatewayDependencies, String> {
        let database = self.database;
        let pending_repo: Arc<dyn PendingStateRepository> = match self.pending_repo {
            Some(repo) => repo,
            None => {
                let (db, enc) = require_database(&database, "pending_repo")?;
                Arc::new(SqlitePendingStateRepository::new(db.clone(), enc))
            }
        };
        let token_repo: Arc<dyn OAuthTokenRepository> = match self.token_repo {
            Some(repo) => repo,
            None => {
                let (db, enc) = require_database(&database, "token_repo")?;
                Arc::new(SqliteOAuthTokenRepository::new(db.clone(), enc))
            }
        };
        let auth_request_repo: Arc<dyn AuthRequestRepository> = match self.auth_request_repo {
            Some(repo) => repo,
            None => {
                let (db, _) = require_database(&database, "auth_request_repo")?;
                Arc::new(SqliteAuthRequestRepository::new(db.clone()))
            }
        };
        let client_repo: Arc<dyn OAuthClientRepository> = match self.client_repo {
            Some(repo) => repo,
            None => {
                let (db, _) = require_database(&database, "client_repo")?;
                Arc::new(SqliteOAuthClientRepository::new(db.clone()))
            }
        };

        let token_secret = self.token_secret.ok_or("token_secret is required")?;
        if token_secret.is_empty() {
            return Err("token_secret must not be empty".to_string());
        }

        Ok(GatewayDependencies {
            pending_repo,
            token_repo,
            auth_request_repo,
            client_repo,
            catalog: self.catalog.ok_or("catalog is required")?,
            audit: self.audit.unwrap_or_else(|| Arc::new(TracingAuditSink)),
            auth_checker: self.auth_checker,
            http_client: self.http_client.unwrap_or_default(),
            token_secret: Arc::new(token_secret),
        })
    }
}

type SqliteParts = (Arc<Mutex<Database>>, EncryptionConfig);

fn require_database<'a>(
    database: &'a Option<SqliteParts>,
    what: &str,
) -> Result<&'a SqliteParts, String> {
    database
        .as_ref()
        .ok_or_else(|| format!("{} or database is required", what))
}
