//! Gateway configuration from `MCPBROKER_*` environment variables.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use mcpbroker_storage::{parse_key_hex, KEY_SIZE};
use zeroize::Zeroizing;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_USER_HEADER: &str = "x-mcpbroker-user";
const DEFAULT_PENDING_TTL_SECS: u64 = 30 * 60;

#[derive(Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Public URL used for callback and metadata URLs
    pub base_url: String,
    pub database_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub encryption_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    pub pending_encryption_key: Option<Zeroizing<[u8; KEY_SIZE]>>,
    /// HMAC secret for outer-flow tokens
    pub token_secret: Option<Zeroizing<Vec<u8>>>,
    pub user_header: String,
    pub enable_cors: bool,
    pub log_dir: Option<PathBuf>,
    pub pending_ttl: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let host = "127.0.0.1".to_string();
        Self {
            base_url: format!("http://{}:{}", host, DEFAULT_PORT),
            host,
            port: DEFAULT_PORT,
            database_path: None,
            catalog_path: None,
            encryption_key: None,
            pending_encryption_key: None,
            token_secret: None,
            user_header: DEFAULT_USER_HEADER.to_string(),
            enable_cors: true,
            log_dir: None,
            pending_ttl: Duration::from_secs(DEFAULT_PENDING_TTL_SECS),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let host = get("MCPBROKER_HOST").unwrap_or(defaults.host);
        let port = match get("MCPBROKER_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("invalid MCPBROKER_PORT: {}", port))?,
            None => defaults.port,
        };
        let base_url = get("MCPBROKER_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}:{}", host, port));

        let encryption_key = get("MCPBROKER_ENCRYPTION_KEY")
            .map(|v| parse_key_hex(&v).context("invalid MCPBROKER_ENCRYPTION_KEY"))
            .transpose()?;
        let pending_encryption_key = get("MCPBROKER_PENDING_ENCRYPTION_KEY")
            .map(|v| parse_key_hex(&v).context("invalid MCPBROKER_PENDING_ENCRYPTION_KEY"))
            .transpose()?;
        let token_secret = get("MCPBROKER_TOKEN_SECRET")
            .map(|v| {
                hex::decode(v.trim())
                    .map(Zeroizing::new)
                    .context("MCPBROKER_TOKEN_SECRET must be hex")
            })
            .transpose()?;

        let enable_cors = match get("MCPBROKER_ENABLE_CORS") {
            Some(v) => parse_bool(&v)
                .with_context(|| format!("invalid MCPBROKER_ENABLE_CORS: {}", v))?,
            None => defaults.enable_cors,
        };
        let pending_ttl = match get("MCPBROKER_PENDING_TTL_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .parse()
                    .with_context(|| format!("invalid MCPBROKER_PENDING_TTL_SECS: {}", v))?;
                anyhow::ensure!(secs > 0, "MCPBROKER_PENDING_TTL_SECS must be positive");
                Duration::from_secs(secs)
            }
            None => defaults.pending_ttl,
        };

        Ok(Self {
            host,
            port,
            base_url,
            database_path: get("MCPBROKER_DATABASE_PATH").map(PathBuf::from),
            catalog_path: get("MCPBROKER_CATALOG_PATH").map(PathBuf::from),
            encryption_key,
            pending_encryption_key,
            token_secret,
            user_header: get("MCPBROKER_USER_HEADER")
                .map(|h| h.to_ascii_lowercase())
                .unwrap_or(defaults.user_header),
            enable_cors,
            log_dir: get("MCPBROKER_LOG_DIR").map(PathBuf::from),
            pending_ttl,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn pending_ttl_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.pending_ttl)
            .unwrap_or_else(|_| chrono::Duration::seconds(DEFAULT_PENDING_TTL_SECS as i64))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn redacted<T>(value: &Option<T>) -> &'static str {
    if value.is_some() {
        "[REDACTED]"
    } else {
        "None"
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("database_path", &self.database_path)
            .field("catalog_path", &self.catalog_path)
            .field("encryption_key", &redacted(&self.encryption_key))
            .field(
                "pending_encryption_key",
                &redacted(&self.pending_encryption_key),
            )
            .field("token_secret", &redacted(&self.token_secret))
            .field("user_header", &self.user_header)
            .field("enable_cors", &self.enable_cors)
            .field("log_dir", &self.log_dir)
            .field("pending_ttl", &self.pending_ttl)
            .finish()
    }
}
