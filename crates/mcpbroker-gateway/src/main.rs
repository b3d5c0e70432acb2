//! `mcpbroker` binary: configuration from the environment, SQLite storage,
//! static server catalog.

use std::sync::Arc;

use anyhow::{Context, Result};
use mcpbroker_gateway::{
    logging, DependenciesBuilder, GatewayConfig, GatewayServer, StaticServerCatalog,
};
use mcpbroker_storage::{
    default_database_path, AesGcmTransformer, Database, EncryptionConfig, GroupResource,
};
use rand::RngCore;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    let config = GatewayConfig::from_env()?;
    // Dropping the guard stops file logging
    let _log_guard = logging::init_tracing(config.log_dir.as_deref());
    info!("Starting McpBroker v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("{:?}", config);

    let db_path = match config.database_path.clone() {
        Some(path) => path,
        None => default_database_path().context("no data directory for the database")?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    info!("Opening database at {:?}", db_path);
    let db = Arc::new(Mutex::new(Database::open(&db_path)?));

    let encryption = encryption_config(&config)?;

    let token_secret = match config.token_secret.clone() {
        Some(secret) => secret,
        None => {
            warn!("[Gateway] MCPBROKER_TOKEN_SECRET not set; issued tokens will not survive a restart");
            let mut secret = Zeroizing::new(vec![0u8; 32]);
            rand::thread_rng().fill_bytes(secret.as_mut_slice());
            secret
        }
    };

    let catalog = match &config.catalog_path {
        Some(path) => StaticServerCatalog::load(path)?,
        None => {
            warn!("[Gateway] MCPBROKER_CATALOG_PATH not set; no servers are known");
            StaticServerCatalog::default()
        }
    };
    info!("[Gateway] Catalog holds {} server(s)", catalog.len());

    let dependencies = DependenciesBuilder::new()
        .with_database(db, encryption)
        .with_catalog(Arc::new(catalog))
        .with_token_secret(token_secret)
        .build()
        .map_err(anyhow::Error::msg)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for ctrl-c: {}", e),
        }
        shutdown.cancel();
    });

    GatewayServer::new(config, dependencies).run(cancel).await
}

/// Token secrets use the main key; pending state uses its own key when set.
fn encryption_config(config: &GatewayConfig) -> Result<EncryptionConfig> {
    let mut encryption = EncryptionConfig::new();
    let Some(key) = &config.encryption_key else {
        warn!("[Gateway] MCPBROKER_ENCRYPTION_KEY not set; secrets are stored in plaintext");
        return Ok(encryption);
    };

    let main = Arc::new(AesGcmTransformer::new(key)?);
    encryption = encryption.with_transformer(GroupResource::oauth_tokens(), main.clone());

    let pending = match &config.pending_encryption_key {
        Some(pending_key) => Arc::new(AesGcmTransformer::new(pending_key)?),
        None => main,
    };
    Ok(encryption.with_transformer(GroupResource::pending_states(), pending))
}
