//! JSON-file server catalog.
//!
//! ```json
//! {"servers": [
//!   {"id": "comp1", "runtime": "composite",
//!    "compositeConfig": {"componentServers": [{"catalogEntryID": "e1"}]}},
//!   {"id": "c1", "catalogEntryID": "e1", "runtime": "remote",
//!    "compositeName": "comp1", "url": "https://mcp.example.com/mcp",
//!    "oauth": {"clientID": "abc", "scopes": ["read"]}}
//! ]}
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mcpbroker_core::{
    McpServer, OAuthError, OAuthResult, ServerCatalog, ServerConfig, UpstreamOAuthSettings,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    servers: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    #[serde(flatten)]
    server: McpServer,
    #[serde(default)]
    url: String,
    #[serde(default)]
    oauth: Option<UpstreamOAuthSettings>,
}

/// Catalog loaded once at startup. Order of the file is preserved.
#[derive(Debug, Default)]
pub struct StaticServerCatalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
}

impl StaticServerCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        let catalog = Self::from_json(&raw)
            .with_context(|| format!("invalid catalog {}", path.display()))?;
        info!(
            "[Gateway] Loaded {} server(s) from {}",
            catalog.entries.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw)?;
        let mut index = HashMap::new();
        for (i, entry) in file.servers.iter().enumerate() {
            if index.insert(entry.server.id.clone(), i).is_some() {
                anyhow::bail!("duplicate server id {}", entry.server.id);
            }
        }
        Ok(Self {
            entries: file.servers,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, id: &str) -> OAuthResult<&CatalogEntry> {
        self.index
            .get(id)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| OAuthError::not_found(format!("MCP server {}", id)))
    }
}

#[async_trait]
impl ServerCatalog for StaticServerCatalog {
    async fn server_for_action(&self, mcp_id: &str) -> OAuthResult<McpServer> {
        Ok(self.entry(mcp_id)?.server.clone())
    }

    async fn server_config_for_action(&self, server: &McpServer) -> OAuthResult<ServerConfig> {
        let entry = self.entry(&server.id)?;
        Ok(ServerConfig {
            url: entry.url.clone(),
            oauth: entry.oauth.clone(),
        })
    }

    async fn component_servers(&self, composite: &McpServer) -> OAuthResult<Vec<McpServer>> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.server.composite_name.as_deref() == Some(composite.id.as_str()))
            .map(|e| e.server.clone())
            .collect())
    }
}
