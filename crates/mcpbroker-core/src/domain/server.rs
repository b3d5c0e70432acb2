//! MCP server descriptions consumed from the server catalog.

use serde::{Deserialize, Serialize};

use super::AuthStyle;

/// How an MCP server is run. Only `Remote` servers need upstream OAuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeType {
    #[default]
    Remote,
    Containerized,
    Npx,
    Uvx,
    Composite,
}

/// Per-component entry in a composite server's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentServerConfig {
    #[serde(rename = "catalogEntryID")]
    pub catalog_entry_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Component list of a composite server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeConfig {
    #[serde(default)]
    pub component_servers: Vec<ComponentServerConfig>,
}

impl CompositeConfig {
    /// Whether the component for `catalog_entry_id` is enabled.
    ///
    /// Components not listed in the configuration default to enabled.
    pub fn is_component_enabled(&self, catalog_entry_id: &str) -> bool {
        self.component_servers
            .iter()
            .find(|c| c.catalog_entry_id == catalog_entry_id)
            .map(|c| c.enabled)
            .unwrap_or(true)
    }
}

/// An MCP server instance as known to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServer {
    pub id: String,
    #[serde(rename = "catalogEntryID", default)]
    pub catalog_entry_id: String,
    #[serde(default)]
    pub runtime: RuntimeType,
    /// ID of the composite server this instance is a component of.
    #[serde(default)]
    pub composite_name: Option<String>,
    #[serde(default)]
    pub composite_config: Option<CompositeConfig>,
}

impl McpServer {
    pub fn is_remote(&self) -> bool {
        self.runtime == RuntimeType::Remote
    }

    pub fn is_composite(&self) -> bool {
        self.runtime == RuntimeType::Composite
    }

    /// Whether a component server is enabled in this (composite) server's config.
    pub fn component_enabled(&self, component: &McpServer) -> bool {
        self.composite_config
            .as_ref()
            .map(|c| c.is_component_enabled(&component.catalog_entry_id))
            .unwrap_or(true)
    }
}

/// Upstream OAuth settings for a remote server.
///
/// `auth_url`/`token_url` may be omitted and discovered from `issuer`
/// (or the server URL's origin).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamOAuthSettings {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(rename = "authURL", default)]
    pub auth_url: Option<String>,
    #[serde(rename = "tokenURL", default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub auth_style: AuthStyle,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub issuer: Option<String>,
}

/// Connection details resolved for a server.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    #[serde(default)]
    pub oauth: Option<UpstreamOAuthSettings>,
}

/// Outstanding authorization for one component of a composite server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeComponentStatus {
    #[serde(rename = "catalogEntryID")]
    pub catalog_entry_id: String,
    #[serde(rename = "mcpServerID")]
    pub mcp_server_id: String,
    #[serde(rename = "authURL", skip_serializing_if = "String::is_empty", default)]
    pub auth_url: String,
}
