use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{AgentError, AgentResult};

/// File names looked up in the working directory, in order
pub const LOCAL_CONFIG_FILES: [&str; 2] = [".mcp.json", "mcp-config.json"];
/// Directory under the per-user config dir that holds the fallback config
pub const USER_CONFIG_DIR: &str = "pilot";
pub const USER_CONFIG_FILE: &str = "mcp-config.json";

/// The `mcpServers` configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, ServerEntry>,
}

/// One named server. Either `url` (bridged remote endpoint) or `command` (direct launch)
/// must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl McpConfig {
    /// Read and parse a config file, failing if it is missing or malformed
    pub fn from_file(path: &Path) -> AgentResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AgentError::Configuration(format!("cannot parse {}: {}", path.display(), e))
        })
    }

    /// Load the explicit config file if one is given, otherwise discover one
    pub fn load(explicit: Option<&Path>) -> AgentResult<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let cwd = std::env::current_dir().map_err(|e| {
            AgentError::Configuration(format!("cannot resolve the working directory: {}", e))
        })?;
        let user_dir = dirs::config_dir();
        Ok(Self::discover(&Self::candidate_paths(
            &cwd,
            user_dir.as_deref(),
        )))
    }

    /// The lookup order used when no explicit path is given
    pub fn candidate_paths(cwd: &Path, user_config_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = LOCAL_CONFIG_FILES
            .iter()
            .map(|name| cwd.join(name))
            .collect();
        if let Some(dir) = user_config_dir {
            paths.push(dir.join(USER_CONFIG_DIR).join(USER_CONFIG_FILE));
        }
        paths
    }

    /// The first candidate that exists and parses wins; none gives an empty server map
    pub fn discover(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::from_file(path) {
                Ok(config) => {
                    debug!("loaded MCP server config from {}", path.display());
                    return config;
                }
                Err(e) => warn!("skipping config candidate: {}", e),
            }
        }
        debug!("no MCP server config found, using an empty server map");
        Self::default()
    }

    pub fn server(&self, name: &str) -> AgentResult<&ServerEntry> {
        self.mcp_servers.get(name).ok_or_else(|| {
            AgentError::Configuration(format!("no server named '{}' in mcpServers", name))
        })
    }
}
