use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::config::ServerEntry;
use crate::errors::{AgentError, AgentResult};

/// Launcher for the bridge that fronts a remote MCP endpoint over stdio
pub const BRIDGE_COMMAND: &str = "npx";
pub const BRIDGE_PACKAGE: &str = "mcp-remote";
pub const BRIDGE_USERNAME_ENV: &str = "MCP_REMOTE_USERNAME";
pub const BRIDGE_PASSWORD_ENV: &str = "MCP_REMOTE_PASSWORD";

/// Script kinds that can be launched as a local tool server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Python,
    Node,
}

impl ScriptKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("py") => Some(ScriptKind::Python),
            Some("js") => Some(ScriptKind::Node),
            _ => None,
        }
    }

    pub fn launcher(self) -> &'static str {
        match self {
            ScriptKind::Python => "python",
            ScriptKind::Node => "node",
        }
    }
}

/// Source of credentials that were not given on the command line
pub trait CredentialPrompt {
    fn username(&self) -> AgentResult<String>;
    /// Secret input, masked when attached to a terminal
    fn password(&self) -> AgentResult<String>;
}

/// Credentials supplied up front, e.g. through `--username` / `--password`
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// A fully resolved tool server process
#[derive(Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

impl std::fmt::Debug for LaunchSpec {
    // env may hold a password
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl LaunchSpec {
    pub fn new<S: Into<String>>(command: S, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            env: HashMap::new(),
        }
    }

    pub fn with_env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Launch a local server script with the launcher matching its extension
    pub fn for_script(path: &Path) -> AgentResult<Self> {
        let kind = ScriptKind::from_path(path).ok_or_else(|| {
            AgentError::Connection(format!(
                "server script must be a .py or .js file: {}",
                path.display()
            ))
        })?;
        Ok(Self::new(
            kind.launcher(),
            vec![path.to_string_lossy().into_owned()],
        ))
    }

    /// Resolve a named config entry. A `url` entry goes through the credentialed bridge,
    /// a `command` entry is launched verbatim without asking for anything.
    pub fn for_entry(
        name: &str,
        entry: &ServerEntry,
        credentials: &Credentials,
        prompt: &dyn CredentialPrompt,
    ) -> AgentResult<Self> {
        if let Some(url) = &entry.url {
            if entry.command.is_some() {
                warn!("server '{}' has both url and command, using url", name);
            }
            let username = match &credentials.username {
                Some(username) => username.clone(),
                None => prompt.username()?,
            };
            let password = match &credentials.password {
                Some(password) => password.clone(),
                None => prompt.password()?,
            };
            return Ok(Self::new(
                BRIDGE_COMMAND,
                vec!["-y".to_string(), BRIDGE_PACKAGE.to_string(), url.clone()],
            )
            .with_env(BRIDGE_USERNAME_ENV, username)
            .with_env(BRIDGE_PASSWORD_ENV, password));
        }

        match &entry.command {
            Some(command) => {
                let mut spec = Self::new(command.clone(), entry.args.clone().unwrap_or_default());
                spec.env = entry.env.clone();
                Ok(spec)
            }
            None => Err(AgentError::Configuration(format!(
                "server '{}' needs either a url or a command",
                name
            ))),
        }
    }

    /// The command line, without environment
    pub fn display_command(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
