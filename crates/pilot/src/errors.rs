use serde::{Deserialize, Serialize};
use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Tool invocation failed: {0}")]
    ToolInvocation(String),

    /// A tool ran but reported failure. Carried back to the model, never aborts a reply.
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Gateway(err.to_string())
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
