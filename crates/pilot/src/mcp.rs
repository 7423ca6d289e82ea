//! Client side of the Model Context Protocol: launching a tool server, discovering its
//! tools and calling them.
use async_trait::async_trait;

use crate::errors::AgentResult;
use crate::models::tool::{Tool, ToolCall};

pub mod client;
pub mod target;
pub mod types;

pub use client::Connector;
pub use target::{CredentialPrompt, Credentials, LaunchSpec};
pub use types::CallToolResult;

/// The capabilities the agent needs from a tool server
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Tools discovered when the connection was established
    fn tools(&self) -> &[Tool];

    /// Run one tool and wait for its result. There is no timeout.
    async fn call_tool(&self, tool_call: &ToolCall) -> AgentResult<CallToolResult>;
}
