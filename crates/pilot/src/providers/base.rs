use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// A remote completion endpoint
#[async_trait]
pub trait Provider: Send + Sync {
    /// Generate the next assistant message for the transcript, offering the given tools
    async fn complete(&self, messages: &[Message], tools: &[Tool]) -> AgentResult<(Message, Usage)>;
}
