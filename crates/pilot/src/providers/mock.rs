use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// A mock provider that returns pre-configured responses and records what it was sent
pub struct MockProvider {
    responses: Arc<Mutex<Vec<AgentResult<Message>>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Responses may include failures, returned in order
    pub fn with_results(responses: Vec<AgentResult<Message>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the transcripts seen by each call, usable after the provider moves
    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<Message>>>> {
        self.requests.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, messages: &[Message], _tools: &[Tool]) -> AgentResult<(Message, Usage)> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Return empty response if no more pre-configured responses
            Ok((Message::assistant().with_text(""), Usage::default()))
        } else {
            responses
                .remove(0)
                .map(|message| (message, Usage::default()))
        }
    }
}
