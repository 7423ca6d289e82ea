use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use pilot::errors::AgentResult;
use pilot::models::message::Message;
use pilot::models::tool::Tool;
use pilot::providers::base::{Provider, Usage};

/// Stands in for the completion endpoint in session tests. The library's own mock is
/// only compiled for its unit tests.
pub struct MockProvider {
    responses: Arc<Mutex<Vec<AgentResult<Message>>>>,
    requests: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl MockProvider {
    pub fn new(responses: Vec<AgentResult<Message>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Transcripts received so far, one per completion
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
            Ok((Message::assistant().with_text(""), Usage::default()))
        } else {
            responses
                .remove(0)
                .map(|message| (message, Usage::default()))
        }
    }
}
