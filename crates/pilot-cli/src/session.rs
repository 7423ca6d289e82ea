use anyhow::Result;
use tracing::{debug, info};

use crate::prompt::{InputType, Prompt};
use pilot::agent::Agent;
use pilot::mcp::ToolServer;
use pilot::models::message::Message;
use pilot::models::role::Role;

#[cfg(test)]
mod mock_provider;

/// Stands in for an empty answer so the kept transcript alternates roles
const EMPTY_ANSWER: &str = "(no answer)";

/// How long the transcript lives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TranscriptScope {
    /// Every query starts from a fresh transcript
    #[default]
    PerQuery,
    /// The transcript carries across queries; a failed query is rolled back
    Session,
}

pub struct Session<'a> {
    agent: Agent,
    prompt: Box<dyn Prompt + 'a>,
    server: &'a dyn ToolServer,
    scope: TranscriptScope,
    transcript: Vec<Message>,
}

impl<'a> Session<'a> {
    pub fn new(
        agent: Agent,
        prompt: Box<impl Prompt + 'a>,
        server: &'a dyn ToolServer,
        scope: TranscriptScope,
    ) -> Self {
        Session {
            agent,
            prompt,
            server,
            scope,
            transcript: Vec::new(),
        }
    }

    /// Read queries until the user quits
    pub async fn start(&mut self) -> Result<()> {
        self.prompt.ready(self.server.tools());

        loop {
            let input = self.prompt.get_input()?;
            match input.input_type {
                InputType::Message => {
                    if let Some(query) = input.content {
                        self.process_query(&query).await;
                    }
                }
                InputType::Exit => break,
                InputType::AskAgain => continue,
            }
        }

        info!("session ended");
        self.prompt.close();
        Ok(())
    }

    /// Resolve one query. Failures are shown and leave the transcript as it was.
    async fn process_query(&mut self, query: &str) {
        if self.scope == TranscriptScope::PerQuery {
            self.transcript.clear();
        }
        let checkpoint = self.transcript.len();
        self.transcript.push(Message::user().with_text(query));

        self.prompt.show_busy();
        let result = self.agent.reply(self.server, &mut self.transcript).await;
        self.prompt.hide_busy();

        match result {
            Ok(answer) => {
                let ends_with_user = self.transcript.last().map(|m| m.role) == Some(Role::User);
                if self.scope == TranscriptScope::Session && ends_with_user {
                    // Empty text blocks are not sent, so an empty answer still needs a body
                    let text = if answer.is_empty() { EMPTY_ANSWER } else { answer.as_str() };
                    self.transcript.push(Message::assistant().with_text(text));
                }
                self.prompt.render(&answer);
            }
            Err(e) => {
                debug!(discarded = self.transcript.len() - checkpoint, "rolling back failed query");
                self.transcript.truncate(checkpoint);
                self.prompt.render_error(&e);
            }
        }
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }
}
