use tracing::{debug, warn};

use crate::errors::{AgentError, AgentResult};
use crate::mcp::ToolServer;
use crate::models::content::Content;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::ToolCall;
use crate::providers::base::Provider;

/// How the engine goes back to the model after running tools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FollowUp {
    /// One follow-up completion after each tool request, keeping only its first text block.
    /// Tool requests in a follow-up are not run.
    #[default]
    PerTool,
    /// Run every tool request of a response, then make one completion with all results,
    /// repeating until the model answers with text only
    Batched,
}

/// Where a reply currently stands
#[derive(Debug)]
enum State {
    AwaitingModel,
    /// The model asked for tools; holds the response carrying the requests
    AwaitingTool(Message),
    Done,
}

/// Agent drives a completion model through tool calls until it produces an answer
pub struct Agent {
    provider: Box<dyn Provider>,
    follow_up: FollowUp,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: Box<dyn Provider>) -> Self {
        Self {
            provider,
            follow_up: FollowUp::default(),
        }
    }

    pub fn with_follow_up(mut self, follow_up: FollowUp) -> Self {
        self.follow_up = follow_up;
        self
    }

    pub fn follow_up(&self) -> FollowUp {
        self.follow_up
    }

    /// Dispatch a single tool call to the server, if it offers that tool
    async fn dispatch_tool_call(
        &self,
        server: &dyn ToolServer,
        tool_call: &ToolCall,
    ) -> AgentResult<Vec<Content>> {
        if !server.tools().iter().any(|tool| tool.name == tool_call.name) {
            return Err(AgentError::ToolInvocation(format!(
                "unknown tool: {}",
                tool_call.name
            )));
        }

        let result = server.call_tool(tool_call).await?;
        if result.is_error {
            Err(AgentError::ToolExecution(result.text()))
        } else {
            Ok(result.content)
        }
    }

    /// The result to hand back to the model. A failure reported by the tool itself goes to
    /// the model; every other failure aborts the reply.
    async fn tool_result(
        &self,
        server: &dyn ToolServer,
        tool_call: &ToolCall,
    ) -> AgentResult<AgentResult<Vec<Content>>> {
        match self.dispatch_tool_call(server, tool_call).await {
            Ok(content) => Ok(Ok(content)),
            Err(AgentError::ToolExecution(text)) => {
                warn!(tool = %tool_call.name, "tool reported an error: {}", text);
                Ok(Err(AgentError::ToolExecution(text)))
            }
            Err(e) => Err(e),
        }
    }

    async fn complete(&self, server: &dyn ToolServer, transcript: &[Message]) -> AgentResult<Message> {
        let (response, usage) = self.provider.complete(transcript, server.tools()).await?;
        debug!(
            input_tokens = ?usage.input_tokens,
            output_tokens = ?usage.output_tokens,
            "model responded"
        );
        Ok(response)
    }

    /// Walk the response in order; each tool request gets its own follow-up completion
    async fn run_tools_per_tool(
        &self,
        server: &dyn ToolServer,
        transcript: &mut Vec<Message>,
        response: &Message,
        output: &mut Vec<String>,
    ) -> AgentResult<()> {
        for content in &response.content {
            let request = match content {
                MessageContent::ToolRequest(request) => request,
                other => {
                    if let Some(text) = other.as_text() {
                        output.push(text.to_string());
                    }
                    continue;
                }
            };

            transcript.push(Message::assistant().with_content(content.clone()));
            let result = self.tool_result(server, &request.tool_call).await?;
            transcript.push(Message::user().with_tool_response(request.id.clone(), result));
            output.push(request.tool_call.summary());

            let follow_up = self.complete(server, transcript).await?;
            if follow_up.has_tool_request() {
                warn!(
                    after = %request.tool_call.name,
                    "not running tools requested in a follow-up response"
                );
            }
            let first_text = follow_up.texts().next().map(String::from);
            output.extend(first_text);
        }
        Ok(())
    }

    /// Record the whole response, run all of its tools and answer with one message
    async fn run_tools_batched(
        &self,
        server: &dyn ToolServer,
        transcript: &mut Vec<Message>,
        response: Message,
        output: &mut Vec<String>,
    ) -> AgentResult<()> {
        output.extend(response.texts().map(String::from));

        let mut results = Message::user();
        for request in response.tool_requests() {
            let result = self.tool_result(server, &request.tool_call).await?;
            output.push(request.tool_call.summary());
            results = results.with_tool_response(request.id.clone(), result);
        }

        transcript.push(response);
        transcript.push(results);
        Ok(())
    }

    /// Resolve the query at the end of `transcript` and return the answer text.
    ///
    /// Tool requests and their results are appended to `transcript` as they happen. The final
    /// text-only response is not, so the caller decides whether the answer is kept.
    pub async fn reply(
        &self,
        server: &dyn ToolServer,
        transcript: &mut Vec<Message>,
    ) -> AgentResult<String> {
        let mut output: Vec<String> = Vec::new();
        let mut state = State::AwaitingModel;

        loop {
            debug!(?state, "reply step");
            state = match state {
                State::AwaitingModel => {
                    let response = self.complete(server, transcript).await?;
                    if response.has_tool_request() {
                        State::AwaitingTool(response)
                    } else {
                        output.extend(response.texts().map(String::from));
                        State::Done
                    }
                }
                State::AwaitingTool(response) => match self.follow_up {
                    FollowUp::PerTool => {
                        self.run_tools_per_tool(server, transcript, &response, &mut output)
                            .await?;
                        State::Done
                    }
                    FollowUp::Batched => {
                        self.run_tools_batched(server, transcript, response, &mut output)
                            .await?;
                        State::AwaitingModel
                    }
                },
                State::Done => break,
            };
        }

        Ok(output.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::CallToolResult;
    use crate::models::role::Role;
    use crate::models::tool::Tool;
    use crate::providers::mock::MockProvider;
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// In-memory tool server offering `echo` and `fail`
    struct MockToolServer {
        tools: Vec<Tool>,
        calls: Mutex<Vec<ToolCall>>,
    }

    impl MockToolServer {
        fn new() -> Self {
            Self {
                tools: vec![
                    Tool::new(
                        "echo",
                        "Echoes back the input",
                        json!({"type": "object", "properties": {"message": {"type": "string"}}, "required": ["message"]}),
                    ),
                    Tool::new("fail", "Always reports an error", json!({"type": "object"})),
                    Tool::new("broken", "The server cannot run it", json!({"type": "object"})),
                ],
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<ToolCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolServer for MockToolServer {
        fn tools(&self) -> &[Tool] {
            &self.tools
        }

        async fn call_tool(&self, tool_call: &ToolCall) -> AgentResult<CallToolResult> {
            self.calls.lock().unwrap().push(tool_call.clone());
            match tool_call.name.as_str() {
                "echo" => Ok(CallToolResult::success(vec![Content::text(
                    tool_call.arguments["message"].as_str().unwrap_or(""),
                )])),
                "fail" => Ok(CallToolResult::error("boom")),
                _ => Err(AgentError::ToolInvocation(format!(
                    "{}: Internal error (code -32603)",
                    tool_call.name
                ))),
            }
        }
    }

    fn echo(id: &str, message: &str) -> Message {
        Message::assistant().with_tool_request(id, ToolCall::new("echo", json!({"message": message})))
    }

    fn query(text: &str) -> Vec<Message> {
        vec![Message::user().with_text(text)]
    }

    #[tokio::test]
    async fn test_text_only_response() -> Result<()> {
        let provider = MockProvider::new(vec![Message::assistant()
            .with_text("Hello!")
            .with_text("How can I help?")]);
        let requests = provider.requests();
        let agent = Agent::new(Box::new(provider));
        let server = MockToolServer::new();

        let mut transcript = query("Hi");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert_eq!(answer, "Hello!\nHow can I help?");
        assert_eq!(transcript.len(), 1);
        assert_eq!(requests.lock().unwrap().len(), 1);
        assert!(server.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_single_tool_call() -> Result<()> {
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_text("Let me echo that.")
                .with_tool_request("call_1", ToolCall::new("echo", json!({"message": "test"}))),
            Message::assistant().with_text("Done!"),
        ]);
        let requests = provider.requests();
        let agent = Agent::new(Box::new(provider));
        let server = MockToolServer::new();

        let mut transcript = query("Echo test");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert_eq!(
            answer,
            "Let me echo that.\n[Calling tool echo with args {\"message\":\"test\"}]\nDone!"
        );
        assert_eq!(server.calls(), vec![ToolCall::new("echo", json!({"message": "test"}))]);

        // Exactly the request then the result, sharing the id
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[1].role, Role::Assistant);
        let request = transcript[1].content[0].as_tool_request().unwrap();
        assert_eq!(transcript[2].role, Role::User);
        let response = transcript[2].content[0].as_tool_response().unwrap();
        assert_eq!(request.id, "call_1");
        assert_eq!(response.id, request.id);
        assert_eq!(response.tool_result, Ok(vec![Content::text("test")]));

        // One follow-up, made with the extended transcript
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_single_tool_call_batched() -> Result<()> {
        let provider = MockProvider::new(vec![
            echo("call_1", "test"),
            Message::assistant().with_text("Done!"),
        ]);
        let requests = provider.requests();
        let agent = Agent::new(Box::new(provider)).with_follow_up(FollowUp::Batched);
        let server = MockToolServer::new();

        let mut transcript = query("Echo test");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert_eq!(answer, "[Calling tool echo with args {\"message\":\"test\"}]\nDone!");
        assert_eq!(server.calls().len(), 1);
        assert_eq!(transcript.len(), 3);
        assert_eq!(
            transcript[1].content[0].as_tool_request().unwrap().id,
            transcript[2].content[0].as_tool_response().unwrap().id
        );
        assert_eq!(requests.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_follow_up_per_tool() -> Result<()> {
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", ToolCall::new("echo", json!({"message": "first"})))
                .with_tool_request("2", ToolCall::new("echo", json!({"message": "second"}))),
            Message::assistant().with_text("First done").with_text("dropped"),
            Message::assistant().with_text("Second done"),
        ]);
        let requests = provider.requests();
        let agent = Agent::new(Box::new(provider));
        let server = MockToolServer::new();

        let mut transcript = query("Multiple calls");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert_eq!(
            answer.lines().collect::<Vec<_>>(),
            vec![
                "[Calling tool echo with args {\"message\":\"first\"}]",
                "First done",
                "[Calling tool echo with args {\"message\":\"second\"}]",
                "Second done",
            ]
        );
        assert_eq!(requests.lock().unwrap().len(), 3);
        assert_eq!(transcript.len(), 5);
        let ids: Vec<&str> = transcript[1..]
            .iter()
            .map(|message| match &message.content[0] {
                MessageContent::ToolRequest(request) => request.id.as_str(),
                MessageContent::ToolResponse(response) => response.id.as_str(),
                other => panic!("unexpected content {:?}", other),
            })
            .collect();
        assert_eq!(ids, vec!["1", "1", "2", "2"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_multiple_tool_calls_batched() -> Result<()> {
        let provider = MockProvider::new(vec![
            Message::assistant()
                .with_tool_request("1", ToolCall::new("echo", json!({"message": "first"})))
                .with_tool_request("2", ToolCall::new("echo", json!({"message": "second"}))),
            Message::assistant().with_text("All done!"),
        ]);
        let requests = provider.requests();
        let agent = Agent::new(Box::new(provider)).with_follow_up(FollowUp::Batched);
        let server = MockToolServer::new();

        let mut transcript = query("Multiple calls");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert!(answer.ends_with("All done!"));
        assert_eq!(server.calls().len(), 2);
        assert_eq!(requests.lock().unwrap().len(), 2);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[2].content.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_batched_keeps_going_until_text_only() -> Result<()> {
        let provider = MockProvider::new(vec![
            echo("1", "a"),
            echo("2", "b"),
            Message::assistant().with_text("Finished"),
        ]);
        let agent = Agent::new(Box::new(provider)).with_follow_up(FollowUp::Batched);
        let server = MockToolServer::new();

        let mut transcript = query("Chain");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert_eq!(server.calls().len(), 2);
        assert_eq!(transcript.len(), 5);
        assert!(answer.ends_with("Finished"));
        Ok(())
    }

    #[tokio::test]
    async fn test_follow_up_tool_requests_are_not_run() -> Result<()> {
        let provider = MockProvider::new(vec![
            echo("1", "once"),
            echo("2", "twice").with_text("Here you go"),
        ]);
        let agent = Agent::new(Box::new(provider));
        let server = MockToolServer::new();

        let mut transcript = query("Echo once");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert_eq!(server.calls().len(), 1);
        assert!(answer.ends_with("Here you go"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_dispatched() {
        let agent = Agent::new(Box::new(MockProvider::new(vec![Message::assistant()
            .with_tool_request("1", ToolCall::new("invalid_tool", json!({})))])));
        let server = MockToolServer::new();

        let mut transcript = query("Invalid tool");
        let result = agent.reply(&server, &mut transcript).await;

        assert_eq!(
            result,
            Err(AgentError::ToolInvocation("unknown tool: invalid_tool".to_string()))
        );
        assert!(server.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_error_is_reported_to_the_model() -> Result<()> {
        let provider = MockProvider::new(vec![
            Message::assistant().with_tool_request("1", ToolCall::new("fail", json!({}))),
            Message::assistant().with_text("The tool failed."),
        ]);
        let requests = provider.requests();
        let agent = Agent::new(Box::new(provider));
        let server = MockToolServer::new();

        let mut transcript = query("Try it");
        let answer = agent.reply(&server, &mut transcript).await?;

        assert!(answer.ends_with("The tool failed."));
        let response = transcript[2].content[0].as_tool_response().unwrap();
        assert_eq!(
            response.tool_result,
            Err(AgentError::ToolExecution("boom".to_string()))
        );
        assert_eq!(requests.lock().unwrap().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_invocation_failure_aborts() {
        let agent = Agent::new(Box::new(MockProvider::new(vec![
            Message::assistant().with_tool_request("1", ToolCall::new("broken", json!({}))),
            Message::assistant().with_text("never reached"),
        ])));
        let server = MockToolServer::new();

        let mut transcript = query("Break it");
        let result = agent.reply(&server, &mut transcript).await;

        assert!(matches!(result, Err(AgentError::ToolInvocation(_))));
    }

    #[tokio::test]
    async fn test_gateway_error_propagates() {
        let agent = Agent::new(Box::new(MockProvider::with_results(vec![Err(
            AgentError::Gateway("Request failed: 503".to_string()),
        )])));
        let server = MockToolServer::new();

        let mut transcript = query("Hi");
        let result = agent.reply(&server, &mut transcript).await;

        assert_eq!(result, Err(AgentError::Gateway("Request failed: 503".to_string())));
        assert_eq!(transcript.len(), 1);
        assert!(server.calls().is_empty());
    }

    #[test]
    fn test_default_follow_up() {
        let agent = Agent::new(Box::new(MockProvider::new(vec![])));
        assert_eq!(agent.follow_up(), FollowUp::PerTool);
    }
}
