use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::debug;

use super::base::Usage;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::{Content, ImageContent};
use crate::models::message::{Message, MessageContent};
use crate::models::tool::{Tool, ToolCall};

fn convert_image(image: &ImageContent) -> Value {
    json!({
        "type": "image",
        "source": {
            "type": "base64",
            "media_type": image.mime_type,
            "data": image.data,
        }
    })
}

fn content_to_anthropic_block(content: &Content) -> Value {
    match content {
        Content::Text(text) => json!({"type": "text", "text": text.text}),
        Content::Image(image) => convert_image(image),
    }
}

/// Convert internal Message format to Anthropic's messages specification
pub fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut blocks = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    // The API rejects empty text blocks
                    if !text.text.is_empty() {
                        blocks.push(json!({"type": "text", "text": text.text}));
                    }
                }
                MessageContent::Image(image) => blocks.push(convert_image(image)),
                MessageContent::ToolRequest(request) => {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": request.id,
                        "name": request.tool_call.name,
                        "input": request.tool_call.arguments,
                    }));
                }
                MessageContent::ToolResponse(response) => match &response.tool_result {
                    Ok(contents) => {
                        let content: Vec<Value> =
                            contents.iter().map(content_to_anthropic_block).collect();
                        blocks.push(json!({
                            "type": "tool_result",
                            "tool_use_id": response.id,
                            "content": content,
                        }));
                    }
                    Err(e) => {
                        // The model sees the failure and can react to it
                        blocks.push(json!({
                            "type": "tool_result",
                            "tool_use_id": response.id,
                            "content": [{"type": "text", "text": e.to_string()}],
                            "is_error": true,
                        }));
                    }
                },
            }
        }

        if !blocks.is_empty() {
            messages_spec.push(json!({
                "role": message.role,
                "content": blocks,
            }));
        }
    }

    messages_spec
}

/// Convert internal Tool format to Anthropic's tool specification
pub fn tools_to_anthropic_spec(tools: &[Tool]) -> AgentResult<Vec<Value>> {
    let mut tool_names = HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(AgentError::Gateway(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "name": tool.name,
            "description": tool.description,
            "input_schema": tool.input_schema,
        }));
    }

    Ok(result)
}

/// Convert Anthropic's response to internal Message format, keeping block order
pub fn anthropic_response_to_message(response: &Value) -> AgentResult<Message> {
    let blocks = response
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| AgentError::Gateway("response has no content array".to_string()))?;

    let mut message = Message::assistant();
    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                let text = block.get("text").and_then(Value::as_str).unwrap_or_default();
                message = message.with_text(text);
            }
            Some("tool_use") => {
                let id = block.get("id").and_then(Value::as_str).ok_or_else(|| {
                    AgentError::Gateway("tool_use block without an id".to_string())
                })?;
                let name = block.get("name").and_then(Value::as_str).ok_or_else(|| {
                    AgentError::Gateway("tool_use block without a name".to_string())
                })?;
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                message = message.with_tool_request(id, ToolCall::new(name, input));
            }
            other => debug!(block_type = ?other, "skipping unsupported content block"),
        }
    }

    Ok(message)
}

pub fn get_usage(response: &Value) -> Usage {
    let usage = &response["usage"];
    let input_tokens = usage["input_tokens"].as_i64().map(|v| v as i32);
    let output_tokens = usage["output_tokens"].as_i64().map(|v| v as i32);
    let total_tokens = match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    };
    Usage::new(input_tokens, output_tokens, total_tokens)
}
