use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::models::content::Content;
use crate::models::tool::Tool;

/// Protocol revision sent in the `initialize` request
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object"})
}

impl From<McpTool> for Tool {
    fn from(tool: McpTool) -> Self {
        Tool::new(
            tool.name,
            tool.description.unwrap_or_default(),
            tool.input_schema,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<McpTool>,
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct WireCallToolResult {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(rename = "isError", default)]
    is_error: bool,
}

/// The outcome of a `tools/call` that the server answered
#[derive(Debug, Clone, PartialEq)]
pub struct CallToolResult {
    pub content: Vec<Content>,
    /// The tool itself reported failure; the content describes it
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(content: Vec<Content>) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error<S: Into<String>>(text: S) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: true,
        }
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let wire: WireCallToolResult = serde_json::from_value(value)?;
        Ok(Self {
            content: wire.content.into_iter().map(content_from_value).collect(),
            is_error: wire.is_error,
        })
    }

    /// Text items joined by newlines
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Text and image items map onto Content; anything else (resources, audio) is kept as JSON text.
fn content_from_value(value: Value) -> Content {
    match value.get("type").and_then(Value::as_str) {
        Some("text") => {
            if let Some(text) = value.get("text").and_then(Value::as_str) {
                return Content::text(text);
            }
        }
        Some("image") => {
            let data = value.get("data").and_then(Value::as_str);
            let mime_type = value.get("mimeType").and_then(Value::as_str);
            if let (Some(data), Some(mime_type)) = (data, mime_type) {
                return Content::image(data, mime_type);
            }
        }
        _ => {}
    }
    Content::text(value.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}
