use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::target::LaunchSpec;
use super::types::{CallToolResult, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION};
use super::ToolServer;
use crate::errors::{AgentError, AgentResult};
use crate::models::tool::{Tool, ToolCall};

const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Default)]
struct Pending {
    waiters: HashMap<u64, oneshot::Sender<Value>>,
    /// Set once the server's stdout is gone; no waiter can be answered after that
    closed: bool,
}

/// One live tool server process speaking newline-delimited JSON-RPC over its stdio
struct Connection {
    stdin: Arc<Mutex<ChildStdin>>,
    pending: Arc<Mutex<Pending>>,
    next_id: AtomicU64,
    child: Mutex<Child>,
    reader: JoinHandle<()>,
}

impl Connection {
    fn spawn(spec: &LaunchSpec) -> AgentResult<Self> {
        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AgentError::Connection(format!(
                    "failed to launch `{}`: {}",
                    spec.display_command(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Connection("tool server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Connection("tool server stdout unavailable".into()))?;

        let stdin = Arc::new(Mutex::new(stdin));
        let pending = Arc::new(Mutex::new(Pending::default()));
        let reader = tokio::spawn(read_responses(stdout, stdin.clone(), pending.clone()));

        Ok(Self {
            stdin,
            pending,
            next_id: AtomicU64::new(1),
            child: Mutex::new(child),
            reader,
        })
    }

    async fn send(&self, message: &Value) -> AgentResult<()> {
        write_message(&self.stdin, message).await
    }

    /// Send a request and wait for the response carrying the same id
    async fn request(&self, method: &str, params: Value) -> AgentResult<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(AgentError::Connection(
                    "tool server closed the connection".into(),
                ));
            }
            pending.waiters.insert(id, tx);
        }

        debug!(id, method, "sending request to tool server");
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(e) = self.send(&message).await {
            self.pending.lock().await.waiters.remove(&id);
            return Err(e);
        }

        let response = rx.await.map_err(|_| {
            AgentError::Connection(format!(
                "tool server closed the connection before answering {}",
                method
            ))
        })?;
        serde_json::from_value(response).map_err(|e| {
            AgentError::Connection(format!("malformed response to {}: {}", method, e))
        })
    }

    async fn notify(&self, method: &str) -> AgentResult<()> {
        self.send(&json!({"jsonrpc": "2.0", "method": method})).await
    }

    async fn initialize(&self) -> AgentResult<()> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "pilot",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let result = self
            .request("initialize", params)
            .await?
            .into_result()
            .map_err(|e| AgentError::Connection(format!("initialize failed: {}", e)))?;

        info!(
            server = %result["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            version = %result["serverInfo"]["version"].as_str().unwrap_or("unknown"),
            protocol = %result["protocolVersion"].as_str().unwrap_or("unknown"),
            "connected to tool server"
        );

        self.notify("notifications/initialized").await
    }

    async fn list_tools(&self) -> AgentResult<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = match &cursor {
                Some(cursor) => json!({"cursor": cursor}),
                None => json!({}),
            };
            let result = self
                .request("tools/list", params)
                .await?
                .into_result()
                .map_err(|e| AgentError::Connection(format!("tools/list failed: {}", e)))?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| AgentError::Connection(format!("malformed tools/list result: {}", e)))?;
            tools.extend(page.tools.into_iter().map(Tool::from));

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(tools)
    }

    async fn call_tool(&self, tool_call: &ToolCall) -> AgentResult<CallToolResult> {
        let params = json!({
            "name": tool_call.name,
            "arguments": tool_call.arguments,
        });
        let result = self
            .request("tools/call", params)
            .await?
            .into_result()
            .map_err(|e| AgentError::ToolInvocation(format!("{}: {}", tool_call.name, e)))?;
        CallToolResult::from_value(result).map_err(|e| {
            AgentError::ToolInvocation(format!("{}: malformed result: {}", tool_call.name, e))
        })
    }

    async fn shutdown(self) {
        let mut child = self.child.into_inner();
        if let Err(e) = child.start_kill() {
            debug!("tool server already exited: {}", e);
        }
        match child.wait().await {
            Ok(status) => debug!(%status, "tool server stopped"),
            Err(e) => warn!("failed to reap tool server: {}", e),
        }
        self.reader.abort();
    }
}

async fn write_message(stdin: &Mutex<ChildStdin>, message: &Value) -> AgentResult<()> {
    let line = serde_json::to_string(message)
        .map_err(|e| AgentError::Connection(format!("cannot encode request: {}", e)))?;
    let mut stdin = stdin.lock().await;
    let written = async {
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }
    .await;
    written.map_err(|e| AgentError::Connection(format!("cannot write to tool server: {}", e)))
}

/// Reply to a request the server sent us. Only `ping` is supported.
async fn answer_server_request(stdin: &Mutex<ChildStdin>, id: Value, method: &str) {
    let reply = if method == "ping" {
        json!({"jsonrpc": "2.0", "id": id, "result": {}})
    } else {
        debug!(method, "rejecting unsupported request from tool server");
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": METHOD_NOT_FOUND, "message": format!("Method not found: {}", method)},
        })
    };
    if let Err(e) = write_message(stdin, &reply).await {
        warn!(method, "failed to answer tool server request: {}", e);
    }
}

/// Route each response line to the waiter registered under its id
async fn read_responses(
    stdout: ChildStdout,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: Arc<Mutex<Pending>>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let message: Value = match serde_json::from_str(line) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("ignoring non JSON-RPC output from tool server: {}", e);
                        continue;
                    }
                };

                if let Some(method) = message.get("method").and_then(Value::as_str) {
                    match message.get("id") {
                        Some(id) if !id.is_null() => {
                            answer_server_request(&stdin, id.clone(), method).await
                        }
                        _ => debug!(method, "ignoring notification from tool server"),
                    }
                    continue;
                }

                match message.get("id").and_then(Value::as_u64) {
                    Some(id) => match pending.lock().await.waiters.remove(&id) {
                        Some(waiter) => {
                            let _ = waiter.send(message);
                        }
                        None => debug!(id, "response for unknown request id"),
                    },
                    None => debug!("ignoring response without a numeric id"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("failed to read from tool server: {}", e);
                break;
            }
        }
    }

    let mut pending = pending.lock().await;
    pending.closed = true;
    // Dropping the senders wakes every waiter with an error
    pending.waiters.clear();
}

/// Connects to one MCP tool server and exposes its tools
#[derive(Default)]
pub struct Connector {
    connection: Option<Connection>,
    tools: Vec<Tool>,
}

impl Connector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Launch the server, run the handshake and discover its tools
    pub async fn connect(&mut self, spec: &LaunchSpec) -> AgentResult<()> {
        if self.connection.is_some() {
            return Err(AgentError::Connection(
                "connector already has an active tool server".into(),
            ));
        }

        info!(command = %spec.display_command(), "launching tool server");
        let connection = Connection::spawn(spec)?;
        let established = async {
            connection.initialize().await?;
            connection.list_tools().await
        }
        .await;

        match established {
            Ok(tools) => {
                info!(
                    tools = ?tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                    "discovered tools"
                );
                self.tools = tools;
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                connection.shutdown().await;
                Err(e)
            }
        }
    }

    /// Stop the server. Safe to call repeatedly or without a prior connect.
    pub async fn close(&mut self) {
        self.tools.clear();
        if let Some(connection) = self.connection.take() {
            connection.shutdown().await;
        }
    }
}

#[async_trait]
impl ToolServer for Connector {
    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call_tool(&self, tool_call: &ToolCall) -> AgentResult<CallToolResult> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| AgentError::Connection("no active tool server".into()))?;
        debug!(tool = %tool_call.name, "calling tool");
        connection.call_tool(tool_call).await
    }
}
