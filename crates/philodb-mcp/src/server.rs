//! Line-delimited JSON-RPC server loop and session lifecycle.

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use philodb_core::traits::RetrievalBackend;

use crate::protocol::{
    JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND,
    PARSE_ERROR, PROTOCOL_VERSION, SERVER_NOT_INITIALIZED,
};
use crate::tools::{call_tool, manifest, ToolError};

pub const SERVER_NAME: &str = "philodb-mcp-server";

/// Session lifecycle: `Idle -> Initialized -> Serving -> ShutDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Idle,
    Initialized,
    Serving,
    ShutDown,
}

pub struct McpServer<B> {
    backend: B,
    state: ServerState,
    max_k: usize,
}

impl<B: RetrievalBackend> McpServer<B> {
    /// `max_k` is advertised as the upper bound of the search tool's `k`.
    pub fn new(backend: B, max_k: usize) -> Self { Self { backend, state: ServerState::Idle, max_k } }

    pub fn state(&self) -> ServerState { self.state }

    pub fn backend(&self) -> &B { &self.backend }

    /// Serve until EOF or a shutdown/exit message, then hand the backend back
    /// so the caller can release it.
    pub async fn serve<R, W>(mut self, mut reader: R, mut writer: W) -> anyhow::Result<B>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(server = SERVER_NAME, "serving on stdio");
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let response = match std::str::from_utf8(&buf) {
                Ok(line) => self.handle_line(line).await,
                Err(e) => {
                    warn!(error = %e, "message is not valid UTF-8");
                    Some(JsonRpcResponse::failure(Value::Null, PARSE_ERROR, "Parse error"))
                }
            };
            if let Some(response) = response {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
            if self.state == ServerState::ShutDown {
                break;
            }
        }
        self.state = ServerState::ShutDown;
        info!("session closed");
        Ok(self.backend)
    }

    /// Handle one input line. Notifications and blank lines produce no response.
    pub async fn handle_line(&mut self, line: &str) -> Option<JsonRpcResponse> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "unparsable message");
                return Some(JsonRpcResponse::failure(Value::Null, PARSE_ERROR, "Parse error"));
            }
        };
        let id_hint = value.get("id").cloned().unwrap_or(Value::Null);
        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "malformed request");
                return Some(JsonRpcResponse::failure(id_hint, INVALID_REQUEST, "Invalid Request"));
            }
        };
        self.handle_request(request).await
    }

    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, state = ?self.state, "request");
        if request.is_notification() {
            self.handle_notification(&request.method);
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        match (self.state, request.method.as_str()) {
            (_, "ping") => Some(JsonRpcResponse::success(id, json!({}))),
            (ServerState::Idle, "initialize") => {
                self.state = ServerState::Initialized;
                info!("client initialized");
                Some(JsonRpcResponse::success(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
                        "capabilities": { "tools": {} }
                    }),
                ))
            }
            (ServerState::Idle, _) => {
                Some(JsonRpcResponse::failure(id, SERVER_NOT_INITIALIZED, "Server not initialized"))
            }
            (_, "initialize") => Some(JsonRpcResponse::failure(id, INVALID_REQUEST, "Server already initialized")),
            (_, "shutdown" | "exit") => {
                self.state = ServerState::ShutDown;
                Some(JsonRpcResponse::success(id, Value::Null))
            }
            (_, "tools/list") => {
                self.state = ServerState::Serving;
                let tools = manifest(self.max_k, self.backend.default_k());
                Some(JsonRpcResponse::success(id, json!({ "tools": tools })))
            }
            (_, "tools/call") => {
                self.state = ServerState::Serving;
                Some(self.handle_call(id, request.params).await)
            }
            (_, method) => {
                Some(JsonRpcResponse::failure(id, METHOD_NOT_FOUND, format!("Method not found: {}", method)))
            }
        }
    }

    fn handle_notification(&mut self, method: &str) {
        match (self.state, method) {
            (ServerState::Initialized, "notifications/initialized") => self.state = ServerState::Serving,
            (_, "exit") => self.state = ServerState::ShutDown,
            _ => debug!(method, "ignored notification"),
        }
    }

    async fn handle_call(&self, id: Value, params: Option<Value>) -> JsonRpcResponse {
        let Some(params) = params else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing params");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return JsonRpcResponse::failure(id, INVALID_PARAMS, "Missing tool name");
        };
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
        info!(tool = name, "tool call");

        match call_tool(&self.backend, name, arguments).await {
            Ok(output) => JsonRpcResponse::success(id, output.into_result()),
            Err(ToolError::NotFound(msg)) => JsonRpcResponse::failure(id, METHOD_NOT_FOUND, msg),
            Err(ToolError::InvalidParams(msg)) => JsonRpcResponse::failure(id, INVALID_PARAMS, msg),
            Err(ToolError::Internal(msg)) => JsonRpcResponse::failure(id, INTERNAL_ERROR, msg),
        }
    }
}
