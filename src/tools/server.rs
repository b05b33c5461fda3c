//! MCP stdio server exposing the tool multiplexer.
//!
//! One JSON-RPC 2.0 message per line on stdin, one response per line on
//! stdout. Notifications (no `id`) are never answered. Logging goes to
//! stderr so stdout carries protocol traffic only.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::multiplexer::TOOLSET_VERSION;
use super::{ToolCall, ToolMultiplexer};

/// Protocol revision answered to `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name announced in `serverInfo`.
pub const SERVER_NAME: &str = "shell-server";

const PARSE_ERROR: i64 = -32700;
const INVALID_REQUEST: i64 = -32600;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

/// A JSON-RPC 2.0 message (request, notification or response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcMessage {
    pub jsonrpc: String,
    /// Absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcMessage {
    fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: None,
            params: None,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

pub struct StdioServer {
    tools: Arc<ToolMultiplexer>,
}

impl StdioServer {
    pub fn new(tools: Arc<ToolMultiplexer>) -> Self {
        Self { tools }
    }

    /// Serves until `reader` reaches EOF.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(
            "{SERVER_NAME} ready ({} tools, toolset v{TOOLSET_VERSION})",
            self.tools.len()
        );

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(line).await {
                let mut out = serde_json::to_string(&response)?;
                out.push('\n');
                writer.write_all(out.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        info!("stdin closed, shutting down");
        Ok(())
    }

    /// Handles one framed message; `None` means no reply is due.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let message: JsonRpcMessage = match serde_json::from_str(line) {
            Ok(m) => m,
            Err(e) => {
                warn!("Unparseable message: {e}");
                return Some(JsonRpcMessage::error(
                    Value::Null,
                    PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };
        self.handle_message(message).await
    }

    pub async fn handle_message(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        let Some(method) = message.method else {
            // A response or garbage; we never issue requests.
            return message
                .id
                .map(|id| JsonRpcMessage::error(id, INVALID_REQUEST, "Invalid Request"));
        };

        let Some(id) = message.id else {
            debug!("Notification: {method}");
            return None;
        };

        debug!("Request {id}: {method}");
        let params = message.params.unwrap_or(Value::Null);
        let response = match method.as_str() {
            "initialize" => JsonRpcMessage::result(id, self.initialize_result()),
            "ping" => JsonRpcMessage::result(id, json!({})),
            "tools/list" => JsonRpcMessage::result(
                id,
                json!({ "tools": self.tools.tool_definitions() }),
            ),
            "tools/call" => match params["name"].as_str() {
                Some(name) => {
                    let call = ToolCall::new(name, params["arguments"].clone());
                    let result = self.tools.dispatch(&call).await;
                    JsonRpcMessage::result(
                        id,
                        json!({
                            "content": [{ "type": "text", "text": result.text }],
                            "isError": result.is_error(),
                        }),
                    )
                }
                None => JsonRpcMessage::error(id, INVALID_PARAMS, "Missing tool name"),
            },
            other => {
                warn!("Unknown method: {other}");
                JsonRpcMessage::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}"))
            }
        };
        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;
    use crate::sandbox::Sandbox;

    fn server() -> StdioServer {
        let sandbox = Arc::new(Sandbox::new(SandboxConfig::default()));
        StdioServer::new(Arc::new(ToolMultiplexer::standard(sandbox, None)))
    }

    async fn request(line: &str) -> JsonRpcMessage {
        server().handle_line(line).await.expect("response expected")
    }

    // ── Lifecycle ───────────────────────────────────────

    #[tokio::test]
    async fn test_initialize() {
        let resp = request(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#).await;
        let result = resp.result.unwrap();
        assert_eq!(resp.id, Some(json!(1)));
        assert_eq!(result["serverInfo"]["name"], "shell-server");
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_notification_gets_no_reply() {
        let resp = server()
            .handle_line(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(resp.is_none());
    }

    #[tokio::test]
    async fn test_ping() {
        let resp = request(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#).await;
        assert_eq!(resp.result, Some(json!({})));
    }

    // ── Errors ──────────────────────────────────────────

    #[tokio::test]
    async fn test_parse_error() {
        let resp = request("{not json").await;
        assert_eq!(resp.id, Some(Value::Null));
        assert_eq!(resp.error.unwrap().code, PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = request(r#"{"jsonrpc":"2.0","id":2,"method":"resources/list"}"#).await;
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_call_without_name() {
        let resp =
            request(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{}}"#).await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    // ── Tools ───────────────────────────────────────────

    #[tokio::test]
    async fn test_tools_list() {
        let resp = request(r#"{"jsonrpc":"2.0","id":4,"method":"tools/list"}"#).await;
        let tools = resp.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 4);
        assert_eq!(tools[0]["name"], "run_command");
        assert!(tools[0]["inputSchema"]["properties"]["command"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call_run_command() {
        let resp = request(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"run_command","arguments":{"command":"echo hi"}}}"#,
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "Exit Code: 0\nOutput:\nhi\n");
    }

    #[tokio::test]
    async fn test_tools_call_unknown_tool_is_tool_error() {
        let resp = request(
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
        )
        .await;
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Unknown tool: nope"));
    }

    // ── Framing ─────────────────────────────────────────

    #[tokio::test]
    async fn test_serve_line_framing() {
        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
            "\n"
        );
        let mut output = Vec::new();
        server().serve(input.as_bytes(), &mut output).await.unwrap();

        let text = String::from_utf8(output).unwrap();
        let replies: Vec<JsonRpcMessage> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].id, Some(json!(1)));
        assert_eq!(replies[1].id, Some(json!(2)));
    }
}
