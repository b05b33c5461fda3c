pub mod builtin;
pub mod multiplexer;
pub mod server;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::sandbox::ExecutionResult;

/// A request to run one named tool. Stateless: no identity beyond the call.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Tool definition as advertised to callers (`tools/list`).
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Outcome category of a dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Success,
    /// The file or directory does not exist
    NotFound,
    /// Unknown tool, missing or mistyped parameter
    InvalidCall,
    /// Refused by the safety classifier
    Blocked,
    /// The command timed out or could not be spawned, or a read failed
    Failed,
}

/// Text result of a tool call. Error texts start with `Error`.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub text: String,
    /// Structured outcome for execution tools
    pub execution: Option<ExecutionResult>,
}

impl ToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            text: text.into(),
            execution: None,
        }
    }

    pub fn error(status: ToolStatus, message: impl std::fmt::Display) -> Self {
        Self {
            status,
            text: format!("Error: {message}"),
            execution: None,
        }
    }

    pub fn invalid_call(message: impl std::fmt::Display) -> Self {
        Self::error(ToolStatus::InvalidCall, message)
    }

    pub fn from_execution(result: ExecutionResult) -> Self {
        use crate::sandbox::ExecStatus;

        let status = match result.status {
            ExecStatus::Completed => ToolStatus::Success,
            ExecStatus::TimedOut | ExecStatus::ExecError(_) => ToolStatus::Failed,
        };
        Self {
            status,
            text: result.render(),
            execution: Some(result),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != ToolStatus::Success
    }
}

/// An operation the multiplexer can dispatch to.
///
/// Arguments are validated against `parameters_schema()` before `execute()`
/// is called, so required string parameters are always present.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier, e.g. "run_command".
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the `arguments` object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolResult;
}

/// Reads a string argument already checked by schema validation.
pub(crate) fn str_arg<'a>(arguments: &'a Map<String, Value>, key: &str) -> Result<&'a str, ToolResult> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolResult::invalid_call(format!("missing required parameter: {key}")))
}

pub use multiplexer::ToolMultiplexer;
