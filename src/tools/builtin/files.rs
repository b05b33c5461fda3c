//! Builtin tools: `list_files` and `read_file`.
//!
//! Read-only views of the host filesystem through the sandbox. Relative
//! paths resolve against the sandbox working directory.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::sandbox::{Sandbox, SandboxError};
use crate::tools::{str_arg, Tool, ToolResult, ToolStatus};

pub struct ListFilesTool {
    sandbox: Arc<Sandbox>,
}

impl ListFilesTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory, one name per line, sorted."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "directory": {
                    "type": "string",
                    "description": "Path of the directory to list"
                }
            },
            "required": ["directory"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolResult {
        let directory = match str_arg(arguments, "directory") {
            Ok(d) => d,
            Err(result) => return result,
        };

        match self.sandbox.list_directory(directory).await {
            Ok(names) if names.is_empty() => ToolResult::success("(empty directory)"),
            Ok(names) => {
                debug!("Listed {} entries in {directory}", names.len());
                ToolResult::success(names.into_iter().collect::<Vec<_>>().join("\n"))
            }
            Err(SandboxError::NotFound(_)) | Err(SandboxError::NotADirectory(_)) => {
                ToolResult::error(
                    ToolStatus::NotFound,
                    format!("Directory not found: {directory}"),
                )
            }
            Err(e) => ToolResult::error(ToolStatus::Failed, e),
        }
    }
}

pub struct ReadFileTool {
    sandbox: Arc<Sandbox>,
}

impl ReadFileTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file and return its full contents."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to read"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolResult {
        let path = match str_arg(arguments, "path") {
            Ok(p) => p,
            Err(result) => return result,
        };

        match self.sandbox.read_file(path).await {
            Ok(content) => ToolResult::success(content),
            Err(SandboxError::NotFound(_)) => {
                ToolResult::error(ToolStatus::NotFound, format!("File not found: {path}"))
            }
            Err(e) => ToolResult::error(ToolStatus::Failed, e),
        }
    }
}
