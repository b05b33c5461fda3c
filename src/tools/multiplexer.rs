//! Tool multiplexer: one fixed, versioned table of operations and a
//! schema-checked `dispatch()`.
//!
//! The multiplexer keeps no state between calls. The only thing one call
//! can observe of another is whatever it left on the host filesystem.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::builtin::{CommandTool, ListFilesTool, ReadFileTool};
use super::{Tool, ToolCall, ToolDefinition, ToolResult};
use crate::safety::SafetyClassifier;
use crate::sandbox::Sandbox;

/// Version of the advertised operation set.
pub const TOOLSET_VERSION: &str = "1";

pub struct ToolMultiplexer {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolMultiplexer {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// The standard four: `run_command`, `list_files`, `read_file`,
    /// `setup_environment`.
    ///
    /// With a `guard`, the two execution tools refuse commands the
    /// classifier does not judge SAFE for their timeout class.
    pub fn standard(sandbox: Arc<Sandbox>, guard: Option<Arc<SafetyClassifier>>) -> Self {
        let mut tools = Self::new();
        tools.register(Box::new(CommandTool::run_command(
            sandbox.clone(),
            guard.clone(),
        )));
        tools.register(Box::new(ListFilesTool::new(sandbox.clone())));
        tools.register(Box::new(ReadFileTool::new(sandbox.clone())));
        tools.register(Box::new(CommandTool::setup_environment(sandbox, guard)));
        tools
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect()
    }

    /// Validates `call` against the tool's schema, then runs it.
    ///
    /// Never fails: unknown tools and bad arguments come back as
    /// `ToolStatus::InvalidCall` results.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.get(&call.name) else {
            warn!("Unknown tool requested: {}", call.name);
            return ToolResult::invalid_call(format!("Unknown tool: {}", call.name));
        };

        let arguments = match validate_arguments(&tool.parameters_schema(), &call.arguments) {
            Ok(args) => args,
            Err(e) => {
                warn!("Invalid call to {}: {e}", call.name);
                return ToolResult::invalid_call(format!("invalid call to {}: {e}", call.name));
            }
        };

        debug!("Dispatching {} ({} arguments)", call.name, arguments.len());
        tool.execute(&arguments).await
    }
}

impl Default for ToolMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks `arguments` against an object schema: required keys, declared
/// property types, and `additionalProperties: false`. `null` counts as `{}`.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<Map<String, Value>, String> {
    let arguments = match arguments {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => return Err(format!("arguments must be an object, got {}", type_name(other))),
    };

    if let Some(required) = schema["required"].as_array() {
        for name in required.iter().filter_map(Value::as_str) {
            if !arguments.contains_key(name) {
                return Err(format!("missing required parameter: {name}"));
            }
        }
    }

    let properties = schema["properties"].as_object();
    let closed = schema["additionalProperties"] == Value::Bool(false);
    for (key, value) in &arguments {
        match properties.and_then(|p| p.get(key)) {
            Some(property) => {
                if let Some(expected) = property["type"].as_str() {
                    if !matches_type(expected, value) {
                        return Err(format!(
                            "parameter {key} must be {expected}, got {}",
                            type_name(value)
                        ));
                    }
                }
            }
            None if closed => return Err(format!("unknown parameter: {key}")),
            None => {}
        }
    }

    Ok(arguments)
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
