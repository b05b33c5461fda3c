//! Builtin tools: `run_command` and `setup_environment`.
//!
//! Both hand a shell command line to the sandbox and differ only in their
//! timeout class. The output format is the sandbox's rendered text:
//! `Exit Code: N\nOutput:\n...`, with a `STDERR:` segment when the command
//! wrote to stderr.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::safety::{SafetyClassifier, Verdict};
use crate::sandbox::{Sandbox, TimeoutClass};
use crate::tools::{str_arg, Tool, ToolResult, ToolStatus};

pub struct CommandTool {
    class: TimeoutClass,
    sandbox: Arc<Sandbox>,
    guard: Option<Arc<SafetyClassifier>>,
}

impl CommandTool {
    /// Verification commands, standard deadline.
    pub fn run_command(sandbox: Arc<Sandbox>, guard: Option<Arc<SafetyClassifier>>) -> Self {
        Self {
            class: TimeoutClass::Standard,
            sandbox,
            guard,
        }
    }

    /// Installs and other preparation, extended deadline.
    pub fn setup_environment(
        sandbox: Arc<Sandbox>,
        guard: Option<Arc<SafetyClassifier>>,
    ) -> Self {
        Self {
            class: TimeoutClass::Setup,
            sandbox,
            guard,
        }
    }

    /// Refusal text when the guard does not judge `command` SAFE.
    fn refusal(&self, command: &str) -> Option<String> {
        let guard = self.guard.as_ref()?;
        let verdict = match self.class {
            TimeoutClass::Standard => guard.classify(command),
            TimeoutClass::Setup => guard.classify_setup(command),
        };
        match verdict.verdict {
            Verdict::Safe => None,
            Verdict::Unsafe => Some(format!("blocked by safety policy: {}", verdict.reason)),
            Verdict::NeedsDryRun => Some(format!(
                "blocked by safety policy: {}; re-run as `{}`",
                verdict.reason,
                verdict.rewritten.as_deref().unwrap_or(command)
            )),
        }
    }
}

#[async_trait]
impl Tool for CommandTool {
    fn name(&self) -> &str {
        match self.class {
            TimeoutClass::Standard => "run_command",
            TimeoutClass::Setup => "setup_environment",
        }
    }

    fn description(&self) -> &str {
        match self.class {
            TimeoutClass::Standard => {
                "Run a shell command in the sandbox and return its exit code and output. \
                 Use this to verify documented CLI invocations."
            }
            TimeoutClass::Setup => {
                "Run a setup command (for example installing a CLI tool) in the sandbox. \
                 Same as run_command with a longer timeout."
            }
        }
    }

    fn parameters_schema(&self) -> Value {
        let description = match self.class {
            TimeoutClass::Standard => "The shell command to execute",
            TimeoutClass::Setup => "The setup command, e.g. 'pip install <package>'",
        };
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": description
                }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> ToolResult {
        let command = match str_arg(arguments, "command") {
            Ok(c) => c,
            Err(result) => return result,
        };

        if let Some(reason) = self.refusal(command) {
            warn!("{} refused `{command}`: {reason}", self.name());
            return ToolResult::error(ToolStatus::Blocked, reason);
        }

        info!("{}: {command}", self.name());
        ToolResult::from_execution(self.sandbox.execute(command, self.class).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SandboxConfig;

    fn sandbox() -> Arc<Sandbox> {
        Arc::new(Sandbox::new(SandboxConfig {
            standard_timeout_secs: 2,
            setup_timeout_secs: 4,
            ..SandboxConfig::default()
        }))
    }

    fn guard() -> Option<Arc<SafetyClassifier>> {
        Some(Arc::new(SafetyClassifier::new("/tmp/doc-verifier")))
    }

    fn args(command: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("command".to_string(), Value::String(command.to_string()));
        map
    }

    // ── Metadata tests ──────────────────────────────────

    #[test]
    fn test_names_follow_timeout_class() {
        assert_eq!(CommandTool::run_command(sandbox(), None).name(), "run_command");
        assert_eq!(
            CommandTool::setup_environment(sandbox(), None).name(),
            "setup_environment"
        );
    }

    #[test]
    fn test_schema_requires_command() {
        let schema = CommandTool::run_command(sandbox(), None).parameters_schema();
        assert_eq!(schema["required"], json!(["command"]));
        assert_eq!(schema["properties"]["command"]["type"], "string");
    }

    // ── Execution tests ─────────────────────────────────

    #[tokio::test]
    async fn test_run_command_output_format() {
        let tool = CommandTool::run_command(sandbox(), None);
        let result = tool.execute(&args("echo out; echo err >&2; exit 3")).await;
        assert_eq!(result.status, ToolStatus::Success);
        assert_eq!(result.text, "Exit Code: 3\nOutput:\nout\n\nSTDERR:\nerr\n");
        assert_eq!(result.execution.unwrap().exit_code, 3);
    }

    #[tokio::test]
    async fn test_run_command_timeout_is_failed() {
        let tool = CommandTool::run_command(sandbox(), None);
        let result = tool.execute(&args("sleep 10")).await;
        assert_eq!(result.status, ToolStatus::Failed);
        assert!(result.text.starts_with("Error: Command timed out after 2 seconds"));
    }

    #[tokio::test]
    async fn test_setup_environment_uses_setup_deadline() {
        let tool = CommandTool::setup_environment(sandbox(), None);
        let result = tool.execute(&args("sleep 3; echo done")).await;
        assert_eq!(result.status, ToolStatus::Success);
        assert!(result.text.contains("done"));
    }

    // ── Guard tests ─────────────────────────────────────

    #[tokio::test]
    async fn test_guard_blocks_unsafe_command() {
        let tool = CommandTool::run_command(sandbox(), guard());
        let result = tool.execute(&args("rm -rf /tmp/x")).await;
        assert_eq!(result.status, ToolStatus::Blocked);
        assert!(result.text.starts_with("Error: blocked by safety policy"));
        assert!(result.execution.is_none());
    }

    #[tokio::test]
    async fn test_guard_names_dry_run_rewrite() {
        let tool = CommandTool::run_command(sandbox(), guard());
        let result = tool.execute(&args("kubectl apply -f app.yaml")).await;
        assert_eq!(result.status, ToolStatus::Blocked);
        assert!(result.text.contains("kubectl apply -f app.yaml --dry-run=client"));
    }

    #[tokio::test]
    async fn test_guard_allows_safe_command() {
        let tool = CommandTool::run_command(sandbox(), guard());
        let result = tool.execute(&args("echo hello")).await;
        assert_eq!(result.status, ToolStatus::Success);
    }

    #[tokio::test]
    async fn test_guard_package_manager_only_on_setup() {
        let run = CommandTool::run_command(sandbox(), guard());
        assert!(run.refusal("pip install requests").is_some());
        let setup = CommandTool::setup_environment(sandbox(), guard());
        assert!(setup.refusal("pip install requests").is_none());
    }
}
