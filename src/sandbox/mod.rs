//! Execution sandbox: time-bounded shell execution and read-only file access.
//!
//! Every command runs as `<shell> -c <command>` in its own process group
//! with stdin closed and stdout/stderr captured independently. The sandbox
//! adds no privilege separation; what it guarantees is that:
//!
//! 1. A command never outlives its deadline. On timeout the whole process
//!    group is killed and whatever output was buffered is returned.
//! 2. Dropping an in-flight `execute()` future kills the process group too,
//!    so cancelling a verification run tears down every command it started.
//! 3. Spawn failures come back as `ExecStatus::ExecError`, never as `Err`.

mod fs;

use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SandboxConfig;

pub use fs::SandboxError;

/// Read chunk size for the output pipes.
const READ_CHUNK: usize = 8 * 1024;

/// Deadline policy for an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Verification probes (`--help`, documented invocations). 30s by default.
    Standard,
    /// Environment setup (package installs). 120s by default.
    Setup,
}

/// Terminal status of one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecStatus {
    /// The process exited on its own (any exit code).
    Completed,
    /// The deadline fired and the process group was killed.
    TimedOut,
    /// The process could not be spawned or waited on.
    ExecError(String),
}

/// Outcome of a single sandboxed execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit code; `128 + signal` when killed by a signal, -1 when unknown.
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    /// Deadline that applied to this execution
    pub timeout: Duration,
    pub status: ExecStatus,
    /// True if either stream hit the capture limit
    pub truncated: bool,
}

impl ExecutionResult {
    fn exec_error(message: String, duration: Duration, timeout: Duration) -> Self {
        Self {
            exit_code: -1,
            stdout: String::new(),
            stderr: String::new(),
            duration,
            timeout,
            status: ExecStatus::ExecError(message),
            truncated: false,
        }
    }

    /// True for a completed run with exit code 0.
    pub fn succeeded(&self) -> bool {
        self.status == ExecStatus::Completed && self.exit_code == 0
    }

    /// Exit code 127 is the shell's "command not found".
    pub fn command_not_found(&self) -> bool {
        match &self.status {
            ExecStatus::Completed => self.exit_code == 127,
            ExecStatus::ExecError(_) => true,
            ExecStatus::TimedOut => false,
        }
    }

    /// stdout followed by a tagged stderr segment (when non-empty).
    pub fn combined_output(&self) -> String {
        let mut output = self.stdout.clone();
        if !self.stderr.is_empty() {
            output.push_str("\nSTDERR:\n");
            output.push_str(&self.stderr);
        }
        if self.truncated {
            output.push_str("\n[Output truncated]");
        }
        output
    }

    /// Text payload returned to tool callers.
    pub fn render(&self) -> String {
        match &self.status {
            ExecStatus::Completed => format!(
                "Exit Code: {}\nOutput:\n{}",
                self.exit_code,
                self.combined_output()
            ),
            ExecStatus::TimedOut => {
                let mut text = format!(
                    "Error: Command timed out after {} seconds",
                    self.timeout.as_secs()
                );
                if !self.stdout.is_empty() || !self.stderr.is_empty() {
                    text.push_str("\nPartial output:\n");
                    text.push_str(&self.combined_output());
                }
                text
            }
            ExecStatus::ExecError(e) => format!("Error executing command: {e}"),
        }
    }
}

/// Captured bytes of one output stream.
#[derive(Default)]
struct Capture {
    bytes: Vec<u8>,
    truncated: bool,
}

type SharedCapture = Arc<Mutex<Capture>>;

/// Kills the whole process group when dropped.
///
/// The leader was spawned with `process_group(0)`, so its pid is the pgid.
/// Killing an already-empty group is a no-op (ESRCH).
struct ProcessGroup {
    pgid: Option<Pid>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self {
            pgid: leader.map(|pid| Pid::from_raw(pid as i32)),
        }
    }

    fn kill(&self) {
        let Some(pgid) = self.pgid else { return };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) => debug!("Killed process group {pgid}"),
            Err(Errno::ESRCH) => {}
            Err(e) => warn!("Failed to kill process group {pgid}: {e}"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Time-bounded command runner plus read-only filesystem primitives.
pub struct Sandbox {
    config: SandboxConfig,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Directory that the safety classifier treats as writable.
    pub fn scratch_dir(&self) -> &Path {
        &self.config.scratch_dir
    }

    pub fn timeout_for(&self, class: TimeoutClass) -> Duration {
        match class {
            TimeoutClass::Standard => Duration::from_secs(self.config.standard_timeout_secs),
            TimeoutClass::Setup => Duration::from_secs(self.config.setup_timeout_secs),
        }
    }

    /// Runs `command_line` under the deadline of `class`.
    pub async fn execute(&self, command_line: &str, class: TimeoutClass) -> ExecutionResult {
        self.execute_with_timeout(command_line, self.timeout_for(class))
            .await
    }

    pub(crate) async fn execute_with_timeout(
        &self,
        command_line: &str,
        timeout: Duration,
    ) -> ExecutionResult {
        let started = Instant::now();

        let mut command = Command::new(&self.config.shell);
        command
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(ref dir) = self.config.working_dir {
            command.current_dir(dir);
        }

        debug!("Spawning: {command_line}");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to spawn `{command_line}`: {e}");
                return ExecutionResult::exec_error(e.to_string(), started.elapsed(), timeout);
            }
        };

        let group = ProcessGroup::new(child.id());
        let limit = self.config.max_output_bytes;

        let stdout = Arc::new(Mutex::new(Capture::default()));
        let stderr = Arc::new(Mutex::new(Capture::default()));
        let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(drain(pipe, stdout.clone(), limit)));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(drain(pipe, stderr.clone(), limit)));
        }

        let (status, exit_code) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(exit)) => {
                let code = exit
                    .code()
                    .or_else(|| exit.signal().map(|sig| 128 + sig))
                    .unwrap_or(-1);
                (ExecStatus::Completed, code)
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for `{command_line}`: {e}");
                (ExecStatus::ExecError(e.to_string()), -1)
            }
            Err(_) => {
                info!(
                    "Command timed out after {}s, killing process group: {command_line}",
                    timeout.as_secs()
                );
                group.kill();
                let _ = child.wait().await;
                (ExecStatus::TimedOut, -1)
            }
        };

        // Stragglers (background jobs) would keep the pipes open forever.
        drop(group);

        let grace = Duration::from_millis(self.config.kill_grace_ms);
        for mut reader in readers {
            if tokio::time::timeout(grace, &mut reader).await.is_err() {
                reader.abort();
            }
        }

        let (stdout, out_truncated) = take_capture(&stdout);
        let (stderr, err_truncated) = take_capture(&stderr);

        ExecutionResult {
            exit_code,
            stdout,
            stderr,
            duration: started.elapsed(),
            timeout,
            status,
            truncated: out_truncated || err_truncated,
        }
    }

    /// Reads a whole file. Relative paths resolve against the working dir.
    pub async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        fs::read_file(&self.resolve(path)).await
    }

    /// Lists entry names of a directory, sorted.
    pub async fn list_directory(
        &self,
        path: &str,
    ) -> Result<std::collections::BTreeSet<String>, SandboxError> {
        fs::list_directory(&self.resolve(path)).await
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        match self.config.working_dir {
            Some(ref dir) if p.is_relative() => dir.join(p),
            _ => p.to_path_buf(),
        }
    }
}

/// Reads a pipe to EOF, keeping at most `limit` bytes.
///
/// Reading continues past the limit so the child never blocks on a full pipe.
async fn drain<R: AsyncRead + Unpin>(mut pipe: R, capture: SharedCapture, limit: usize) {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let Ok(mut guard) = capture.lock() else { break };
                let room = limit.saturating_sub(guard.bytes.len());
                if n > room {
                    guard.truncated = true;
                }
                guard.bytes.extend_from_slice(&chunk[..n.min(room)]);
            }
        }
    }
}

fn take_capture(capture: &SharedCapture) -> (String, bool) {
    match capture.lock() {
        Ok(mut c) => {
            let bytes = std::mem::take(&mut c.bytes);
            (String::from_utf8_lossy(&bytes).into_owned(), c.truncated)
        }
        Err(_) => (String::new(), false),
    }
}
