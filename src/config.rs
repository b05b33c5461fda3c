use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Config path used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "config/verifier.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub verifier: VerifierConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResourcesConfig {
    /// Root directory holding one documentation file per resource
    #[serde(default = "default_resources_path")]
    pub path: PathBuf,
    /// File extension of resource files (without the dot)
    #[serde(default = "default_resource_extension")]
    pub extension: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Shell used to interpret command lines (`<shell> -c <command>`)
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Working directory for spawned commands (inherits ours when unset)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Only directory that redirections and `tee` may write into
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default = "default_standard_timeout")]
    pub standard_timeout_secs: u64,
    #[serde(default = "default_setup_timeout")]
    pub setup_timeout_secs: u64,
    /// Per-stream capture limit; anything beyond is dropped
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// How long to wait for pipes to drain after a process group is killed
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

/// How documented commands are confirmed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMode {
    /// Probe `<tool> --help` and look for the documented subcommand
    Existence,
    /// Run SAFE commands (and dry-run rewrites) in the sandbox
    Execute,
}

impl std::fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyMode::Existence => write!(f, "existence"),
            VerifyMode::Execute => write!(f, "execute"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VerifierConfig {
    #[serde(default = "default_mode")]
    pub mode: VerifyMode,
    /// Run candidates through the safety classifier
    #[serde(default = "default_true")]
    pub safety_checks: bool,
    /// Allow `--list` to enumerate the resource store
    #[serde(default = "default_true")]
    pub list_resources: bool,
    /// Concurrent executions per run; defaults to min(CPU count, 4)
    #[serde(default)]
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_docs_timeout")]
    pub timeout_secs: u64,
    /// Extra or overriding {tool → docs URL} entries
    #[serde(default)]
    pub urls: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    /// Refuse UNSAFE commands at the tool-server boundary
    #[serde(default = "default_true")]
    pub enforce_safety: bool,
}

fn default_resources_path() -> PathBuf {
    PathBuf::from("./resources")
}

fn default_resource_extension() -> String {
    "md".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/tmp/doc-verifier")
}

fn default_standard_timeout() -> u64 {
    30
}

fn default_setup_timeout() -> u64 {
    120
}

fn default_max_output_bytes() -> usize {
    64 * 1024
}

fn default_kill_grace_ms() -> u64 {
    500
}

fn default_mode() -> VerifyMode {
    VerifyMode::Existence
}

fn default_docs_timeout() -> u64 {
    15
}

fn default_true() -> bool {
    true
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            path: default_resources_path(),
            extension: default_resource_extension(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            working_dir: None,
            scratch_dir: default_scratch_dir(),
            standard_timeout_secs: default_standard_timeout(),
            setup_timeout_secs: default_setup_timeout(),
            max_output_bytes: default_max_output_bytes(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            safety_checks: true,
            list_resources: true,
            max_concurrent: None,
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_docs_timeout(),
            urls: HashMap::new(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enforce_safety: true,
        }
    }
}

impl VerifierConfig {
    /// Effective worker-pool size for one run.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(4)
        })
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Loads `path` if it exists. A missing file is only tolerated for the
    /// default location, in which case the built-in defaults apply.
    pub fn load_or_default(path: Option<&str>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => {
                let config = Config::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${DOCS_ROOT}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let sandbox = &self.sandbox;
        if sandbox.standard_timeout_secs == 0 || sandbox.setup_timeout_secs == 0 {
            anyhow::bail!("sandbox timeouts must be greater than zero");
        }
        if sandbox.setup_timeout_secs < sandbox.standard_timeout_secs {
            anyhow::bail!(
                "setup_timeout_secs ({}) must not be shorter than standard_timeout_secs ({})",
                sandbox.setup_timeout_secs,
                sandbox.standard_timeout_secs
            );
        }
        if self.verifier.max_concurrent == Some(0) {
            anyhow::bail!("verifier.max_concurrent must be at least 1");
        }
        if !self.verifier.safety_checks && self.verifier.mode == VerifyMode::Execute {
            anyhow::bail!("safety_checks can only be disabled in \"existence\" mode");
        }
        Ok(())
    }
}
