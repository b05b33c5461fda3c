//! Verification orchestrator.
//!
//! One run walks `Idle → ResourceLoaded → CommandsExtracted → Classifying →
//! Executing → [ExternalLookup] → ReportReady → Terminal`. Every candidate
//! gets exactly one terminal outcome. Only a missing resource or a sandbox
//! that cannot spawn anything aborts a run.
//!
//! All per-command work is polled from the run future itself (no spawned
//! tasks), so dropping a run cancels its executions and kills their process
//! groups.

pub mod extract;
pub mod report;

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::{Config, VerifierConfig, VerifyMode};
use crate::docs::{mentions_all, DocsLookup, DocsPage, HttpDocsLookup, LookupError};
use crate::error::VerifyError;
use crate::resources::ResourceLoader;
use crate::safety::{ClassificationVerdict, Rule, SafetyClassifier};
use crate::sandbox::{ExecStatus, ExecutionResult, Sandbox, TimeoutClass};
use crate::tools::{ToolCall, ToolMultiplexer, ToolResult, ToolStatus};

use extract::{extract, CandidateCommand};
use report::{
    Evidence, FailedEntry, SkipReason, SkippedEntry, VerificationReport, VerifiedEntry,
    EMPTY_EXTRACTION_NOTE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ResourceLoaded,
    CommandsExtracted,
    Classifying,
    Executing,
    ExternalLookup,
    ReportReady,
    Terminal,
}

impl RunState {
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, ResourceLoaded)
                | (ResourceLoaded, CommandsExtracted)
                | (CommandsExtracted, Classifying)
                | (CommandsExtracted, ReportReady)
                | (Classifying, Executing)
                | (Classifying, ReportReady)
                | (Executing, ExternalLookup)
                | (Executing, ReportReady)
                | (ExternalLookup, ReportReady)
                | (ReportReady, Terminal)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

fn advance(state: &mut RunState, next: RunState) {
    if !state.can_advance_to(next) {
        warn!("Unexpected state transition {state} -> {next}");
    }
    debug!("{state} -> {next}");
    *state = next;
}

/// Result of `<tool> --help`.
enum Probe {
    /// The tool ran; `text` is everything it printed.
    Help { text: String, result: ExecutionResult },
    /// Exit 127 or spawn failure: not installed here.
    Missing,
    /// Timed out, refused, or otherwise unusable.
    Inconclusive(String),
}

impl Probe {
    fn from_tool_result(result: ToolResult) -> Self {
        let Some(execution) = result.execution else {
            return Probe::Inconclusive(result.text);
        };
        if execution.command_not_found() {
            return Probe::Missing;
        }
        match execution.status.clone() {
            ExecStatus::Completed => Probe::Help {
                text: format!("{}\n{}", execution.stdout, execution.stderr),
                result: execution,
            },
            ExecStatus::TimedOut => Probe::Inconclusive("--help timed out".to_string()),
            ExecStatus::ExecError(e) => Probe::Inconclusive(e),
        }
    }
}

/// What a run does with one candidate after classification and probing.
enum Plan {
    Done(Outcome),
    /// Execute this command line (the candidate or its dry-run rewrite).
    Run(String),
    /// Ask the documentation source about `tool`.
    Lookup {
        tool: String,
        terms: Vec<String>,
        why: String,
    },
}

enum Outcome {
    Verified(Evidence),
    Skipped(SkipReason),
    Failed(String),
}

/// Tool names that may be spliced into a `--help` probe as-is.
fn is_probeable(tool: &str) -> bool {
    !tool.is_empty()
        && !tool.starts_with('-')
        && tool
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/' | '+'))
}

fn probe_command(tool: &str) -> String {
    format!("{tool} --help")
}

/// One-line failure description for the report.
fn failure_detail(result: &ExecutionResult) -> String {
    match &result.status {
        ExecStatus::Completed => {
            let first_line = result
                .stderr
                .lines()
                .chain(result.stdout.lines())
                .map(str::trim)
                .find(|l| !l.is_empty());
            match first_line {
                Some(line) => format!("exit {}: {line}", result.exit_code),
                None => format!("exit {}", result.exit_code),
            }
        }
        ExecStatus::TimedOut => format!("timed out after {}s", result.timeout.as_secs()),
        ExecStatus::ExecError(e) => format!("execution error: {e}"),
    }
}

pub struct Orchestrator {
    loader: ResourceLoader,
    sandbox: Arc<Sandbox>,
    tools: ToolMultiplexer,
    classifier: Option<SafetyClassifier>,
    docs: Option<Arc<dyn DocsLookup>>,
    config: VerifierConfig,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Self {
        let docs: Option<Arc<dyn DocsLookup>> = if config.docs.enabled {
            Some(Arc::new(HttpDocsLookup::new(&config.docs)))
        } else {
            None
        };
        Self::with_docs(config, docs)
    }

    /// Like `new()`, with an explicit documentation source (`None` disables
    /// external lookups).
    pub fn with_docs(config: &Config, docs: Option<Arc<dyn DocsLookup>>) -> Self {
        let sandbox = Arc::new(Sandbox::new(config.sandbox.clone()));
        let classifier = config
            .verifier
            .safety_checks
            .then(|| SafetyClassifier::new(sandbox.scratch_dir()));

        Self {
            loader: ResourceLoader::new(&config.resources),
            // Candidates are classified here before dispatch; the tool-level
            // guard is for outside callers.
            tools: ToolMultiplexer::standard(sandbox.clone(), None),
            sandbox,
            classifier,
            docs,
            config: config.verifier.clone(),
        }
    }

    pub async fn list_resources(&self) -> Result<BTreeSet<String>, VerifyError> {
        if !self.config.list_resources {
            return Err(VerifyError::ListingDisabled);
        }
        Ok(self.loader.list().await?)
    }

    /// Verifies every documented command of `resource`.
    pub async fn verify(
        &self,
        resource: &str,
        instruction: Option<&str>,
    ) -> Result<VerificationReport, VerifyError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", id = %run_id, resource = %resource);
        self.run(run_id, resource, instruction)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        run_id: Uuid,
        resource: &str,
        instruction: Option<&str>,
    ) -> Result<VerificationReport, VerifyError> {
        let mut state = RunState::Idle;
        let mut report = VerificationReport::new(
            run_id,
            resource,
            instruction.map(str::to_string),
            self.config.mode,
        );
        info!("Verifying {resource} ({} mode)", self.config.mode);

        let loaded = self.loader.load(resource).await.map_err(|e| {
            error!("Cannot load {resource}: {e}");
            VerifyError::from(e)
        })?;
        advance(&mut state, RunState::ResourceLoaded);

        let candidates = extract(&loaded);
        advance(&mut state, RunState::CommandsExtracted);
        info!("Extracted {} candidate commands", candidates.len());

        if candidates.is_empty() {
            report.note = Some(EMPTY_EXTRACTION_NOTE.to_string());
            advance(&mut state, RunState::ReportReady);
            advance(&mut state, RunState::Terminal);
            return Ok(report);
        }

        advance(&mut state, RunState::Classifying);
        let mut verdicts: Vec<Option<ClassificationVerdict>> = candidates
            .iter()
            .map(|c| {
                let verdict = self.classifier.as_ref().map(|k| k.classify(&c.text));
                if let Some(ref v) = verdict {
                    debug!("{}: {v}", c.text);
                }
                verdict
            })
            .collect();

        let runnable = verdicts
            .iter()
            .any(|v| !v.as_ref().is_some_and(ClassificationVerdict::is_unsafe));
        if runnable {
            self.preflight().await?;
            advance(&mut state, RunState::Executing);
        }

        let semaphore = Semaphore::new(self.config.concurrency());
        let limiter = &semaphore;

        // Baseline `--help` probes, one per distinct tool
        let probe_tools: BTreeSet<&str> = candidates
            .iter()
            .zip(&verdicts)
            .filter(|(_, v)| !v.as_ref().is_some_and(ClassificationVerdict::is_unsafe))
            .filter_map(|(c, _)| c.tool.as_deref())
            .filter(|t| is_probeable(t))
            .collect();
        let probes: HashMap<String, Probe> =
            join_all(probe_tools.iter().map(|tool| self.probe(limiter, tool)))
                .await
                .into_iter()
                .collect();

        // Help text that advertises --dry-run can rescue a default-deny.
        if self.config.mode == VerifyMode::Execute {
            if let Some(ref classifier) = self.classifier {
                for (candidate, verdict) in candidates.iter().zip(verdicts.iter_mut()) {
                    let Some(current) = verdict.as_ref() else { continue };
                    if current.rule != Rule::Default {
                        continue;
                    }
                    let help = candidate.tool.as_deref().and_then(|t| match probes.get(t) {
                        Some(Probe::Help { text, .. }) => Some(text.as_str()),
                        _ => None,
                    });
                    if let Some(help) = help {
                        let revised =
                            classifier.classify_with(&candidate.text, TimeoutClass::Standard, Some(help));
                        if revised.verdict != current.verdict {
                            debug!("{}: reclassified as {revised}", candidate.text);
                            *verdict = Some(revised);
                        }
                    }
                }
            }
        }

        let plans: Vec<Plan> = candidates
            .iter()
            .zip(&verdicts)
            .map(|(c, v)| self.plan(c, v.as_ref(), &probes))
            .collect();

        let executions = join_all(plans.iter().enumerate().filter_map(|(i, plan)| match plan {
            Plan::Run(command) => {
                let reuse = candidates[i].tool.as_deref().and_then(|t| match probes.get(t) {
                    Some(Probe::Help { result, .. }) if *command == probe_command(t) => Some(result),
                    _ => None,
                });
                Some(async move { (i, self.execute(limiter, command, reuse).await) })
            }
            _ => None,
        }));

        let lookup_tools: BTreeSet<&str> = plans
            .iter()
            .filter_map(|p| match p {
                Plan::Lookup { tool, .. } => Some(tool.as_str()),
                _ => None,
            })
            .collect();
        if !lookup_tools.is_empty() && state == RunState::Executing {
            advance(&mut state, RunState::ExternalLookup);
        }
        let lookups = self.lookup_all(&lookup_tools);

        let (executions, pages) = tokio::join!(executions, lookups);
        let mut executions: HashMap<usize, ToolResult> = executions.into_iter().collect();

        for (i, (candidate, plan)) in candidates.into_iter().zip(plans).enumerate() {
            let outcome = match plan {
                Plan::Done(outcome) => outcome,
                Plan::Run(command) => match executions.remove(&i) {
                    Some(result) => execution_outcome(&candidate, command, result),
                    None => Outcome::Failed("not executed".to_string()),
                },
                Plan::Lookup { tool, terms, why } => {
                    lookup_outcome(self.docs.is_some(), pages.get(&tool), &terms, why)
                }
            };
            match outcome {
                Outcome::Verified(evidence) => report.verified.push(VerifiedEntry {
                    command: candidate,
                    evidence,
                }),
                Outcome::Skipped(reason) => report.skipped.push(SkippedEntry {
                    command: candidate,
                    reason,
                }),
                Outcome::Failed(detail) => report.failed.push(FailedEntry {
                    command: candidate,
                    detail,
                }),
            }
        }

        advance(&mut state, RunState::ReportReady);
        info!(
            "Run complete: {} verified, {} skipped, {} failed",
            report.verified.len(),
            report.skipped.len(),
            report.failed.len()
        );
        advance(&mut state, RunState::Terminal);
        Ok(report)
    }

    /// Fails the run when the sandbox cannot spawn its shell at all.
    async fn preflight(&self) -> Result<(), VerifyError> {
        let result = self.sandbox.execute("exit 0", TimeoutClass::Standard).await;
        match result.status {
            ExecStatus::ExecError(e) => {
                error!("Sandbox preflight failed: {e}");
                Err(VerifyError::SandboxUnavailable(e))
            }
            _ => Ok(()),
        }
    }

    async fn probe(&self, limiter: &Semaphore, tool: &str) -> (String, Probe) {
        let command = probe_command(tool);
        if let Some(ref classifier) = self.classifier {
            let verdict = classifier.classify(&command);
            if !verdict.is_safe() {
                warn!("Not probing {tool}: {verdict}");
                return (
                    tool.to_string(),
                    Probe::Inconclusive(format!("help probe refused: {}", verdict.reason)),
                );
            }
        }
        let probe = Probe::from_tool_result(self.run_command(limiter, &command).await);
        if matches!(probe, Probe::Missing) {
            info!("{tool} is not installed");
        }
        (tool.to_string(), probe)
    }

    /// Runs a candidate. `reuse` is the probe's result when the candidate
    /// is the probe command itself.
    async fn execute(
        &self,
        limiter: &Semaphore,
        command: &str,
        reuse: Option<&ExecutionResult>,
    ) -> ToolResult {
        if let Some(result) = reuse {
            debug!("Reusing probe result for {command}");
            return ToolResult::from_execution(result.clone());
        }
        self.run_command(limiter, command).await
    }

    async fn run_command(&self, limiter: &Semaphore, command: &str) -> ToolResult {
        let _permit = match limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => return ToolResult::error(ToolStatus::Failed, e),
        };
        self.tools
            .dispatch(&ToolCall::new("run_command", json!({ "command": command })))
            .await
    }

    /// Fetches each tool's documentation once.
    async fn lookup_all(
        &self,
        tools: &BTreeSet<&str>,
    ) -> HashMap<String, Result<DocsPage, LookupError>> {
        let Some(ref docs) = self.docs else {
            return HashMap::new();
        };
        join_all(tools.iter().map(|tool| async move {
            let page = docs.fetch(tool).await;
            if let Err(ref e) = page {
                info!("Documentation lookup for {tool}: {e}");
            }
            (tool.to_string(), page)
        }))
        .await
        .into_iter()
        .collect()
    }

    fn plan(
        &self,
        candidate: &CandidateCommand,
        verdict: Option<&ClassificationVerdict>,
        probes: &HashMap<String, Probe>,
    ) -> Plan {
        if let Some(v) = verdict.filter(|v| v.is_unsafe()) {
            info!("Skipping `{}`: {}", candidate.text, v.reason);
            return Plan::Done(Outcome::Skipped(SkipReason::Unsafe(v.reason.clone())));
        }

        let terms: Vec<String> = candidate.subcommand().into_iter().collect();
        let probe = candidate.tool.as_deref().and_then(|t| probes.get(t));
        let lookup = |why: &str| Plan::Lookup {
            tool: candidate.tool.clone().unwrap_or_default(),
            terms: terms.clone(),
            why: why.to_string(),
        };

        match self.config.mode {
            VerifyMode::Existence => match (candidate.tool.as_deref(), probe) {
                (None, _) => Plan::Done(Outcome::Skipped(SkipReason::Unverifiable(
                    "no tool to probe".to_string(),
                ))),
                (Some(_), None) => Plan::Done(Outcome::Skipped(SkipReason::Unverifiable(
                    "tool name cannot be probed".to_string(),
                ))),
                (Some(_), Some(Probe::Help { text, .. })) => {
                    let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
                    if mentions_all(text, &terms) {
                        Plan::Done(Outcome::Verified(Evidence::HelpListing))
                    } else {
                        lookup("not in --help")
                    }
                }
                (Some(_), Some(Probe::Missing)) => lookup("not installed"),
                (Some(_), Some(Probe::Inconclusive(why))) => lookup(why),
            },
            VerifyMode::Execute => {
                let Some(verdict) = verdict else {
                    return Plan::Done(Outcome::Skipped(SkipReason::Unsafe(
                        "safety checks are disabled; not executing".to_string(),
                    )));
                };
                if matches!(probe, Some(Probe::Missing)) {
                    return lookup("not installed");
                }
                Plan::Run(
                    verdict
                        .rewritten
                        .clone()
                        .unwrap_or_else(|| candidate.text.clone()),
                )
            }
        }
    }
}

fn execution_outcome(candidate: &CandidateCommand, command: String, result: ToolResult) -> Outcome {
    let Some(execution) = result.execution else {
        return Outcome::Failed(result.text);
    };
    if execution.succeeded() {
        let ran = (command != candidate.text).then_some(command);
        Outcome::Verified(Evidence::Executed {
            exit_code: execution.exit_code,
            duration: execution.duration,
            ran,
        })
    } else {
        let detail = failure_detail(&execution);
        info!("`{}` failed: {detail}", candidate.text);
        Outcome::Failed(detail)
    }
}

fn lookup_outcome(
    enabled: bool,
    page: Option<&Result<DocsPage, LookupError>>,
    terms: &[String],
    why: String,
) -> Outcome {
    let unverifiable = |detail: String| Outcome::Skipped(SkipReason::Unverifiable(detail));
    if !enabled {
        return unverifiable(format!("{why}; documentation lookup disabled"));
    }
    match page {
        Some(Ok(page)) => {
            let terms: Vec<&str> = terms.iter().map(String::as_str).collect();
            if mentions_all(&page.text, &terms) {
                Outcome::Verified(Evidence::Documentation {
                    url: page.url.clone(),
                })
            } else {
                unverifiable(format!("{why}; not found in {}", page.url))
            }
        }
        Some(Err(e)) => unverifiable(format!("{why}; {e}")),
        None => unverifiable(format!("{why}; no documentation source")),
    }
}
