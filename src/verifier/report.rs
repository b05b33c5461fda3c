//! Verification report and its text rendering.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use super::extract::CandidateCommand;
use crate::config::VerifyMode;

/// Note attached to reports of resources without any shell block.
pub const EMPTY_EXTRACTION_NOTE: &str = "No fenced shell code blocks found.";

/// Why a command counts as verified.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    /// Ran in the sandbox and exited 0. `ran` is set when the dry-run
    /// rewrite was executed instead of the documented form.
    Executed {
        exit_code: i32,
        duration: Duration,
        ran: Option<String>,
    },
    /// The tool's `--help` lists the subcommand.
    HelpListing,
    /// Not confirmed locally, but the upstream documentation mentions it.
    Documentation { url: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Refused by the safety classifier; never reached the sandbox.
    Unsafe(String),
    /// Could not be confirmed locally nor upstream.
    Unverifiable(String),
}

#[derive(Debug, Clone)]
pub struct VerifiedEntry {
    pub command: CandidateCommand,
    pub evidence: Evidence,
}

#[derive(Debug, Clone)]
pub struct SkippedEntry {
    pub command: CandidateCommand,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct FailedEntry {
    pub command: CandidateCommand,
    pub detail: String,
}

/// Outcome of one verification run. Every extracted command is in exactly
/// one of `verified`, `skipped`, `failed`, in extraction order.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub run_id: Uuid,
    pub resource: String,
    pub instruction: Option<String>,
    pub mode: VerifyMode,
    pub generated_at: DateTime<Utc>,
    pub verified: Vec<VerifiedEntry>,
    pub skipped: Vec<SkippedEntry>,
    pub failed: Vec<FailedEntry>,
    pub note: Option<String>,
}

impl VerificationReport {
    pub fn new(
        run_id: Uuid,
        resource: impl Into<String>,
        instruction: Option<String>,
        mode: VerifyMode,
    ) -> Self {
        Self {
            run_id,
            resource: resource.into(),
            instruction,
            mode,
            generated_at: Utc::now(),
            verified: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
            note: None,
        }
    }

    pub fn total(&self) -> usize {
        self.verified.len() + self.skipped.len() + self.failed.len()
    }

    /// Distinct tools across all entries.
    pub fn tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = Vec::new();
        let commands = self
            .verified
            .iter()
            .map(|e| &e.command)
            .chain(self.skipped.iter().map(|e| &e.command))
            .chain(self.failed.iter().map(|e| &e.command));
        for command in commands {
            if let Some(tool) = command.tool.as_deref() {
                if !tools.contains(&tool) {
                    tools.push(tool);
                }
            }
        }
        tools
    }

    fn confirmed_locally(&self) -> impl Iterator<Item = &VerifiedEntry> {
        self.verified
            .iter()
            .filter(|e| !matches!(e.evidence, Evidence::Documentation { .. }))
    }

    fn documented_online(&self) -> impl Iterator<Item = &VerifiedEntry> {
        self.verified
            .iter()
            .filter(|e| matches!(e.evidence, Evidence::Documentation { .. }))
    }

    fn undocumented(&self) -> impl Iterator<Item = (&CandidateCommand, &str)> {
        self.skipped.iter().filter_map(|e| match &e.reason {
            SkipReason::Unverifiable(why) => Some((&e.command, why.as_str())),
            SkipReason::Unsafe(_) => None,
        })
    }

    fn unsafe_skips(&self) -> impl Iterator<Item = (&CandidateCommand, &str)> {
        self.skipped.iter().filter_map(|e| match &e.reason {
            SkipReason::Unsafe(why) => Some((&e.command, why.as_str())),
            SkipReason::Unverifiable(_) => None,
        })
    }
}

fn section<I>(f: &mut fmt::Formatter<'_>, title: &str, lines: I) -> fmt::Result
where
    I: Iterator<Item = String>,
{
    writeln!(f)?;
    writeln!(f, "{title}:")?;
    let mut empty = true;
    for line in lines {
        writeln!(f, "  - {line}")?;
        empty = false;
    }
    if empty {
        writeln!(f, "  (none)")?;
    }
    Ok(())
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Resource: {}", self.resource)?;
        let tools = self.tools();
        if tools.is_empty() {
            writeln!(f, "Tool: -")?;
        } else {
            writeln!(f, "Tool: {}", tools.join(", "))?;
        }
        if let Some(ref instruction) = self.instruction {
            writeln!(f, "Instruction: {instruction}")?;
        }
        writeln!(f, "Mode: {}", self.mode)?;
        writeln!(f, "Run: {}", self.run_id)?;
        writeln!(
            f,
            "Generated: {}",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;

        if let Some(ref note) = self.note {
            writeln!(f)?;
            writeln!(f, "{note}")?;
        }

        let verified_title = match self.mode {
            VerifyMode::Existence => "Verified (in --help)",
            VerifyMode::Execute => "Verified (executed)",
        };
        section(
            f,
            verified_title,
            self.confirmed_locally().map(|e| match &e.evidence {
                Evidence::Executed {
                    exit_code,
                    duration,
                    ran: Some(ran),
                } => format!(
                    "{} (ran `{ran}`, exit {exit_code}, {:.1}s)",
                    e.command.text,
                    duration.as_secs_f64()
                ),
                Evidence::Executed {
                    exit_code,
                    duration,
                    ran: None,
                } => format!(
                    "{} (exit {exit_code}, {:.1}s)",
                    e.command.text,
                    duration.as_secs_f64()
                ),
                _ => e.command.text.clone(),
            }),
        )?;
        section(
            f,
            "Not in --help but documented online",
            self.documented_online().map(|e| match &e.evidence {
                Evidence::Documentation { url } => format!("{} ({url})", e.command.text),
                _ => e.command.text.clone(),
            }),
        )?;
        section(
            f,
            "Undocumented",
            self.undocumented()
                .map(|(c, why)| format!("{}: {why}", c.text)),
        )?;
        section(
            f,
            "Skipped (unsafe)",
            self.unsafe_skips().map(|(c, why)| format!("{}: {why}", c.text)),
        )?;
        section(
            f,
            "Failed",
            self.failed
                .iter()
                .map(|e| format!("{}: {}", e.command.text, e.detail)),
        )
    }
}
