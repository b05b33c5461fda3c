//! Safety classifier: decides whether a documented command may run.
//!
//! Rules are evaluated in order and the first match wins:
//!
//! 1. A destructive token anywhere as a whole word → UNSAFE.
//! 2. A file write (`>`, `>>`, `tee`) outside the scratch directory → UNSAFE.
//! 3. A system-mutating package/service manager → UNSAFE, except on the
//!    setup-class path.
//! 4. A tool known to support `--dry-run`, invoked without it → NEEDS_DRY_RUN
//!    with the flag appended. When a trailing comment or a `--` marker would
//!    keep the flag from reaching the tool, UNSAFE instead.
//! 5. A read-only verb leading the subcommand path (`get`, `list`, ...) or a
//!    bare `--help`/`--version` probe → SAFE.
//! 6. Anything else → UNSAFE ("unclassified; conservative default").
//!
//! Blocking a harmless command is acceptable; running a destructive one is
//! not. Compound commands are judged segment by segment and are only SAFE
//! when every segment is.

pub mod shell;

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::sandbox::TimeoutClass;
use shell::{Parsed, Segment};

/// Tokens that make a command UNSAFE wherever they appear as a whole word.
const DESTRUCTIVE_TOKENS: &[&str] = &[
    "rm", "delete", "drop", "truncate", "destroy", "sudo", "mkfs", "dd", "shred", "shutdown",
    "reboot", "kill", "killall",
];

/// Programs that mutate the system whatever their arguments.
const SYSTEM_MANAGERS: &[&str] = &[
    "apt", "apt-get", "aptitude", "dpkg", "yum", "dnf", "rpm", "zypper", "pacman", "apk", "snap",
    "port", "systemctl", "service", "launchctl",
];

/// (program, subcommands) pairs that install or remove software.
const INSTALLERS: &[(&str, &[&str])] = &[
    ("brew", &["install", "uninstall", "reinstall", "upgrade", "tap", "untap"]),
    ("pip", &["install", "uninstall"]),
    ("pip3", &["install", "uninstall"]),
    ("gem", &["install", "uninstall"]),
    ("cargo", &["install", "uninstall"]),
    ("go", &["install"]),
];

/// Package managers that only mutate the system with a global flag.
const GLOBAL_INSTALLERS: &[&str] = &["npm", "pnpm", "yarn"];

/// Dry-run table: (program, subcommands or empty for any, flag to append).
const DRY_RUN_TOOLS: &[(&str, &[&str], &str)] = &[
    (
        "kubectl",
        &["apply", "create", "patch", "replace", "scale", "label", "annotate", "expose", "run", "set"],
        "--dry-run=client",
    ),
    ("helm", &["install", "upgrade", "uninstall", "rollback"], "--dry-run"),
    ("rsync", &[], "--dry-run"),
    ("git", &["push", "add", "commit", "clean", "mv"], "--dry-run"),
    ("npm", &["publish", "install", "uninstall", "ci"], "--dry-run"),
    ("cargo", &["publish"], "--dry-run"),
    ("make", &[], "--dry-run"),
];

/// Flags that only print information when they end the command.
const PROBE_FLAGS: &[&str] = &["--help", "-h", "--version"];

/// Subcommand verbs that only read.
const READ_ONLY_VERBS: &[&str] = &[
    "get", "list", "ls", "describe", "show", "cat", "help", "version", "status", "view", "inspect",
];

/// Verbs that stop the search for a read-only verb further right
/// (`docker run image list` is not a listing).
const MUTATING_VERBS: &[&str] = &[
    "run", "exec", "create", "apply", "install", "update", "upgrade", "set", "push", "put",
    "write", "start", "stop", "restart", "add", "remove", "deploy", "init", "edit", "patch",
    "replace", "scale", "commit", "merge", "reset", "rebase", "checkout", "login", "logout",
    "pull", "fetch", "clone", "archive", "branch", "tag", "mv", "cp", "move", "copy", "rename",
    "import", "export", "upload", "download", "sync", "build", "prune", "purge", "flush", "clear",
    "revert", "restore", "stash", "enable", "disable", "config", "send", "submit", "close",
    "lock", "unlock", "attach", "detach", "cordon", "drain", "taint", "rollout",
];

/// Programs that only read or print. `tee` is here because its targets
/// were already checked against the scratch directory.
const READ_ONLY_PROGRAMS: &[&str] = &[
    "cat", "ls", "echo", "pwd", "which", "head", "tail", "wc", "grep", "true", "uname", "whoami",
    "date", "tee",
];

/// How many leading subcommand words may hold a read-only verb
/// (`gcloud compute instances list`).
const VERB_SEARCH_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe,
    NeedsDryRun,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Unsafe => write!(f, "UNSAFE"),
            Verdict::NeedsDryRun => write!(f, "NEEDS_DRY_RUN"),
        }
    }
}

/// Which rule produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Empty,
    Destructive,
    Unparseable,
    Substitution,
    FileWrite,
    PackageManager,
    SetupClass,
    DryRun,
    ReadOnly,
    Default,
}

/// Verdict for one command. `rewritten` is set for NEEDS_DRY_RUN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationVerdict {
    pub verdict: Verdict,
    pub rule: Rule,
    pub reason: String,
    pub rewritten: Option<String>,
}

impl ClassificationVerdict {
    fn safe(rule: Rule, reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Safe,
            rule,
            reason: reason.into(),
            rewritten: None,
        }
    }

    fn unsafe_(rule: Rule, reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Unsafe,
            rule,
            reason: reason.into(),
            rewritten: None,
        }
    }

    fn dry_run(reason: impl Into<String>, rewritten: String) -> Self {
        Self {
            verdict: Verdict::NeedsDryRun,
            rule: Rule::DryRun,
            reason: reason.into(),
            rewritten: Some(rewritten),
        }
    }

    pub fn is_safe(&self) -> bool {
        self.verdict == Verdict::Safe
    }

    pub fn is_unsafe(&self) -> bool {
        self.verdict == Verdict::Unsafe
    }
}

impl fmt::Display for ClassificationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.verdict, self.reason)
    }
}

/// Ordered-rule command classifier. Pure: no I/O, no state.
#[derive(Debug, Clone)]
pub struct SafetyClassifier {
    scratch_dir: PathBuf,
}

impl SafetyClassifier {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Classifies a command headed for the standard execution path.
    pub fn classify(&self, command: &str) -> ClassificationVerdict {
        self.classify_with(command, TimeoutClass::Standard, None)
    }

    /// Classifies a command headed for the setup path.
    pub fn classify_setup(&self, command: &str) -> ClassificationVerdict {
        self.classify_with(command, TimeoutClass::Setup, None)
    }

    /// Full classification. Package managers pass only for `TimeoutClass::Setup`.
    ///
    /// `help_text` is the tool's `--help` output when known: if it mentions
    /// `--dry-run`, a command that would otherwise hit the conservative
    /// default is rewritten instead of denied.
    pub fn classify_with(
        &self,
        command: &str,
        class: TimeoutClass,
        help_text: Option<&str>,
    ) -> ClassificationVerdict {
        let command = command.trim();
        if command.is_empty() {
            return ClassificationVerdict::unsafe_(Rule::Empty, "empty command");
        }

        // Rule 1
        if let Some(token) = destructive_token(command) {
            return ClassificationVerdict::unsafe_(
                Rule::Destructive,
                format!("destructive token `{token}`"),
            );
        }

        let parsed = match shell::parse(command) {
            Ok(p) => p,
            Err(e) => {
                return ClassificationVerdict::unsafe_(
                    Rule::Unparseable,
                    format!("cannot parse command: {e}"),
                )
            }
        };
        if parsed.substitution {
            return ClassificationVerdict::unsafe_(
                Rule::Substitution,
                "command substitution is not allowed",
            );
        }

        // Rule 2
        for segment in &parsed.segments {
            if let Some(target) = self.forbidden_write(segment) {
                return ClassificationVerdict::unsafe_(
                    Rule::FileWrite,
                    format!(
                        "writes to `{target}` outside scratch directory {}",
                        self.scratch_dir.display()
                    ),
                );
            }
        }

        // Rule 3
        let mut setup_segments = vec![false; parsed.segments.len()];
        for (i, segment) in parsed.segments.iter().enumerate() {
            if let Some(manager) = package_manager(segment) {
                if class == TimeoutClass::Setup {
                    setup_segments[i] = true;
                } else {
                    return ClassificationVerdict::unsafe_(
                        Rule::PackageManager,
                        format!("`{manager}` mutates the system; use setup_environment"),
                    );
                }
            }
        }

        // Rules 4-6, per segment
        let single = parsed.segments.len() == 1;
        let mut pending_dry_run = None;
        for (i, segment) in parsed.segments.iter().enumerate() {
            if setup_segments[i] {
                continue;
            }
            if let Some((tool, flag)) = dry_run_flag(segment) {
                if !single {
                    return ClassificationVerdict::unsafe_(
                        Rule::DryRun,
                        format!("`{tool}` needs {flag} but is part of a compound command"),
                    );
                }
                if let Some(why) = rewrite_blocker(&parsed, segment) {
                    return ClassificationVerdict::unsafe_(
                        Rule::DryRun,
                        format!("`{tool}` needs {flag} but {why}"),
                    );
                }
                pending_dry_run = Some(ClassificationVerdict::dry_run(
                    format!("`{tool}` supports {flag}"),
                    format!("{command} {flag}"),
                ));
                continue;
            }
            if is_read_only(segment) {
                continue;
            }
            if let (true, Some(help)) = (single, help_text) {
                if help.contains("--dry-run")
                    && !has_flag(segment, "--dry-run")
                    && rewrite_blocker(&parsed, segment).is_none()
                {
                    let tool = segment.program().unwrap_or("command");
                    return ClassificationVerdict::dry_run(
                        format!("`{tool}` --help lists --dry-run"),
                        format!("{command} --dry-run"),
                    );
                }
            }
            return ClassificationVerdict::unsafe_(
                Rule::Default,
                "unclassified; conservative default",
            );
        }

        if let Some(verdict) = pending_dry_run {
            return verdict;
        }
        if setup_segments.iter().any(|s| *s) {
            return ClassificationVerdict::safe(Rule::SetupClass, "package manager on setup path");
        }
        ClassificationVerdict::safe(Rule::ReadOnly, "read-only command")
    }

    /// First redirection or `tee` target that is not inside the scratch dir.
    fn forbidden_write<'a>(&self, segment: &'a Segment) -> Option<&'a str> {
        let tee_targets: Vec<&str> = if segment.program() == Some("tee") {
            segment.positional().collect()
        } else {
            Vec::new()
        };
        segment
            .write_targets
            .iter()
            .map(String::as_str)
            .chain(tee_targets)
            .find(|target| !self.is_allowed_target(target))
    }

    fn is_allowed_target(&self, target: &str) -> bool {
        if target == "/dev/null" {
            return true;
        }
        let path = Path::new(target);
        path.is_absolute()
            && !path.components().any(|c| c == Component::ParentDir)
            && path.starts_with(&self.scratch_dir)
    }
}

fn destructive_token(command: &str) -> Option<&'static str> {
    command
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .find_map(|word| {
            let lower = word.to_lowercase();
            DESTRUCTIVE_TOKENS.iter().copied().find(|t| *t == lower)
        })
}

fn package_manager(segment: &Segment) -> Option<String> {
    let program = segment.program()?;
    let name = program.rsplit('/').next().unwrap_or(program);

    if SYSTEM_MANAGERS.contains(&name) {
        return Some(name.to_string());
    }

    let sub = segment.positional().next();
    for (tool, subs) in INSTALLERS {
        if *tool == name {
            if let Some(sub) = sub.filter(|s| subs.contains(s)) {
                return Some(format!("{name} {sub}"));
            }
        }
    }

    if GLOBAL_INSTALLERS.contains(&name)
        && segment
            .args()
            .iter()
            .any(|a| a == "-g" || a == "--global" || a == "global")
    {
        return Some(format!("{name} (global)"));
    }

    None
}

/// Why an appended flag would not reach the segment's program.
fn rewrite_blocker(parsed: &Parsed, segment: &Segment) -> Option<&'static str> {
    if parsed.comment {
        Some("a trailing comment would swallow the flag")
    } else if segment.ends_options() {
        Some("words after `--` belong to another command")
    } else {
        None
    }
}

/// Looks for `flag` among the options, ignoring anything after `--`.
fn has_flag(segment: &Segment, flag: &str) -> bool {
    let stem = flag.split('=').next().unwrap_or(flag);
    segment
        .options()
        .iter()
        .any(|a| a == flag || a == stem || a.starts_with(&format!("{stem}=")))
}

/// `add`, `compute`, `sparse-checkout`; not `-D`, `origin/main`, `FLUSHALL`.
fn is_subcommand_word(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_lowercase())
        && word
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

/// Leading subcommand words, up to the first flag or value-looking word.
fn subcommand_path(segment: &Segment) -> impl Iterator<Item = &str> {
    segment
        .args()
        .iter()
        .map(String::as_str)
        .take_while(|w| is_subcommand_word(w))
}

/// `tool [sub...] --help`: the probe flag ends the command and only
/// subcommand words precede it. `-h` must be the sole argument since many
/// tools read it as a host name.
fn is_probe(segment: &Segment) -> bool {
    let Some((last, chain)) = segment.args().split_last() else {
        return false;
    };
    if !PROBE_FLAGS.contains(&last.as_str()) {
        return false;
    }
    if last == "-h" {
        chain.is_empty()
    } else {
        chain.iter().all(|w| is_subcommand_word(w))
    }
}

/// Rule 4: `(tool, flag)` when the tool supports a dry run that is missing.
fn dry_run_flag(segment: &Segment) -> Option<(&'static str, &'static str)> {
    if is_probe(segment) {
        return None;
    }
    let program = segment.program()?;
    let sub = segment.positional().next();
    DRY_RUN_TOOLS
        .iter()
        .find(|(tool, subs, _)| {
            *tool == program && (subs.is_empty() || sub.is_some_and(|s| subs.contains(&s)))
        })
        .filter(|(_, _, flag)| !has_flag(segment, flag))
        .map(|(tool, _, flag)| (*tool, *flag))
}

/// Rule 5.
fn is_read_only(segment: &Segment) -> bool {
    let Some(program) = segment.program() else {
        return true;
    };
    if is_probe(segment) {
        return true;
    }
    if READ_ONLY_PROGRAMS.contains(&program) {
        return true;
    }
    // A command already carrying its dry-run flag.
    if DRY_RUN_TOOLS
        .iter()
        .any(|(tool, _, flag)| *tool == program && has_flag(segment, flag))
    {
        return true;
    }
    for word in subcommand_path(segment).take(VERB_SEARCH_DEPTH) {
        if MUTATING_VERBS.contains(&word) {
            return false;
        }
        if READ_ONLY_VERBS.contains(&word) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> SafetyClassifier {
        SafetyClassifier::new("/tmp/doc-verifier")
    }

    fn verdict(command: &str) -> Verdict {
        classifier().classify(command).verdict
    }

    // ── Rule 1: destructive tokens ──────────────────────

    #[test]
    fn test_destructive_tokens_are_unsafe() {
        for cmd in [
            "rm -rf /tmp/x",
            "kubectl delete pod web",
            "psql -c 'DROP TABLE users'",
            "truncate -s 0 log",
            "terraform destroy",
            "git destroy-everything",
            "/bin/rm file",
        ] {
            let v = classifier().classify(cmd);
            assert_eq!(v.verdict, Verdict::Unsafe, "{cmd}");
            assert_eq!(v.rule, Rule::Destructive, "{cmd}");
        }
    }

    #[test]
    fn test_destructive_reason_names_token() {
        let v = classifier().classify("git destroy-everything");
        assert!(v.reason.contains("destroy"));
    }

    #[test]
    fn test_token_must_be_whole_word() {
        // "format" and "perm" contain "rm" but not as a word
        assert_ne!(classifier().classify("format").rule, Rule::Destructive);
        assert_ne!(classifier().classify("ls --perm").rule, Rule::Destructive);
        assert_ne!(classifier().classify("git add .").rule, Rule::Destructive);
        assert_ne!(classifier().classify("dropbox status").rule, Rule::Destructive);
    }

    // ── Rule 2: file writes ─────────────────────────────

    #[test]
    fn test_redirect_outside_scratch_is_unsafe() {
        let v = classifier().classify("echo hi > /etc/motd");
        assert_eq!(v.verdict, Verdict::Unsafe);
        assert_eq!(v.rule, Rule::FileWrite);
        assert_eq!(verdict("echo hi >> notes.txt"), Verdict::Unsafe);
    }

    #[test]
    fn test_redirect_inside_scratch_is_allowed() {
        assert_eq!(verdict("echo hi > /tmp/doc-verifier/out.txt"), Verdict::Safe);
        assert_eq!(verdict("cat /etc/hosts > /dev/null"), Verdict::Safe);
        assert_eq!(verdict("ls -la 2>&1"), Verdict::Safe);
    }

    #[test]
    fn test_redirect_escaping_scratch_is_unsafe() {
        assert_eq!(
            verdict("echo hi > /tmp/doc-verifier/../../etc/passwd"),
            Verdict::Unsafe
        );
    }

    #[test]
    fn test_tee_targets_checked() {
        assert_eq!(verdict("echo x | tee /etc/hosts"), Verdict::Unsafe);
        assert_eq!(verdict("echo x | tee -a /tmp/doc-verifier/log"), Verdict::Safe);
    }

    // ── Rule 3: package managers ────────────────────────

    #[test]
    fn test_package_managers_unsafe_on_standard_path() {
        for cmd in [
            "apt-get install -y curl",
            "apt list --installed",
            "yum install git",
            "brew install jq",
            "systemctl restart nginx",
            "pip install requests",
            "npm install -g @e2b/cli",
        ] {
            let v = classifier().classify(cmd);
            assert_eq!(v.verdict, Verdict::Unsafe, "{cmd}");
            assert_eq!(v.rule, Rule::PackageManager, "{cmd}");
        }
    }

    #[test]
    fn test_package_managers_safe_on_setup_path() {
        let v = classifier().classify_setup("npm install -g @e2b/cli");
        assert_eq!(v.verdict, Verdict::Safe);
        assert_eq!(v.rule, Rule::SetupClass);
        assert!(classifier().classify_setup("pip install requests").is_safe());
    }

    #[test]
    fn test_setup_path_still_blocks_destructive() {
        assert!(classifier()
            .classify_setup("apt-get remove --purge rm")
            .is_unsafe());
    }

    #[test]
    fn test_brew_read_only_is_not_a_manager() {
        assert_eq!(verdict("brew list"), Verdict::Safe);
    }

    // ── Rule 4: dry run ─────────────────────────────────

    #[test]
    fn test_dry_run_rewrite() {
        let v = classifier().classify("kubectl apply -f deploy.yaml");
        assert_eq!(v.verdict, Verdict::NeedsDryRun);
        assert_eq!(
            v.rewritten.as_deref(),
            Some("kubectl apply -f deploy.yaml --dry-run=client")
        );
    }

    #[test]
    fn test_dry_run_flag_present_is_safe() {
        assert_eq!(verdict("kubectl apply -f deploy.yaml --dry-run=client"), Verdict::Safe);
        assert_eq!(verdict("git push --dry-run origin main"), Verdict::Safe);
        assert_eq!(verdict("rsync -av --dry-run src/ /tmp/doc-verifier/dst/"), Verdict::Safe);
    }

    #[test]
    fn test_dry_run_not_applied_to_probes() {
        assert_eq!(verdict("make --help"), Verdict::Safe);
        assert_eq!(verdict("git push --help"), Verdict::Safe);
    }

    #[test]
    fn test_dry_run_refused_with_trailing_comment() {
        let v = classifier().classify("make all # build everything");
        assert_eq!(v.verdict, Verdict::Unsafe);
        assert_eq!(v.rule, Rule::DryRun);
        assert!(v.reason.contains("comment"), "{}", v.reason);
        assert!(v.rewritten.is_none());
    }

    #[test]
    fn test_dry_run_refused_after_end_of_options() {
        let v = classifier().classify("kubectl run test --image=busybox -- sleep 3600");
        assert_eq!(v.verdict, Verdict::Unsafe);
        assert_eq!(v.rule, Rule::DryRun);
        assert!(v.rewritten.is_none());
    }

    #[test]
    fn test_dry_run_flag_after_end_of_options_does_not_count() {
        let v = classifier().classify("kubectl run test --image=busybox -- echo --dry-run=client");
        assert_eq!(v.verdict, Verdict::Unsafe);
    }

    #[test]
    fn test_comment_after_read_only_command_is_ignored() {
        assert_eq!(verdict("kubectl get pods # list them"), Verdict::Safe);
        assert_eq!(
            verdict("kubectl apply -f x.yaml --dry-run=client # preview"),
            Verdict::Safe
        );
    }

    #[test]
    fn test_dry_run_in_compound_command_is_unsafe() {
        let v = classifier().classify("git add . && git status");
        assert_eq!(v.verdict, Verdict::Unsafe);
        assert_eq!(v.rule, Rule::DryRun);
    }

    #[test]
    fn test_dry_run_inferred_from_help() {
        let help = "Usage: deployer [--dry-run] <target>";
        let v = classifier().classify_with("deployer prod", TimeoutClass::Standard, Some(help));
        assert_eq!(v.verdict, Verdict::NeedsDryRun);
        assert_eq!(v.rewritten.as_deref(), Some("deployer prod --dry-run"));

        let no_flag = classifier().classify_with(
            "deployer prod",
            TimeoutClass::Standard,
            Some("Usage: deployer <target>"),
        );
        assert_eq!(no_flag.verdict, Verdict::Unsafe);
    }

    #[test]
    fn test_dry_run_inference_refused_with_comment() {
        let help = "Usage: deployer [--dry-run] <target>";
        let v = classifier().classify_with("deployer prod # ship it", TimeoutClass::Standard, Some(help));
        assert_eq!(v.verdict, Verdict::Unsafe);
        assert!(v.rewritten.is_none());
    }

    #[test]
    fn test_help_inference_does_not_override_read_only() {
        let v = classifier().classify_with(
            "kubectl get pods",
            TimeoutClass::Standard,
            Some("--dry-run='none'"),
        );
        assert_eq!(v.verdict, Verdict::Safe);
    }

    // ── Rule 5: read-only verbs ─────────────────────────

    #[test]
    fn test_read_only_verbs_safe() {
        for cmd in [
            "git --help",
            "docker --version",
            "az -h",
            "kubectl get pods",
            "gcloud compute instances list",
            "kubectl describe node n1",
            "git remote show origin",
            "cat README.md",
            "ls -la",
        ] {
            assert_eq!(verdict(cmd), Verdict::Safe, "{cmd}");
        }
    }

    #[test]
    fn test_mutating_verb_before_read_only_verb() {
        assert_eq!(verdict("docker run alpine list"), Verdict::Unsafe);
    }

    #[test]
    fn test_read_only_verb_must_lead_the_subcommand_path() {
        for cmd in [
            "git branch -D show",
            "git pull origin show",
            "gh repo archive list",
            "tool -x get",
            "tool ./target list",
        ] {
            assert_eq!(verdict(cmd), Verdict::Unsafe, "{cmd}");
        }
        assert_eq!(verdict("kubectl get pods -n web"), Verdict::Safe);
    }

    #[test]
    fn test_host_flag_is_not_a_probe() {
        for cmd in [
            "redis-cli -h localhost FLUSHALL",
            "mysql -h db.local -e 'UPDATE users SET admin=1'",
            "docker run -h box alpine touch /x",
        ] {
            let v = classifier().classify(cmd);
            assert_eq!(v.verdict, Verdict::Unsafe, "{cmd}: {v}");
        }
    }

    #[test]
    fn test_probe_flag_must_end_the_command() {
        assert_eq!(verdict("git push --help"), Verdict::Safe);
        assert_eq!(verdict("gcloud compute instances --help"), Verdict::Safe);
        assert_ne!(verdict("kubectl --help apply -f x.yaml"), Verdict::Safe);
        assert_ne!(verdict("psql --version -c 'select 1'"), Verdict::Safe);
        assert_ne!(verdict("docker run -h"), Verdict::Safe);
    }

    // ── Rule 6: default ─────────────────────────────────

    #[test]
    fn test_unclassified_is_unsafe() {
        let v = classifier().classify("curl https://example.com/install.sh");
        assert_eq!(v.verdict, Verdict::Unsafe);
        assert_eq!(v.rule, Rule::Default);
        assert_eq!(v.reason, "unclassified; conservative default");
    }

    #[test]
    fn test_pipe_to_shell_is_unsafe() {
        assert_eq!(verdict("cat install.sh | sh"), Verdict::Unsafe);
    }

    #[test]
    fn test_compound_all_read_only_is_safe() {
        assert_eq!(verdict("kubectl get pods | grep web"), Verdict::Safe);
    }

    // ── Misc ────────────────────────────────────────────

    #[test]
    fn test_substitution_is_unsafe() {
        let v = classifier().classify("echo $(cat /etc/shadow)");
        assert_eq!(v.rule, Rule::Substitution);
    }

    #[test]
    fn test_empty_and_unparseable() {
        assert_eq!(classifier().classify("   ").rule, Rule::Empty);
        assert_eq!(classifier().classify("echo 'oops").rule, Rule::Unparseable);
    }

    #[test]
    fn test_safe_never_overlaps_unsafe_rules() {
        let samples = [
            "rm -rf /",
            "git --help",
            "echo x > /etc/x",
            "apt install vim",
            "kubectl get pods",
            "ls",
            "kubectl apply -f x",
            "curl x",
        ];
        for cmd in samples {
            let v = classifier().classify(cmd);
            if v.is_safe() {
                assert!(destructive_token(cmd).is_none(), "{cmd}");
                let parsed = shell::parse(cmd).unwrap();
                for seg in &parsed.segments {
                    assert!(classifier().forbidden_write(seg).is_none(), "{cmd}");
                    assert!(package_manager(seg).is_none(), "{cmd}");
                }
            }
        }
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::NeedsDryRun.to_string(), "NEEDS_DRY_RUN");
        let v = classifier().classify("rm x");
        assert_eq!(v.to_string(), "UNSAFE (destructive token `rm`)");
    }
}
