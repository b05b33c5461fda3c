//! Candidate extraction from fenced shell code blocks.

use crate::resources::Resource;
use crate::safety::shell;

/// Info-string languages treated as shell.
const SHELL_LANGUAGES: &[&str] = &["sh", "bash", "shell", "zsh", "console"];

/// One documented command line, exactly as it will be classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateCommand {
    pub text: String,
    /// Name of the resource it was extracted from
    pub resource: String,
    /// Binary the command invokes, if one can be named
    pub tool: Option<String>,
}

impl CandidateCommand {
    pub fn new(text: impl Into<String>, resource: impl Into<String>) -> Self {
        let text = text.into();
        let tool = tool_name(&text);
        Self {
            text,
            resource: resource.into(),
            tool,
        }
    }

    /// First positional word of the command, when it looks like a
    /// subcommand (`log` in `git log -n 5`, nothing for `ls /tmp`).
    pub fn subcommand(&self) -> Option<String> {
        let parsed = shell::parse(&self.text).ok()?;
        let word = parsed.segments.first()?.positional().next()?;
        let looks_like_verb = word.starts_with(|c: char| c.is_ascii_alphabetic())
            && word
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        looks_like_verb.then(|| word.to_string())
    }
}

/// First word that is neither a `NAME=value` assignment nor `sudo`/`env`.
fn tool_name(command: &str) -> Option<String> {
    command
        .split_whitespace()
        .find(|w| !shell::is_assignment(w) && *w != "sudo" && *w != "env")
        .map(str::to_string)
}

struct Fence {
    marker: char,
    len: usize,
    /// Only `$ `-prefixed lines are commands (`console` blocks)
    prompts_only: bool,
    shell: bool,
}

fn opening_fence(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    let language = info
        .split(|c: char| c.is_whitespace() || c == '{' || c == ',')
        .next()
        .unwrap_or("")
        .to_lowercase();
    Some(Fence {
        marker,
        len,
        prompts_only: language == "console",
        shell: SHELL_LANGUAGES.contains(&language.as_str()),
    })
}

fn closes(fence: &Fence, line: &str) -> bool {
    let trimmed = line.trim();
    let len = trimmed.chars().take_while(|c| *c == fence.marker).count();
    len >= fence.len && trimmed.chars().all(|c| c == fence.marker)
}

fn flush(pending: &mut String, resource: &str, commands: &mut Vec<CandidateCommand>) {
    let command = pending.trim();
    if !command.is_empty() {
        commands.push(CandidateCommand::new(command, resource));
    }
    pending.clear();
}

/// Extracts every command of every fenced shell block, in document order.
///
/// Blank lines and `#` comments are skipped, a leading `$ ` prompt is
/// stripped, and lines ending in `\` are joined with the next one.
pub fn extract(resource: &Resource) -> Vec<CandidateCommand> {
    let mut commands = Vec::new();
    let mut fence: Option<Fence> = None;
    let mut pending = String::new();

    for line in resource.content.lines() {
        let Some(ref open) = fence else {
            fence = opening_fence(line);
            continue;
        };

        if closes(open, line) {
            flush(&mut pending, &resource.name, &mut commands);
            fence = None;
            continue;
        }
        if !open.shell {
            continue;
        }

        let mut text = line.trim();
        if pending.is_empty() {
            match text.strip_prefix("$ ") {
                Some(rest) => text = rest.trim_start(),
                None if open.prompts_only || text == "$" => continue,
                None => {}
            }
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
        }

        match text.strip_suffix('\\') {
            Some(head) => {
                pending.push_str(head.trim_end());
                pending.push(' ');
            }
            None => {
                pending.push_str(text);
                flush(&mut pending, &resource.name, &mut commands);
            }
        }
    }

    // Unterminated fence: the block runs to the end of the document.
    flush(&mut pending, &resource.name, &mut commands);
    commands
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(content: &str) -> Vec<String> {
        let resource = Resource {
            name: "doc".to_string(),
            content: content.to_string(),
        };
        extract(&resource).into_iter().map(|c| c.text).collect()
    }

    // ── Blocks ──────────────────────────────────────────

    #[test]
    fn test_extract_shell_blocks_in_order() {
        let doc = "# Title\n\n```bash\ngit --help\ngit status\n```\n\nText\n\n```sh\nls -la\n```\n";
        assert_eq!(texts(doc), vec!["git --help", "git status", "ls -la"]);
    }

    #[test]
    fn test_non_shell_blocks_ignored() {
        let doc = "```python\nimport os\n```\n```\nplain\n```\n```json\n{}\n```\n";
        assert!(texts(doc).is_empty());
    }

    #[test]
    fn test_info_string_case_and_attributes() {
        let doc = "```Bash title=\"x\"\necho a\n```\n~~~shell\necho b\n~~~\n````zsh\necho c\n````\n";
        assert_eq!(texts(doc), vec!["echo a", "echo b", "echo c"]);
    }

    #[test]
    fn test_no_blocks_yields_nothing() {
        assert!(texts("just prose, `inline code` and nothing else").is_empty());
    }

    #[test]
    fn test_unterminated_block_runs_to_end() {
        assert_eq!(texts("```bash\necho a\necho b"), vec!["echo a", "echo b"]);
    }

    #[test]
    fn test_shorter_fence_does_not_close() {
        let doc = "````bash\necho a\n```\necho b\n````\n";
        assert_eq!(texts(doc), vec!["echo a", "```", "echo b"]);
    }

    // ── Lines ───────────────────────────────────────────

    #[test]
    fn test_blank_and_comment_lines_skipped() {
        let doc = "```bash\n# install first\n\n   \necho hi\n```\n";
        assert_eq!(texts(doc), vec!["echo hi"]);
    }

    #[test]
    fn test_prompt_stripped() {
        let doc = "```bash\n$ git log\n$   git status\n```\n";
        assert_eq!(texts(doc), vec!["git log", "git status"]);
    }

    #[test]
    fn test_console_block_keeps_only_prompt_lines() {
        let doc = "```console\n$ git --version\ngit version 2.43.0\n```\n";
        assert_eq!(texts(doc), vec!["git --version"]);
    }

    #[test]
    fn test_continuations_joined() {
        let doc = "```bash\ndocker run \\\n  -it \\\n  ubuntu\necho next\n```\n";
        assert_eq!(texts(doc), vec!["docker run -it ubuntu", "echo next"]);
    }

    // ── Candidate metadata ──────────────────────────────

    #[test]
    fn test_candidate_tool_skips_assignments_and_wrappers() {
        assert_eq!(
            CandidateCommand::new("FOO=1 sudo env kubectl get pods", "k").tool,
            Some("kubectl".to_string())
        );
        assert_eq!(CandidateCommand::new("git status", "g").tool, Some("git".to_string()));
        assert_eq!(CandidateCommand::new("A=1", "g").tool, None);
    }

    #[test]
    fn test_candidate_resource_recorded() {
        let resource = Resource {
            name: "git".to_string(),
            content: "```bash\ngit --help\n```".to_string(),
        };
        let commands = extract(&resource);
        assert_eq!(commands[0].resource, "git");
    }

    #[test]
    fn test_subcommand() {
        let sub = |c: &str| CandidateCommand::new(c, "r").subcommand();
        assert_eq!(sub("git log -n 5"), Some("log".to_string()));
        assert_eq!(sub("gcloud compute instances list"), Some("compute".to_string()));
        assert_eq!(sub("git --help"), None);
        assert_eq!(sub("ls /tmp"), None);
        assert_eq!(sub("echo 'it''s"), None);
    }
}
