//! External documentation lookup.
//!
//! Best-effort confirmation that a command is documented upstream, used
//! when the tool is missing on the host or its `--help` does not list the
//! subcommand. A failed lookup only ever downgrades a command to
//! "undocumented"; it never fails a run.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::DocsConfig;

/// Canonical documentation pages for well-known CLIs.
const BUILTIN_DOCS: &[(&str, &str)] = &[
    ("e2b", "https://e2b.dev/docs/cli"),
    ("docker", "https://docs.docker.com/reference/cli/docker/"),
    ("gcloud", "https://cloud.google.com/sdk/gcloud/reference"),
    ("az", "https://learn.microsoft.com/en-us/cli/azure/reference-index"),
    ("git", "https://git-scm.com/docs"),
];

/// Maximum raw response body size (5 MB).
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024;

/// HTTP connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Text wrapping width for html2text conversion.
const TEXT_WIDTH: usize = 100;

/// User-Agent header sent with requests.
const USER_AGENT: &str = concat!("doc-verifier/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no documentation URL known for `{0}`")]
    NoDocsUrl(String),

    #[error("documentation lookup unavailable for {url}: {reason}")]
    Unavailable { url: String, reason: String },

    #[error("documentation lookup for {url} failed: HTTP {status}")]
    Http { url: String, status: u16 },
}

/// Documentation text of one tool.
#[derive(Debug, Clone)]
pub struct DocsPage {
    pub url: String,
    pub text: String,
}

#[async_trait]
pub trait DocsLookup: Send + Sync {
    /// Fetches the documentation page for `tool` as plain text.
    async fn fetch(&self, tool: &str) -> Result<DocsPage, LookupError>;
}

/// Fetches documentation pages over HTTP(S) from a {tool → URL} table.
pub struct HttpDocsLookup {
    client: reqwest::Client,
    urls: HashMap<String, String>,
}

impl HttpDocsLookup {
    /// Built-in table merged with `config.urls` (config wins).
    pub fn new(config: &DocsConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let mut urls: HashMap<String, String> = BUILTIN_DOCS
            .iter()
            .map(|(tool, url)| (tool.to_string(), url.to_string()))
            .collect();
        urls.extend(config.urls.clone());

        Self { client, urls }
    }

    pub fn url_for(&self, tool: &str) -> Option<&str> {
        self.urls.get(tool).map(String::as_str)
    }
}

#[async_trait]
impl DocsLookup for HttpDocsLookup {
    async fn fetch(&self, tool: &str) -> Result<DocsPage, LookupError> {
        let url = self
            .url_for(tool)
            .ok_or_else(|| LookupError::NoDocsUrl(tool.to_string()))?
            .to_string();
        let unavailable = |reason: String| LookupError::Unavailable {
            url: url.clone(),
            reason,
        };

        let parsed = url::Url::parse(&url).map_err(|e| unavailable(format!("invalid URL: {e}")))?;
        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(unavailable(format!(
                    "unsupported scheme '{scheme}' (only http/https)"
                )))
            }
        }

        debug!("Fetching docs for {tool}: {url}");

        let response = self.client.get(parsed).send().await.map_err(|e| {
            warn!("Docs fetch failed for {tool}: {e}");
            unavailable(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Http {
                url,
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_RESPONSE_SIZE {
                return Err(unavailable(format!(
                    "response too large ({len} bytes, limit is {MAX_RESPONSE_SIZE} bytes)"
                )));
            }
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        let body = response
            .bytes()
            .await
            .map_err(|e| unavailable(format!("reading body: {e}")))?;
        if body.len() > MAX_RESPONSE_SIZE {
            return Err(unavailable(format!(
                "response too large ({} bytes, limit is {MAX_RESPONSE_SIZE} bytes)",
                body.len()
            )));
        }

        let text = extract_text(&content_type, &body);
        debug!("Fetched {} chars of docs for {tool}", text.len());
        Ok(DocsPage { url, text })
    }
}

fn is_html(content_type: &str) -> bool {
    let ct = content_type.to_lowercase();
    ct.contains("text/html") || ct.contains("application/xhtml")
}

/// Readable text from a response body. Non-HTML bodies are taken as UTF-8.
fn extract_text(content_type: &str, body: &[u8]) -> String {
    if is_html(content_type) {
        html2text::from_read(body, TEXT_WIDTH)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned())
    } else {
        String::from_utf8_lossy(body).into_owned()
    }
}

/// Lowercased word set of `text`. Words keep inner `-` and `_` so
/// `destroy-everything` stays one word.
fn words(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .map(|w| w.trim_matches('-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// True if every entry of `terms` occurs in `text` as a whole word.
pub fn mentions_all(text: &str, terms: &[&str]) -> bool {
    let words = words(text);
    terms
        .iter()
        .all(|t| words.contains(&t.trim_matches('-').to_lowercase()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory docs source counting its fetches.
    pub(crate) struct StaticDocs {
        pages: HashMap<String, String>,
        pub(crate) fetches: AtomicUsize,
    }

    impl StaticDocs {
        pub(crate) fn new(pages: &[(&str, &str)]) -> Self {
            Self {
                pages: pages
                    .iter()
                    .map(|(t, p)| (t.to_string(), p.to_string()))
                    .collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocsLookup for StaticDocs {
        async fn fetch(&self, tool: &str) -> Result<DocsPage, LookupError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(tool) {
                Some(text) => Ok(DocsPage {
                    url: format!("https://docs.example/{tool}"),
                    text: text.clone(),
                }),
                None => Err(LookupError::NoDocsUrl(tool.to_string())),
            }
        }
    }

    // ── Table ───────────────────────────────────────────

    #[test]
    fn test_builtin_table() {
        let lookup = HttpDocsLookup::new(&DocsConfig::default());
        assert_eq!(lookup.url_for("git"), Some("https://git-scm.com/docs"));
        assert_eq!(
            lookup.url_for("docker"),
            Some("https://docs.docker.com/reference/cli/docker/")
        );
        assert!(lookup.url_for("kubectl").is_none());
    }

    #[test]
    fn test_config_urls_override_and_extend() {
        let mut config = DocsConfig::default();
        config
            .urls
            .insert("git".to_string(), "https://mirror.example/git".to_string());
        config
            .urls
            .insert("kubectl".to_string(), "https://kubernetes.io/docs/reference/kubectl/".to_string());
        let lookup = HttpDocsLookup::new(&config);
        assert_eq!(lookup.url_for("git"), Some("https://mirror.example/git"));
        assert!(lookup.url_for("kubectl").is_some());
        assert!(lookup.url_for("az").is_some());
    }

    #[tokio::test]
    async fn test_unknown_tool_has_no_url() {
        let lookup = HttpDocsLookup::new(&DocsConfig::default());
        let err = lookup.fetch("frobnicate").await.unwrap_err();
        assert!(matches!(err, LookupError::NoDocsUrl(ref t) if t == "frobnicate"));
    }

    #[tokio::test]
    async fn test_non_http_scheme_refused_without_io() {
        let mut config = DocsConfig::default();
        config
            .urls
            .insert("local".to_string(), "file:///etc/passwd".to_string());
        let lookup = HttpDocsLookup::new(&config);
        let err = lookup.fetch("local").await.unwrap_err();
        assert!(err.to_string().contains("unsupported scheme 'file'"));
    }

    // ── Text extraction ─────────────────────────────────

    #[test]
    fn test_extract_text_html() {
        let html = b"<html><body><h1>git-log</h1><p>Show commit logs</p></body></html>";
        let text = extract_text("text/html; charset=utf-8", html);
        assert!(text.contains("git-log"));
        assert!(text.contains("Show commit logs"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_extract_text_plain() {
        assert_eq!(extract_text("text/plain", b"usage: x"), "usage: x");
    }

    // ── Word matching ───────────────────────────────────

    #[test]
    fn test_mentions_all_whole_words() {
        let help = "usage: git [--version] <command>\n   clone   Clone a repository\n   log   Show commit logs";
        assert!(mentions_all(help, &["clone"]));
        assert!(mentions_all(help, &["LOG", "clone"]));
        assert!(!mentions_all(help, &["lo"]));
        assert!(!mentions_all(help, &["destroy-everything"]));
        assert!(mentions_all(help, &[]));
    }

    #[test]
    fn test_mentions_hyphenated_words() {
        let text = "Run `git destroy-everything` at your own risk";
        assert!(mentions_all(text, &["destroy-everything"]));
        assert!(mentions_all("see --dry-run", &["dry-run"]));
    }
}
