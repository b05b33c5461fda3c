//! Minimal POSIX-shell lexer for classification.
//!
//! Splits a command line into segments at `;`, `&&`, `||`, `|` and `&`,
//! resolves quoting, and separates output-redirection targets from words.
//! An unquoted `#` at the start of a word comments out the rest of the line.
//! It does not expand anything; `$(...)` and backticks are only flagged.

/// One simple command of a (possibly compound) command line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Segment {
    /// Words after quote removal, redirections stripped
    pub words: Vec<String>,
    /// Targets of `>`, `>>`, `>|`, `&>` redirections
    pub write_targets: Vec<String>,
}

impl Segment {
    fn is_empty(&self) -> bool {
        self.words.is_empty() && self.write_targets.is_empty()
    }

    /// Index of the program word, skipping `NAME=value` assignments and
    /// the `env`/`sudo`/`command` wrappers.
    pub fn program_index(&self) -> Option<usize> {
        self.words.iter().position(|w| {
            !is_assignment(w) && !matches!(w.as_str(), "env" | "sudo" | "command")
        })
    }

    pub fn program(&self) -> Option<&str> {
        self.program_index().map(|i| self.words[i].as_str())
    }

    /// Words following the program.
    pub fn args(&self) -> &[String] {
        match self.program_index() {
            Some(i) => &self.words[i + 1..],
            None => &[],
        }
    }

    /// Arguments up to a `--` end-of-options marker.
    pub fn options(&self) -> &[String] {
        let args = self.args();
        match args.iter().position(|a| a == "--") {
            Some(end) => &args[..end],
            None => args,
        }
    }

    /// True when a `--` hands the remaining words to another command.
    pub fn ends_options(&self) -> bool {
        self.args().iter().any(|a| a == "--")
    }

    /// Arguments that are not flags, in order.
    pub fn positional(&self) -> impl Iterator<Item = &str> {
        self.args()
            .iter()
            .map(String::as_str)
            .filter(|w| !w.starts_with('-'))
    }
}

/// Result of lexing a full command line.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Parsed {
    pub segments: Vec<Segment>,
    /// `$(...)` or backticks appeared outside single quotes
    pub substitution: bool,
    /// A `#` comment was dropped
    pub comment: bool,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("redirection without a target")]
    MissingTarget,
}

#[derive(PartialEq)]
enum Pending {
    None,
    Write,
    Read,
}

struct Lexer {
    segments: Vec<Segment>,
    segment: Segment,
    word: String,
    in_word: bool,
    pending: Pending,
    substitution: bool,
    comment: bool,
}

impl Lexer {
    fn finish_word(&mut self) {
        if !self.in_word {
            return;
        }
        let word = std::mem::take(&mut self.word);
        self.in_word = false;
        match std::mem::replace(&mut self.pending, Pending::None) {
            Pending::Write => self.segment.write_targets.push(word),
            Pending::Read => {}
            Pending::None => self.segment.words.push(word),
        }
    }

    fn finish_segment(&mut self) -> Result<(), LexError> {
        self.finish_word();
        if self.pending != Pending::None {
            return Err(LexError::MissingTarget);
        }
        let segment = std::mem::take(&mut self.segment);
        if !segment.is_empty() {
            self.segments.push(segment);
        }
        Ok(())
    }
}

/// True for `NAME=value` shell assignments.
pub fn is_assignment(word: &str) -> bool {
    match word.split_once('=') {
        Some((name, _)) => {
            !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !name.starts_with(|c: char| c.is_ascii_digit())
        }
        None => false,
    }
}

pub fn parse(command: &str) -> Result<Parsed, LexError> {
    let mut lx = Lexer {
        segments: Vec::new(),
        segment: Segment::default(),
        word: String::new(),
        in_word: false,
        pending: Pending::None,
        substitution: false,
        comment: false,
    };
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => lx.finish_word(),
            '#' if !lx.in_word => {
                lx.comment = true;
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        break;
                    }
                }
            }
            '\'' => {
                lx.in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => lx.word.push(ch),
                        None => return Err(LexError::UnterminatedQuote),
                    }
                }
            }
            '"' => {
                lx.in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => {
                            if let Some(next) = chars.next() {
                                lx.word.push(next);
                            }
                        }
                        Some('`') => {
                            lx.substitution = true;
                            lx.word.push('`');
                        }
                        Some('$') if chars.peek() == Some(&'(') => {
                            lx.substitution = true;
                            lx.word.push('$');
                        }
                        Some(ch) => lx.word.push(ch),
                        None => return Err(LexError::UnterminatedQuote),
                    }
                }
            }
            '\\' => {
                lx.in_word = true;
                if let Some(next) = chars.next() {
                    lx.word.push(next);
                }
            }
            '`' => {
                lx.substitution = true;
                lx.in_word = true;
                lx.word.push(c);
            }
            '$' if chars.peek() == Some(&'(') => {
                lx.substitution = true;
                lx.in_word = true;
                lx.word.push(c);
            }
            '&' if chars.peek() == Some(&'>') => {
                // `&>` / `&>>` redirect both streams
                lx.finish_word();
                chars.next();
                if chars.peek() == Some(&'>') {
                    chars.next();
                }
                lx.pending = Pending::Write;
            }
            ';' | '|' | '&' => {
                if (c == '|' || c == '&') && chars.peek() == Some(&c) {
                    chars.next();
                }
                lx.finish_segment()?;
            }
            '>' => {
                // A digit-only word glued to '>' is a file descriptor (`2>`)
                if lx.in_word && !lx.word.is_empty() && lx.word.chars().all(|d| d.is_ascii_digit())
                {
                    lx.word.clear();
                    lx.in_word = false;
                } else {
                    lx.finish_word();
                }
                if matches!(chars.peek(), Some('>') | Some('|')) {
                    chars.next();
                }
                if chars.peek() == Some(&'&') {
                    // fd duplication (`2>&1`, `>&-`): not a file write
                    chars.next();
                    while matches!(chars.peek(), Some(d) if d.is_ascii_digit() || *d == '-') {
                        chars.next();
                    }
                    continue;
                }
                lx.pending = Pending::Write;
            }
            '<' => {
                lx.finish_word();
                while chars.peek() == Some(&'<') {
                    chars.next();
                }
                if chars.peek() == Some(&'&') {
                    chars.next();
                    while matches!(chars.peek(), Some(d) if d.is_ascii_digit() || *d == '-') {
                        chars.next();
                    }
                    continue;
                }
                lx.pending = Pending::Read;
            }
            _ => {
                lx.in_word = true;
                lx.word.push(c);
            }
        }
    }

    lx.finish_segment()?;
    Ok(Parsed {
        segments: lx.segments,
        substitution: lx.substitution,
        comment: lx.comment,
    })
}
