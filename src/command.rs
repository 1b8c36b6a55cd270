// src/command.rs

//! Command construction: an immutable value describing a shell command line,
//! built up through layering operations and rendered (with escaping) exactly
//! once, when the final string is requested.

use crate::error::CallError;
use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The unrendered shape of a command line.
///
/// Rendering is deferred so that chains (`with_cwd().and().or()`) compose
/// structurally without repeated escaping passes; escaping happens once, at
/// render time.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandSpec {
    /// A pre-escaped literal, rendered verbatim. The caller is responsible
    /// for its correctness.
    Raw(String),
    /// An ordered word sequence; each word is trimmed and escaped on render.
    Words(Vec<String>),
    /// A `cd <dir> && …` layer over an inner spec.
    InDir { dir: PathBuf, inner: Box<CommandSpec> },
    /// Two specs joined with `&&` or `||`.
    Chained {
        lhs: Box<CommandSpec>,
        join: Join,
        rhs: Box<CommandSpec>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Join {
    And,
    Or,
}

impl Join {
    fn separator(self) -> &'static str {
        match self {
            Self::And => " && ",
            Self::Or => " || ",
        }
    }
}

impl CommandSpec {
    fn render(&self, out: &mut String) {
        match self {
            Self::Raw(line) => out.push_str(line),
            Self::Words(words) => {
                for (index, word) in words.iter().enumerate() {
                    if index > 0 {
                        out.push(' ');
                    }
                    out.push_str(&quote_word(word.trim()));
                }
            }
            Self::InDir { dir, inner } => {
                out.push_str("cd ");
                out.push_str(&quote_word(&dir.to_string_lossy()));
                out.push_str(" && ");
                inner.render(out);
            }
            Self::Chained { lhs, join, rhs } => {
                lhs.render(out);
                out.push_str(join.separator());
                rhs.render(out);
            }
        }
    }
}

/// A shell command plus the optional baggage a call needs: a working
/// directory layer folded into the command line and a stdin payload.
///
/// `Command` is a value: every operation takes `&self` and returns a new
/// layered `Command`, leaving the original untouched and usable. Anything
/// convertible into a `Command` (a literal line, a word list, or another
/// `Command`) is accepted wherever a command is expected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    spec: CommandSpec,
    stdin: Option<String>,
}

impl Command {
    /// Wraps `spec` into a `Command`. Wrapping an existing `Command` returns
    /// it unchanged.
    pub fn new(spec: impl Into<Self>) -> Self {
        spec.into()
    }

    /// Layers a `cd <dir> && …` prefix over this command.
    ///
    /// A path to a regular file resolves to its containing directory, so
    /// callers can hand over "the file the user is editing" directly.
    ///
    /// # Errors
    ///
    /// Returns [`CallError::DirectoryNotFound`] if `dir` does not exist, and
    /// [`CallError::Io`] for any other filesystem failure while inspecting
    /// it.
    pub fn with_cwd(&self, dir: impl AsRef<Path>) -> Result<Self, CallError> {
        let dir = dir.as_ref();
        let metadata = fs::metadata(dir).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                CallError::DirectoryNotFound(dir.to_path_buf())
            } else {
                CallError::Io(e)
            }
        })?;
        let resolved = if metadata.is_dir() {
            dir.to_path_buf()
        } else {
            match dir.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            }
        };
        Ok(Self {
            spec: CommandSpec::InDir {
                dir: resolved,
                inner: Box::new(self.spec.clone()),
            },
            stdin: self.stdin.clone(),
        })
    }

    /// Attaches a stdin payload to be fed to the process.
    ///
    /// Foreground calls cannot deliver a payload and reject commands that
    /// carry one.
    pub fn with_stdin(&self, text: impl Into<String>) -> Self {
        Self {
            spec: self.spec.clone(),
            stdin: Some(text.into()),
        }
    }

    /// Joins another command onto this one with `&&`.
    ///
    /// `other` is resolved through the same conversions as [`Command::new`],
    /// so raw strings and word lists are accepted directly. Only its command
    /// line is joined; a stdin payload on `other` is discarded.
    pub fn and(&self, other: impl Into<Self>) -> Self {
        self.join(Join::And, other.into())
    }

    /// Joins another command onto this one with `||`.
    ///
    /// Same resolution rules as [`Command::and`].
    pub fn or(&self, other: impl Into<Self>) -> Self {
        self.join(Join::Or, other.into())
    }

    fn join(&self, join: Join, other: Self) -> Self {
        Self {
            spec: CommandSpec::Chained {
                lhs: Box::new(self.spec.clone()),
                join,
                rhs: Box::new(other.spec),
            },
            stdin: self.stdin.clone(),
        }
    }

    /// Renders the final command line.
    ///
    /// Literal specs come back verbatim. Word sequences are trimmed and
    /// space-joined, with each word escaped only when it needs it, so common
    /// arguments stay readable while paths with spaces, globs, or shell
    /// metacharacters remain correct.
    pub fn get_command(&self) -> String {
        let mut out = String::new();
        self.spec.render(&mut out);
        out
    }

    /// The stdin payload attached to this command, if any.
    pub fn stdin_payload(&self) -> Option<&str> {
        self.stdin.as_deref()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get_command())
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Self {
            spec: CommandSpec::Raw(line.to_string()),
            stdin: None,
        }
    }
}

impl From<String> for Command {
    fn from(line: String) -> Self {
        Self {
            spec: CommandSpec::Raw(line),
            stdin: None,
        }
    }
}

impl<S: Into<String>> From<Vec<S>> for Command {
    fn from(words: Vec<S>) -> Self {
        Self {
            spec: CommandSpec::Words(words.into_iter().map(Into::into).collect()),
            stdin: None,
        }
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for Command {
    fn from(words: [S; N]) -> Self {
        Self {
            spec: CommandSpec::Words(words.into_iter().map(Into::into).collect()),
            stdin: None,
        }
    }
}

impl From<&[&str]> for Command {
    fn from(words: &[&str]) -> Self {
        Self {
            spec: CommandSpec::Words(words.iter().map(ToString::to_string).collect()),
            stdin: None,
        }
    }
}

/// Escapes a single word for a POSIX shell command line.
///
/// Words made of `[A-Za-z0-9._:=/-]` pass through unchanged to keep rendered
/// commands readable; everything else (including the empty word) is wrapped
/// in single quotes, with embedded quotes rewritten as `'\''` so re-parsing
/// yields the original word exactly.
pub fn quote_word(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'=' | b'/' | b'-'));
    if safe {
        return Cow::Borrowed(word);
    }
    let mut quoted = String::with_capacity(word.len() + 2);
    quoted.push('\'');
    for ch in word.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn test_safe_words_render_space_joined_unescaped() {
        let cmd = Command::new(["ls", "-la", "./src", "FOO=bar", "a:b"]);
        assert_eq!(cmd.get_command(), "ls -la ./src FOO=bar a:b");
    }

    #[test]
    fn test_words_with_metacharacters_are_quoted() {
        let cmd = Command::new(["grep", "a b", "*.rs"]);
        assert_eq!(cmd.get_command(), "grep 'a b' '*.rs'");
    }

    #[test]
    fn test_empty_word_is_quoted() {
        let cmd = Command::new(["printf", ""]);
        assert_eq!(cmd.get_command(), "printf ''");
    }

    #[test]
    fn test_words_are_trimmed_before_escaping() {
        let cmd = Command::new(["  ls ", " -la  "]);
        assert_eq!(cmd.get_command(), "ls -la");
    }

    #[test]
    fn test_raw_spec_renders_verbatim() {
        let cmd = Command::new("echo 'a  b' | wc -c");
        assert_eq!(cmd.get_command(), "echo 'a  b' | wc -c");
    }

    #[test]
    fn test_create_is_idempotent() {
        let cmd = Command::new(["ls", "-la"]).with_stdin("x");
        let rewrapped = Command::new(cmd.clone());
        assert_eq!(rewrapped, cmd);
    }

    #[test]
    fn test_quote_word_escapes_embedded_single_quotes() {
        assert_eq!(quote_word("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_quoted_words_reparse_to_the_original() {
        let nasty = [
            "a b",
            "",
            "it's",
            "*.rs",
            "a\"b",
            "$(reboot)",
            "semi;colon",
            "tab\there",
            "back\\slash",
            "ünïcödé word",
        ];
        for word in nasty {
            let rendered = quote_word(word);
            let reparsed = shlex::split(&rendered).unwrap();
            assert_eq!(reparsed, vec![word.to_string()], "rendered: {}", rendered);
        }
    }

    #[test]
    fn test_and_or_chaining() {
        let cmd = Command::new(["make", "build"])
            .and("make test")
            .or(["echo", "build failed"]);
        assert_eq!(
            cmd.get_command(),
            "make build && make test || echo 'build failed'"
        );
    }

    #[test]
    fn test_chaining_discards_other_stdin_payload() {
        let other = Command::new(["cat"]).with_stdin("ignored");
        let cmd = Command::new(["echo", "hi"]).with_stdin("kept").and(other);
        assert_eq!(cmd.stdin_payload(), Some("kept"));
    }

    #[test]
    fn test_with_cwd_prefixes_cd_and_composes_with_and() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();
        let cmd = Command::new("make").with_cwd(dir.path()).unwrap().and("make test");
        assert_eq!(
            cmd.get_command(),
            format!("cd {} && make && make test", dir_str)
        );
    }

    #[test]
    fn test_with_cwd_resolves_file_to_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("notes.txt");
        File::create(&file_path).unwrap();
        let cmd = Command::new(["ls"]).with_cwd(&file_path).unwrap();
        assert_eq!(
            cmd.get_command(),
            format!("cd {} && ls", dir.path().to_str().unwrap())
        );
    }

    #[test]
    fn test_with_cwd_missing_path_fails_not_found() {
        let err = Command::new(["ls"])
            .with_cwd("/definitely/not/a/real/path")
            .unwrap_err();
        assert!(matches!(err, CallError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_builder_operations_leave_the_original_untouched() {
        let base = Command::new(["make"]);
        let layered = base.with_stdin("y").and("make install");
        assert_eq!(base.get_command(), "make");
        assert!(base.stdin_payload().is_none());
        assert_eq!(layered.get_command(), "make && make install");
        assert_eq!(layered.stdin_payload(), Some("y"));
    }

    #[test]
    fn test_display_matches_get_command() {
        let cmd = Command::new(["echo", "a b"]);
        assert_eq!(cmd.to_string(), cmd.get_command());
    }
}
