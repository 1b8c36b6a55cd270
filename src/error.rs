// src/error.rs

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong while building or calling a [`Command`].
///
/// Construction-time failures (`DirectoryNotFound`) surface from the builder
/// operation itself. Execution-time failures surface synchronously from
/// `call` and `call_foreground`; an asynchronous call only fails
/// synchronously at dispatch (`AsyncUnavailable`), while a non-zero exit
/// discovered at completion is reported through the result handed to the
/// callback, never as an error.
///
/// [`Command`]: crate::command::Command
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Working directory '{}' does not exist.", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("Command '{0}' carries a stdin payload, which foreground execution cannot deliver.")]
    StdinUnsupported(String),
    #[error("Command '{command}' could not be executed: {source}")]
    CommandFailed {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Command '{command}' exited with status {status}.{}", stderr_note(.stderr))]
    NonZeroExitStatus {
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("Command '{command}' cannot be called asynchronously: {reason}.")]
    AsyncUnavailable {
        command: String,
        reason: &'static str,
    },
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Formats captured stderr for inclusion in an error message. Empty capture
/// contributes nothing so short failures stay on one line.
fn stderr_note(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" Stderr:\n{}", stderr.trim_end())
    }
}
