// src/models.rs

use std::path::PathBuf;

/// Callback invoked exactly once when an asynchronous call completes.
///
/// Receives the [`ExecutionContext`] snapshot taken at dispatch time and the
/// final [`ExecutionResult`] of the external command.
pub type CompletionCallback = Box<dyn FnOnce(ExecutionContext, ExecutionResult) + Send + 'static>;

/// Producer of [`ExecutionContext`] snapshots, injected into an executor so
/// host glue can describe "where the user was" at dispatch time.
pub type ContextProvider = Box<dyn Fn() -> ExecutionContext + Send + Sync + 'static>;

/// A snapshot of the host's focus state, captured once per call.
///
/// The snapshot travels with the call and is handed back verbatim to the
/// completion callback, so the callback can reason about the dispatch-time
/// surroundings even if focus moved before the command finished. Every field
/// is optional; hosts without a given concept leave it unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Identity of the active tab at dispatch time.
    pub tab: Option<u64>,
    /// Identity of the active window at dispatch time.
    pub window: Option<u64>,
    /// Identity of the active buffer at dispatch time.
    pub buffer: Option<u64>,
    /// Path of the file the user was editing, if any.
    pub file: Option<PathBuf>,
    /// Cursor line at dispatch time (1-based).
    pub line: Option<u64>,
    /// Cursor column at dispatch time (1-based).
    pub column: Option<u64>,
}

/// The normalized outcome of a call.
///
/// Which fields are populated depends on the execution mode: a blocking call
/// captures `stdout` (and `stderr` when the process wrote to it), a
/// foreground call captures nothing, and an asynchronous dispatch returns an
/// empty result immediately while the completion callback later receives the
/// captured streams. `status` carries the process exit code on every path
/// that actually ran a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub status: Option<i32>,
}

impl ExecutionResult {
    /// Result of a capturing execution. An empty stderr capture is dropped
    /// entirely rather than reported as an empty string.
    pub(crate) fn captured(stdout: String, stderr: String, status: i32) -> Self {
        Self {
            stdout: Some(stdout),
            stderr: if stderr.is_empty() { None } else { Some(stderr) },
            status: Some(status),
        }
    }

    /// Result of an execution that ran attached to the terminal: only the
    /// exit status is known.
    pub(crate) fn status_only(status: i32) -> Self {
        Self {
            stdout: None,
            stderr: None,
            status: Some(status),
        }
    }

    /// True when the process ran and exited with status zero.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}
