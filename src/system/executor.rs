// src/system/executor.rs

//! The executor owns everything a call needs: the shell selection and the
//! usable-shell policy, the pending-callback registry, and the provider that
//! snapshots the host's execution context at dispatch time. The three call
//! strategies are its methods.

use crate::command::Command;
use crate::constants::{DEFAULT_USABLE_SHELL_PATTERN, STATUS_NO_EXIT_CODE};
use crate::error::CallError;
use crate::models::{ContextProvider, ExecutionContext, ExecutionResult};
use crate::system::registry::CallbackRegistry;
use crate::system::shell::{self, ShellSelection};
use regex::Regex;
use std::fmt;
use std::io::{self, ErrorKind, Write};
use std::process::{Command as StdCommand, Stdio};
use std::sync::{Mutex, PoisonError};

#[cfg(feature = "async")]
use crate::models::CompletionCallback;
#[cfg(feature = "async")]
use tokio::runtime::Handle;

/// Exported to every child so scripts consulting `$SHELL` agree with the
/// shell the call actually runs under.
const SHELL_ENV_VAR: &str = "SHELL";

/// Runs shell commands in one of three modes: blocking with captured output
/// ([`Executor::call`]), on the caller's terminal ([`Executor::call_foreground`]),
/// or asynchronously with a completion callback ([`Executor::call_async`]).
///
/// All methods take `&self`; an executor can be shared across threads. The
/// shell selection lock is held for the duration of each launch, so
/// overlapping calls apply and unwind their shell overrides in strict order.
pub struct Executor {
    shell_state: Mutex<ShellSelection>,
    usable_shell: Regex,
    registry: CallbackRegistry,
    context: ContextProvider,
    #[cfg(feature = "async")]
    runtime: Option<Handle>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    /// An executor with the detected shell, the default usable-shell policy,
    /// a fresh registry, and an empty execution context.
    pub fn new() -> Self {
        Self {
            shell_state: Mutex::new(ShellSelection::detect()),
            usable_shell: default_usable_shell(),
            registry: CallbackRegistry::new(),
            context: Box::new(ExecutionContext::default),
            #[cfg(feature = "async")]
            runtime: None,
        }
    }

    /// Uses `handle` to spawn asynchronous calls. Without a handle,
    /// [`Executor::call_async`] can only fall back or fail.
    #[cfg(feature = "async")]
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Shares `registry` instead of the executor's own fresh one, letting
    /// several executors (or outside inspection code) see the same backlog.
    pub fn with_registry(mut self, registry: CallbackRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Snapshots the host's execution context at each asynchronous dispatch.
    /// The default provider returns an empty context.
    pub fn with_context_provider(
        mut self,
        provider: impl Fn() -> ExecutionContext + Send + Sync + 'static,
    ) -> Self {
        self.context = Box::new(provider);
        self
    }

    /// Accepts shells matching `pattern` as usable; anything else is
    /// overridden to the default POSIX shell for the duration of a call.
    pub fn with_usable_shell(mut self, pattern: Regex) -> Self {
        self.usable_shell = pattern;
        self
    }

    /// The current shell selection.
    pub fn shell(&self) -> ShellSelection {
        self.shell_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the shell selection. The usable-shell policy still applies
    /// at call time.
    pub fn set_shell(&self, selection: ShellSelection) {
        *self
            .shell_state
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = selection;
    }

    /// The registry holding this executor's pending asynchronous calls.
    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Runs the command to completion, capturing stdout and stderr.
    ///
    /// Stdout must be valid UTF-8; stderr is decoded lossily since it is
    /// only ever reported, not parsed. A stdin payload on the command is
    /// fed to the child while its output is collected, tolerating children
    /// that exit without reading it.
    ///
    /// # Errors
    ///
    /// A non-zero exit becomes [`CallError::NonZeroExitStatus`] unless
    /// `ignore_errors` is set, in which case the result carries the status
    /// for the caller to inspect. `ignore_errors` suppresses only that
    /// variant: launch failures ([`CallError::CommandFailed`]) and invalid
    /// stdout ([`CallError::InvalidUtf8Output`]) propagate regardless.
    pub fn call(
        &self,
        command: &Command,
        ignore_errors: bool,
    ) -> Result<ExecutionResult, CallError> {
        let command_line = command.get_command();
        let guard = shell::acquire(&self.shell_state, &self.usable_shell);
        log::debug!("Calling '{}' under '{}'", command_line, guard.shell);
        let result = run_captured(&command_line, command.stdin_payload(), &guard);
        drop(guard);
        finish(command_line, result?, ignore_errors)
    }

    /// Runs the command on the caller's terminal, inheriting stdin, stdout,
    /// and stderr. With `pause`, waits for ENTER afterwards so transient
    /// output can be read before the host redraws its screen.
    ///
    /// The result carries only the exit status; nothing is captured.
    ///
    /// # Errors
    ///
    /// Fails with [`CallError::StdinUnsupported`], without launching
    /// anything, if the command carries a stdin payload: the terminal owns
    /// stdin in this mode. Non-zero exits are handled as in
    /// [`Executor::call`].
    pub fn call_foreground(
        &self,
        command: &Command,
        pause: bool,
        ignore_errors: bool,
    ) -> Result<ExecutionResult, CallError> {
        let command_line = command.get_command();
        if command.stdin_payload().is_some() {
            return Err(CallError::StdinUnsupported(command_line));
        }

        let guard = shell::acquire(&self.shell_state, &self.usable_shell);
        log::debug!("Calling '{}' in the foreground under '{}'", command_line, guard.shell);
        let status = StdCommand::new(&guard.shell)
            .arg("-c")
            .arg(&command_line)
            .env(SHELL_ENV_VAR, &guard.shell_env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| CallError::CommandFailed {
                command: command_line.clone(),
                source: e,
            })?;
        drop(guard);

        if pause {
            prompt_to_continue();
        }

        let result = ExecutionResult::status_only(status.code().unwrap_or(STATUS_NO_EXIT_CODE));
        finish(command_line, result, ignore_errors)
    }

    /// Dispatches the command asynchronously and returns an empty result as
    /// soon as the process is handed to the runtime. The callback is later
    /// invoked exactly once, from the runtime, with the execution context
    /// snapshotted at dispatch and the command's result. The result's status
    /// is always populated; spawn failures are reported through it rather
    /// than thrown.
    ///
    /// With `allow_sync_fallback`, an executor that cannot dispatch
    /// asynchronously runs the command synchronously instead, invoking the
    /// callback before returning.
    ///
    /// # Errors
    ///
    /// Fails with [`CallError::AsyncUnavailable`] when asynchronous dispatch
    /// is unavailable and the fallback is not allowed. The fallback itself
    /// can fail as [`Executor::call`] does when the command cannot be
    /// launched or produces invalid output.
    pub fn call_async<F>(
        &self,
        command: &Command,
        callback: F,
        allow_sync_fallback: bool,
    ) -> Result<ExecutionResult, CallError>
    where
        F: FnOnce(ExecutionContext, ExecutionResult) + Send + 'static,
    {
        if let Some(reason) = self.async_unavailable_reason() {
            if !allow_sync_fallback {
                return Err(CallError::AsyncUnavailable {
                    command: command.get_command(),
                    reason,
                });
            }
            log::warn!(
                "Cannot call '{}' asynchronously ({}); falling back to a synchronous call",
                command,
                reason
            );
            let context = (self.context)();
            let result = self.call(command, true)?;
            callback(context, result);
            return Ok(ExecutionResult::default());
        }

        #[cfg(feature = "async")]
        {
            self.dispatch_async(command, Box::new(callback))
        }
        #[cfg(not(feature = "async"))]
        {
            unreachable!("asynchronous dispatch is never available without the async feature")
        }
    }

    /// Whether [`Executor::call_async`] can dispatch without falling back.
    pub fn is_async_available(&self) -> bool {
        self.async_unavailable_reason().is_none()
    }

    /// Why asynchronous dispatch is unavailable, or `None` when it is ready.
    pub fn async_unavailable_reason(&self) -> Option<&'static str> {
        #[cfg(feature = "async")]
        {
            if self.runtime.is_none() {
                Some("no runtime handle is configured")
            } else {
                None
            }
        }
        #[cfg(not(feature = "async"))]
        {
            Some("this build does not include the async feature")
        }
    }

    #[cfg(feature = "async")]
    fn dispatch_async(
        &self,
        command: &Command,
        callback: CompletionCallback,
    ) -> Result<ExecutionResult, CallError> {
        let Some(handle) = self.runtime.clone() else {
            return Err(CallError::AsyncUnavailable {
                command: command.get_command(),
                reason: "no runtime handle is configured",
            });
        };
        let command_line = command.get_command();
        let stdin_payload = command.stdin_payload().map(str::to_string);
        let context = (self.context)();
        let (shell_program, shell_env) = {
            let guard = shell::acquire(&self.shell_state, &self.usable_shell);
            (guard.shell.clone(), guard.shell_env.clone())
        };

        // Registered before the spawn, so even an instant completion finds
        // its entry.
        let id = self
            .registry
            .register(command_line.clone(), context, callback);
        let registry = self.registry.clone();
        log::debug!("Dispatching '{}' asynchronously as call {}", command_line, id);
        handle.spawn(async move {
            let result = run_async(
                &shell_program,
                &shell_env,
                &command_line,
                stdin_payload.as_deref(),
            )
            .await;
            registry.deliver(id, result);
        });
        Ok(ExecutionResult::default())
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shell = self.shell();
        let mut dbg = f.debug_struct("Executor");
        dbg.field("shell", &shell)
            .field("usable_shell", &self.usable_shell.as_str())
            .field("registry", &self.registry);
        #[cfg(feature = "async")]
        dbg.field("runtime", &self.runtime.is_some());
        dbg.finish_non_exhaustive()
    }
}

fn default_usable_shell() -> Regex {
    Regex::new(DEFAULT_USABLE_SHELL_PATTERN).expect("default usable-shell pattern is valid")
}

/// Launches `command_line` under the given shell with piped output and
/// collects it.
fn run_captured(
    command_line: &str,
    stdin_payload: Option<&str>,
    shell: &ShellSelection,
) -> Result<ExecutionResult, CallError> {
    let stdin = if stdin_payload.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut child = StdCommand::new(&shell.shell)
        .arg("-c")
        .arg(command_line)
        .env(SHELL_ENV_VAR, &shell.shell_env)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CallError::CommandFailed {
            command: command_line.to_string(),
            source: e,
        })?;

    // The payload is fed from its own thread while this one drains the
    // output pipes; a filter child emitting more than a pipe buffer while
    // still reading would otherwise wedge both processes.
    let writer = match (stdin_payload, child.stdin.take()) {
        (Some(payload), Some(mut handle)) => {
            let payload = payload.to_string();
            Some(std::thread::spawn(move || {
                // The handle drops when the write finishes, closing the
                // pipe so the child sees EOF.
                handle.write_all(payload.as_bytes())
            }))
        }
        _ => None,
    };

    let output = child
        .wait_with_output()
        .map_err(|e| CallError::CommandFailed {
            command: command_line.to_string(),
            source: e,
        })?;

    if let Some(writer) = writer {
        // The child has been reaped, so a still-blocked write has failed by
        // now and the join returns promptly.
        match writer.join() {
            Ok(Ok(())) => {}
            // A child exiting without reading its input is not an error.
            Ok(Err(e)) if e.kind() == ErrorKind::BrokenPipe => {
                log::debug!("Child closed stdin before the payload was fully written");
            }
            Ok(Err(e)) => {
                log::warn!("Failed to write the stdin payload: {}", e);
                return Err(CallError::CommandFailed {
                    command: command_line.to_string(),
                    source: e,
                });
            }
            Err(_) => log::warn!("The stdin writer thread panicked"),
        }
    }

    let stdout = String::from_utf8(output.stdout).map_err(|e| CallError::InvalidUtf8Output {
        command: command_line.to_string(),
        source: e,
    })?;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    Ok(ExecutionResult::captured(
        stdout,
        stderr,
        output.status.code().unwrap_or(STATUS_NO_EXIT_CODE),
    ))
}

/// Asynchronous twin of [`run_captured`]. Never fails: problems are folded
/// into the result so the completion callback always fires.
#[cfg(feature = "async")]
async fn run_async(
    shell_program: &str,
    shell_env: &str,
    command_line: &str,
    stdin_payload: Option<&str>,
) -> ExecutionResult {
    use tokio::io::AsyncWriteExt;
    use tokio::process::Command as TokioCommand;

    let stdin = if stdin_payload.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    };
    let mut builder = TokioCommand::new(shell_program);
    builder
        .arg("-c")
        .arg(command_line)
        .env(SHELL_ENV_VAR, shell_env)
        .stdin(stdin)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match builder.spawn() {
        Ok(child) => child,
        Err(e) => {
            log::warn!("Failed to spawn '{}': {}", command_line, e);
            return ExecutionResult::captured(
                String::new(),
                format!("Failed to spawn command: {e}"),
                STATUS_NO_EXIT_CODE,
            );
        }
    };

    // Same pipe discipline as the blocking path: the payload is fed while
    // the output side is drained, so a filter child cannot stall on a full
    // pipe.
    let stdin_handle = child.stdin.take();
    let feed = async move {
        if let (Some(payload), Some(mut handle)) = (stdin_payload, stdin_handle) {
            if let Err(e) = handle.write_all(payload.as_bytes()).await {
                if e.kind() == ErrorKind::BrokenPipe {
                    log::debug!("Child closed stdin before the payload was fully written");
                } else {
                    log::warn!("Failed to write the stdin payload to '{}': {}", command_line, e);
                }
            }
            if let Err(e) = handle.shutdown().await {
                log::debug!("Failed to close stdin of '{}': {}", command_line, e);
            }
            // The handle drops here, closing the pipe so the child sees EOF.
        }
    };

    let (collected, ()) = tokio::join!(child.wait_with_output(), feed);
    match collected {
        Ok(output) => ExecutionResult::captured(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            output.status.code().unwrap_or(STATUS_NO_EXIT_CODE),
        ),
        Err(e) => {
            log::warn!("Failed to collect output of '{}': {}", command_line, e);
            ExecutionResult::captured(
                String::new(),
                format!("Failed to collect command output: {e}"),
                STATUS_NO_EXIT_CODE,
            )
        }
    }
}

/// Turns a non-zero exit into an error with the rendered command and the
/// captured stderr, unless the caller asked to inspect the status instead.
fn finish(
    command_line: String,
    result: ExecutionResult,
    ignore_errors: bool,
) -> Result<ExecutionResult, CallError> {
    if !ignore_errors && !result.success() {
        return Err(CallError::NonZeroExitStatus {
            command: command_line,
            status: result.status.unwrap_or(STATUS_NO_EXIT_CODE),
            stderr: result.stderr.clone().unwrap_or_default(),
        });
    }
    Ok(result)
}

/// Blocks until the user presses ENTER, keeping the last command's output on
/// screen. A closed stdin just continues.
fn prompt_to_continue() {
    eprint!("Press ENTER to continue...");
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        log::debug!("Could not read from stdin while pausing; continuing");
    }
}
