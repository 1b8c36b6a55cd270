// src/lib.rs

//! Shell command construction and execution for host-editor extensions.
//!
//! A [`Command`] is an immutable value built from a raw line or a word list
//! and layered with a working directory, a stdin payload, and `&&`/`||`
//! chains; escaping happens once, when the line is rendered. An [`Executor`]
//! runs commands in one of three modes: blocking with captured output, in
//! the foreground on the caller's terminal, or asynchronously with a
//! completion callback delivered through a [`CallbackRegistry`]. Every call
//! runs under a usable shell: selections not matching the configured pattern
//! are overridden to `/bin/sh` for the duration of the call and restored
//! afterwards.
//!
//! ```no_run
//! use shellcall::{Command, Executor};
//!
//! # fn main() -> Result<(), shellcall::CallError> {
//! let executor = Executor::new();
//! let command = Command::new(["git", "status", "--short"]).with_cwd("/tmp/repo")?;
//! let result = executor.call(&command, false)?;
//! print!("{}", result.stdout.unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod constants;
pub mod error;
pub mod models;
pub mod system;

pub use command::{Command, quote_word};
pub use error::CallError;
pub use models::{CompletionCallback, ContextProvider, ExecutionContext, ExecutionResult};
pub use system::executor::Executor;
pub use system::registry::{CallbackRegistry, PendingCallInfo};
pub use system::shell::ShellSelection;
