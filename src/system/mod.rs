//! # System Interaction Layer
//!
//! This module is the boundary between command values and the underlying
//! operating system: process spawning in each call mode, the shell-selection
//! override, and the bookkeeping for calls still in flight.
//!
//! ## Modules
//!
//! - **`executor`**: Runs commands under the shell policy: blocking with
//!   captured output, in the foreground on the caller's terminal, or
//!   asynchronously on a runtime with a completion callback.
//! - **`registry`**: Tracks dispatched asynchronous calls until their
//!   completion is delivered, and lets stale entries be inspected and
//!   expired.
//! - **`shell`**: The shell selection and the scoped override that forces
//!   unusable shells to the default POSIX shell around each call.

pub mod executor;
pub mod registry;
pub mod shell;
