// src/system/shell.rs

//! Shell selection and the scoped override that keeps calls running under a
//! predictable POSIX shell.
//!
//! Users run all kinds of login shells; command lines built by this crate
//! assume POSIX quoting. Before a call launches, the selection is checked
//! against the configured usable-shell pattern and any setting that fails it
//! is forced to the default shell for the duration of the call, then restored.

use crate::constants::DEFAULT_POSIX_SHELL;
use regex::Regex;
use scopeguard::ScopeGuard;
use std::env;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The pair of shell settings a call runs under.
///
/// `shell` is the program used to launch the command line; `shell_env` is the
/// value exported as `SHELL` to the child, which scripts commonly consult.
/// The two are checked and overridden independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSelection {
    pub shell: String,
    pub shell_env: String,
}

impl ShellSelection {
    /// Initial selection, taken from the caller's `SHELL` environment with
    /// the default POSIX shell as fallback.
    pub(crate) fn detect() -> Self {
        let shell = env::var("SHELL").unwrap_or_else(|_| DEFAULT_POSIX_SHELL.to_string());
        Self {
            shell_env: shell.clone(),
            shell,
        }
    }
}

type Restore<'a> = Box<dyn FnOnce(MutexGuard<'a, ShellSelection>) + 'a>;

/// Scoped shell override. Holds the selection lock for its lifetime, so
/// overlapping calls apply and unwind their overrides in strict order; the
/// saved selection is written back before the lock is released.
pub(crate) type ShellGuard<'a> = ScopeGuard<MutexGuard<'a, ShellSelection>, Restore<'a>>;

/// Locks the selection, forces any setting not matching `usable` to the
/// default POSIX shell, and returns a guard that restores the saved
/// selection on drop.
pub(crate) fn acquire<'a>(state: &'a Mutex<ShellSelection>, usable: &Regex) -> ShellGuard<'a> {
    let mut selection = state.lock().unwrap_or_else(PoisonError::into_inner);
    let saved = selection.clone();
    if !usable.is_match(&selection.shell) {
        log::debug!(
            "Shell '{}' is not usable, running under '{}'",
            selection.shell,
            DEFAULT_POSIX_SHELL
        );
        selection.shell = DEFAULT_POSIX_SHELL.to_string();
    }
    if !usable.is_match(&selection.shell_env) {
        log::debug!(
            "SHELL value '{}' is not usable, exporting '{}'",
            selection.shell_env,
            DEFAULT_POSIX_SHELL
        );
        selection.shell_env = DEFAULT_POSIX_SHELL.to_string();
    }
    scopeguard::guard(
        selection,
        Box::new(move |mut current: MutexGuard<'a, ShellSelection>| {
            *current = saved;
        }) as Restore<'a>,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_USABLE_SHELL_PATTERN;

    fn selection(shell: &str, shell_env: &str) -> ShellSelection {
        ShellSelection {
            shell: shell.to_string(),
            shell_env: shell_env.to_string(),
        }
    }

    #[test]
    fn test_acquire_overrides_unusable_shell_and_restores_on_drop() {
        let state = Mutex::new(selection("/bin/zsh", "/usr/bin/fish"));
        let usable = Regex::new(DEFAULT_USABLE_SHELL_PATTERN).unwrap();

        let guard = acquire(&state, &usable);
        assert_eq!(guard.shell, DEFAULT_POSIX_SHELL);
        assert_eq!(guard.shell_env, DEFAULT_POSIX_SHELL);
        drop(guard);

        let restored = state.lock().unwrap();
        assert_eq!(*restored, selection("/bin/zsh", "/usr/bin/fish"));
    }

    #[test]
    fn test_acquire_keeps_usable_shell_untouched() {
        let state = Mutex::new(selection("/bin/sh", "/bin/sh"));
        let usable = Regex::new(DEFAULT_USABLE_SHELL_PATTERN).unwrap();

        let guard = acquire(&state, &usable);
        assert_eq!(guard.shell, "/bin/sh");
        assert_eq!(guard.shell_env, "/bin/sh");
    }

    #[test]
    fn test_acquire_checks_each_setting_independently() {
        let state = Mutex::new(selection("/bin/sh", "/bin/zsh"));
        let usable = Regex::new(DEFAULT_USABLE_SHELL_PATTERN).unwrap();

        let guard = acquire(&state, &usable);
        assert_eq!(guard.shell, "/bin/sh");
        assert_eq!(guard.shell_env, DEFAULT_POSIX_SHELL);
    }

    #[test]
    fn test_custom_pattern_admits_other_shells() {
        let state = Mutex::new(selection("/bin/bash", "/bin/bash"));
        let usable = Regex::new("^/bin/(sh|bash)$").unwrap();

        let guard = acquire(&state, &usable);
        assert_eq!(guard.shell, "/bin/bash");
        assert_eq!(guard.shell_env, "/bin/bash");
    }
}
