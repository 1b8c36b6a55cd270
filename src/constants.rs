// src/constants.rs

/// The POSIX-compatible shell every call is executed through.
pub const DEFAULT_POSIX_SHELL: &str = "/bin/sh";

/// Pattern a configured shell must match to be used as-is. Anything else is
/// overridden to [`DEFAULT_POSIX_SHELL`] for the duration of a call.
pub const DEFAULT_USABLE_SHELL_PATTERN: &str = "^/bin/sh$";

/// Exit status reported when a process terminated without an exit code
/// (killed by a signal) or could not be launched at all.
pub const STATUS_NO_EXIT_CODE: i32 = -1;
