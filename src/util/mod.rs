use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// Logs the error of a `Result` that the caller chooses not to propagate.
macro_rules! log_if_err {
    ($result:expr, $fmt:expr) => {{
        if let Err(ref e) = $result {
            ::log::error!("{}: {}", $fmt, e);
        }
    }};
    ($result:expr, $fmt:expr, $($arg:tt)*) => {{
        if let Err(ref e) = $result {
            ::log::error!("{}: {}", format_args!($fmt, $($arg)*), e);
        }
    }};
}

pub mod unix;

/// JSH Utility Extensions for `ExitStatus`
pub trait JshExitStatusExt {
    /// Create an ExitStatus to indicate *successful* program execution.
    fn from_success() -> Self;

    /// Create an ExitStatus to indicate *unsuccessful* program execution.
    fn from_failure() -> Self;

    /// Create an ExitStatus from a status code
    fn from_status(code: i32) -> Self;

    /// Create the ExitStatus a shell reports for a process killed or stopped by `signal`.
    fn from_shell_signal(signal: Signal) -> Self;
}

impl JshExitStatusExt for ExitStatus {
    /// # Examples
    /// ```rust
    /// use jsh::JshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_success().success());
    /// ```
    fn from_success() -> Self {
        ExitStatus::from_status(0)
    }

    /// # Examples
    /// ```rust
    /// use jsh::JshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(!ExitStatus::from_failure().success());
    /// ```
    fn from_failure() -> Self {
        ExitStatus::from_status(1)
    }

    /// # Examples
    /// ```rust
    /// use jsh::JshExitStatusExt;
    /// use std::process::ExitStatus;
    /// assert!(ExitStatus::from_status(0).success());
    /// assert_eq!(ExitStatus::from_status(127).code(), Some(127));
    /// ```
    fn from_status(code: i32) -> Self {
        ExitStatus::from_raw((code & 0xff) << 8)
    }

    /// # Examples
    /// ```rust
    /// use jsh::JshExitStatusExt;
    /// use nix::sys::signal::Signal;
    /// use std::process::ExitStatus;
    /// assert_eq!(ExitStatus::from_shell_signal(Signal::SIGTSTP).code(), Some(148));
    /// ```
    fn from_shell_signal(signal: Signal) -> Self {
        ExitStatus::from_status(128 + signal as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_wraps_like_a_byte() {
        assert_eq!(ExitStatus::from_status(256).code(), Some(0));
        assert_eq!(ExitStatus::from_status(-1).code(), Some(255));
    }
}
