//! Jsh builtins
//!
//! This module includes the implementations of the shell's builtin commands.
//! Where possible the commands conform to their standard Bash counterparts.

use std::iter;

use docopt::Docopt;
use failure::Fail;
use serde::Deserialize;

use self::prelude::*;

use self::exit::Exit;
use self::jobs::{Bg, Fg, Jobs};
use self::kill::Kill;

pub mod prelude {
    pub use std::io::Write;
    pub use std::process::ExitStatus;

    pub use failure::ResultExt;

    pub use super::parse_args;
    pub use crate::errors::{Error, ErrorKind, Result};
    pub use crate::shell::Shell;
    pub use crate::util::JshExitStatusExt;
}

mod exit;
mod jobs;
mod kill;

const BG_NAME: &str = "bg";
const EXIT_NAME: &str = "exit";
const FG_NAME: &str = "fg";
const JOBS_NAME: &str = "jobs";
const KILL_NAME: &str = "kill";

/// Represents a Jsh builtin command such as fg or jobs.
pub trait BuiltinCommand {
    /// The NAME of the command.
    const NAME: &'static str;
    /// The help string to display to the user.
    const HELP: &'static str;
    /// The usage string to display to the user.
    fn usage() -> String {
        Self::HELP.lines().next().unwrap_or_default().to_owned()
    }
    /// Runs the command with the given arguments in the `shell` environment,
    /// returning the status the command completed with.
    fn run(shell: &mut dyn Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus>;
}

pub fn is_builtin<T: AsRef<str>>(program: T) -> bool {
    [BG_NAME, EXIT_NAME, FG_NAME, JOBS_NAME, KILL_NAME].contains(&program.as_ref())
}

/// precondition: command is a builtin.
/// Returns (`exit_status_code`, `builtin_result`)
pub fn run<S: AsRef<str>>(
    shell: &mut dyn Shell,
    program: S,
    args: &[String],
    stdout: &mut dyn Write,
) -> (ExitStatus, Result<()>) {
    debug_assert!(is_builtin(&program));

    let result = match program.as_ref() {
        BG_NAME => Bg::run(shell, args, stdout),
        EXIT_NAME => Exit::run(shell, args, stdout),
        FG_NAME => Fg::run(shell, args, stdout),
        JOBS_NAME => Jobs::run(shell, args, stdout),
        KILL_NAME => Kill::run(shell, args, stdout),
        _ => unreachable!(),
    };

    match result {
        Ok(status) => (status, Ok(())),
        Err(e) => (get_builtin_exit_status(&e), Err(e)),
    }
}

fn get_builtin_exit_status(e: &Error) -> ExitStatus {
    let status = match *e.kind() {
        ErrorKind::BuiltinCommand { code, .. } => code,
        ErrorKind::Docopt => 2,
        _ => 1,
    };

    ExitStatus::from_status(status)
}

pub fn parse_args<'a, 'de: 'a, D, S, I>(usage: &str, program: S, args: I) -> Result<D>
where
    D: Deserialize<'de>,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Docopt::new(usage)
        .and_then(|d| d.argv(iter::once(program).chain(args)).deserialize())
        .map_err(|e| e.context(ErrorKind::Docopt).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_builtin() {
        for name in &["bg", "exit", "fg", "jobs", "kill"] {
            assert!(is_builtin(name));
        }
        assert!(!is_builtin("sleep"));
        assert!(!is_builtin("cd"));
    }

    #[test]
    fn test_builtin_exit_status() {
        let usage = Error::builtin_command("fg: usage: fg %N", 2);
        assert_eq!(get_builtin_exit_status(&usage).code(), Some(2));
        let missing = Error::no_such_job("%1");
        assert_eq!(get_builtin_exit_status(&missing).code(), Some(1));
    }
}
