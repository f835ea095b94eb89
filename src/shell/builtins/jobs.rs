use log::debug;
use serde::Deserialize;

use crate::core::job::JobId;
use crate::shell::builtins::{self, prelude::*};

pub struct Jobs;

#[derive(Debug, Deserialize)]
struct JobsArgs {
    flag_l: bool,
}

impl builtins::BuiltinCommand for Jobs {
    const NAME: &'static str = builtins::JOBS_NAME;

    const HELP: &'static str = "\
jobs: jobs [-l]

Display status of jobs.

Usage:
    jobs [-l]

Lists the active jobs in the order of their job ids.

Options:
    -l      lists process group IDs in addition to the normal information

Exit Status:
Returns success unless an invalid option is given or an error occurs.";

    fn run(shell: &mut dyn Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        let args: JobsArgs = parse_args(Self::HELP, Self::NAME, args.iter().map(AsRef::as_ref))?;
        debug!("{:?}", args);

        for job in shell.job_control().list_jobs() {
            if args.flag_l {
                writeln!(
                    stdout,
                    "[{}] {} {:<10} {}",
                    job.id(),
                    job.pgid(),
                    job.state().to_string(),
                    job.name()
                )
                .context(ErrorKind::Io)?;
            } else {
                writeln!(stdout, "{}", job).context(ErrorKind::Io)?;
            }
        }

        Ok(ExitStatus::from_success())
    }
}

/// Parses `%N` (or plain `N`) into a job id.
fn parse_job_spec(name: &str, usage: String, args: &[String]) -> Result<JobId> {
    let arg = match args {
        [arg] => arg,
        _ => return Err(Error::builtin_command(usage, 2)),
    };

    let number = arg.strip_prefix('%').unwrap_or(arg);
    match number.parse::<u32>() {
        Ok(n) if n > 0 => Ok(JobId(n)),
        _ => Err(Error::builtin_command(format!("{}: {}: no such job", name, arg), 1)),
    }
}

/// Prefixes job lookup failures with the builtin's name.
fn job_error(name: &str, e: Error) -> Error {
    match *e.kind() {
        ErrorKind::NoSuchJob(_) => Error::builtin_command(format!("{}: {}", name, e), 1),
        _ => e,
    }
}

pub struct Fg;

impl builtins::BuiltinCommand for Fg {
    const NAME: &'static str = builtins::FG_NAME;

    const HELP: &'static str = "\
fg: usage: fg %N
    Move job to the foreground.

    Place the job identified by N in the foreground, continuing it if it
    is stopped, and wait for it to stop or finish.

    Exit Status:
    Status of command placed in foreground or failure if an error occurs.";

    fn run(shell: &mut dyn Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        let job_id = parse_job_spec(Self::NAME, Self::usage(), args)?;
        let job_control = shell.job_control();
        let job = job_control
            .find_job(job_id)
            .map_err(|e| job_error(Self::NAME, e))?;
        writeln!(stdout, "{}", job.name()).context(ErrorKind::Io)?;
        stdout.flush().context(ErrorKind::Io)?;

        let outcome = job_control
            .bring_to_foreground(job_id)
            .map_err(|e| job_error(Self::NAME, e))?;
        Ok(outcome.exit_status())
    }
}

pub struct Bg;

impl builtins::BuiltinCommand for Bg {
    const NAME: &'static str = builtins::BG_NAME;

    const HELP: &'static str = "\
bg: usage: bg %N
    Move job to the background.

    Continue the job identified by N in the background, as if it had been
    started with `&'.

    Exit Status:
    Returns success unless the job does not exist or an error occurs.";

    fn run(shell: &mut dyn Shell, args: &[String], stdout: &mut dyn Write) -> Result<ExitStatus> {
        let job_id = parse_job_spec(Self::NAME, Self::usage(), args)?;
        let job = shell
            .job_control()
            .continue_in_background(job_id)
            .map_err(|e| job_error(Self::NAME, e))?;
        writeln!(stdout, "[{}]+ {} &", job.id(), job.name()).context(ErrorKind::Io)?;
        Ok(ExitStatus::from_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_job_spec() {
        let usage = || "fg: usage: fg %N".to_string();
        assert_eq!(parse_job_spec("fg", usage(), &args(&["%1"])).unwrap(), JobId(1));
        assert_eq!(parse_job_spec("fg", usage(), &args(&["12"])).unwrap(), JobId(12));

        let err = parse_job_spec("fg", usage(), &args(&[])).unwrap_err();
        assert_eq!(err.to_string(), "fg: usage: fg %N");
        let err = parse_job_spec("fg", usage(), &args(&["%1", "%2"])).unwrap_err();
        assert_eq!(err.to_string(), "fg: usage: fg %N");

        for bad in &["%0", "%x", "%", "-1"] {
            let err = parse_job_spec("bg", usage(), &args(&[bad])).unwrap_err();
            assert_eq!(err.to_string(), format!("bg: {}: no such job", bad));
        }
    }

    #[test]
    fn test_job_error_prefix() {
        let err = job_error("fg", Error::no_such_job("%3"));
        assert_eq!(err.to_string(), "fg: %3: no such job");
        assert_eq!(
            err.kind(),
            &ErrorKind::BuiltinCommand {
                message: "fg: %3: no such job".to_string(),
                code: 1
            }
        );
    }
}
