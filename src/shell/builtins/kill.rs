use crate::core::job::JobId;
use crate::shell::builtins::{self, prelude::*};

pub struct Kill;

impl builtins::BuiltinCommand for Kill {
    const NAME: &'static str = builtins::KILL_NAME;

    const HELP: &'static str = "\
kill: usage: kill %N
    Send a signal to a job.

    Send SIGTERM to the processes of the job identified by N, continuing
    them first if they are stopped.

    Exit Status:
    Returns success unless the job does not exist or an error occurs.";

    fn run(shell: &mut dyn Shell, args: &[String], _stdout: &mut dyn Write) -> Result<ExitStatus> {
        let arg = match args {
            [arg] => arg,
            _ => return Err(Error::builtin_command(Self::usage(), 2)),
        };

        let job_id = match arg.strip_prefix('%').map(str::parse::<u32>) {
            Some(Ok(n)) => JobId(n),
            _ => {
                return Err(Error::builtin_command(
                    format!("kill: {}: arguments must be job IDs", arg),
                    1,
                ))
            }
        };

        match shell.job_control().kill_job(job_id) {
            Ok(_) => Ok(ExitStatus::from_success()),
            Err(ref e) if matches!(e.kind(), ErrorKind::NoSuchJob(_)) => Err(
                Error::builtin_command(format!("kill: {}: no such job", arg), 1),
            ),
            Err(e) => Err(e),
        }
    }
}
