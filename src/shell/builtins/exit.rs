use crate::shell::builtins::{self, prelude::*};

pub struct Exit;

impl builtins::BuiltinCommand for Exit {
    const NAME: &'static str = builtins::EXIT_NAME;

    const HELP: &'static str = "\
exit: exit [n]
    Exit the shell with a status of N. If N is omitted, the exit status
    is 0.";

    fn run(shell: &mut dyn Shell, args: &[String], _stdout: &mut dyn Write) -> Result<ExitStatus> {
        let status_code = args
            .first()
            .map(|arg| {
                arg.parse::<i32>().unwrap_or_else(|_| {
                    eprintln!("jsh: exit: {}: numeric argument required", arg);
                    2
                })
            })
            .map(ExitStatus::from_status);
        shell.exit(status_code);
    }
}
