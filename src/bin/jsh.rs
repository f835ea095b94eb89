use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use docopt::Docopt;
use jsh::errors::{Error, Result};
use jsh::{JshExitStatusExt, Shell, ShellConfig};
use log::{debug, error, LevelFilter};
use nix::unistd::Pid;
use serde::Deserialize;

const COMMAND_HISTORY_CAPACITY: usize = 100;
const LOG_FILE_NAME: &str = ".jsh_log";

const USAGE: &str = "
jsh.

Usage:
    jsh [options]
    jsh [options] -c <command>
    jsh [options] <file>
    jsh (-h | --help)
    jsh --version

Options:
    -h --help            Show this screen.
    --version            Show version.
    -c                   If the -c option is present, then commands are read from the first
                             non-option argument command_string.
    --log=<path>         File to write log to, defaults to ~/.jsh_log
    --log-level=<level>  Minimum level of log messages, one of off, error, warn, info,
                             debug, trace [default: debug]
";

/// Docopts input arguments.
#[derive(Debug, Deserialize)]
struct Args {
    arg_command: Option<String>,
    arg_file: Option<String>,
    flag_version: bool,
    flag_c: bool,
    flag_log: Option<String>,
    flag_log_level: String,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| d.deserialize())
        .unwrap_or_else(|e| e.exit());

    init_logger(args.flag_log.as_ref().map(Path::new), &args.flag_log_level);
    debug!("{:?}", args);

    if args.flag_version {
        println!("jsh version {}", env!("CARGO_PKG_VERSION"));
    } else if args.flag_c || args.arg_file.is_some() {
        execute_from_command_string_or_file(&args);
    } else {
        execute_from_stdin();
    }
}

/// Logs to a file. The shell keeps running without a log if it cannot be set up.
fn init_logger(path: Option<&Path>, level: &str) {
    let log_path = match path.map(Path::to_path_buf).or_else(default_log_path) {
        Some(log_path) => log_path,
        None => {
            eprintln!("jsh: unable to get home directory, logging is disabled");
            return;
        }
    };

    let level = level.parse::<LevelFilter>().unwrap_or_else(|_| {
        eprintln!("jsh: invalid log level '{}', using debug", level);
        LevelFilter::Debug
    });

    let log_file = match fern::log_file(&log_path) {
        Ok(log_file) => log_file,
        Err(e) => {
            eprintln!("jsh: failed to open log file {}: {}", log_path.display(), e);
            return;
        }
    };

    let pid = Pid::this();
    let result = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                pid,
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(log_file)
        .apply();
    if let Err(e) = result {
        eprintln!("jsh: failed to initialize logging: {}", e);
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(LOG_FILE_NAME))
}

fn execute_from_command_string_or_file(args: &Args) -> ! {
    let shell_config = ShellConfig::noninteractive();
    let mut shell = jsh::create_shell(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));

    let result = if let Some(ref command) = args.arg_command {
        shell.execute_command_string(command)
    } else if let Some(ref file_path) = args.arg_file {
        shell.execute_commands_from_file(Path::new(file_path))
    } else {
        unreachable!();
    };

    exit(result, shell.as_mut());
}

fn execute_from_stdin() -> ! {
    let shell_config = ShellConfig::interactive(COMMAND_HISTORY_CAPACITY);
    let mut shell = jsh::create_shell(shell_config).unwrap_or_else(|e| display_error_and_exit(&e));
    shell.execute_from_stdin();
    shell.exit(None)
}

fn display_error_and_exit(error: &Error) -> ! {
    error!("failed to create shell: {}", error);
    eprintln!("jsh: {}", error);
    process::exit(ExitStatus::from_failure().code().unwrap_or(1));
}

fn exit(result: Result<()>, shell: &mut dyn Shell) -> ! {
    if let Err(e) = result {
        error!("{}", e);
        eprintln!("jsh: {}", e);
        shell.exit(Some(ExitStatus::from_failure()));
    } else {
        let status = shell.last_exit_status();
        shell.exit(Some(status));
    }
}
