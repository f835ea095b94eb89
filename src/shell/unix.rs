//! The JobControlShell runs pipelines in the foreground and background, in
//! addition to the normal shell abilities such as managing the command
//! history.

use std::env;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, Read};
use std::path::{Path, PathBuf};
use std::process::{self, ExitStatus};

use atty::{self, Stream};
use failure::ResultExt;
use log::{debug, error, info, warn};

use super::{
    builtins, terminal, JobControl, Shell, ShellConfig, HISTORY_FILE_NAME,
    SYNTAX_ERROR_EXIT_STATUS,
};
use crate::{
    core::parser,
    editor::Editor,
    errors::{Error, ErrorKind, Result},
    util::JshExitStatusExt,
};

pub struct JobControlShell {
    /// Responsible for readline and history. Only present when interactive.
    editor: Option<Editor>,
    history_file: Option<PathBuf>,
    job_control: JobControl,
    /// Exit status of last command executed.
    last_exit_status: ExitStatus,
    config: ShellConfig,
    /// Is `false` if the shell is running a script or stdin is not a terminal.
    is_interactive: bool,
}

impl JobControlShell {
    /// Constructs a new JobControlShell to manage running jobs and command history.
    ///
    /// An interactive shell that cannot take its terminal fails to start.
    pub fn new(config: ShellConfig) -> Result<Self> {
        let is_interactive = config.enable_job_control && atty::is(Stream::Stdin);
        let terminal = if is_interactive {
            let terminal = terminal::initialize_job_control().map_err(|e| {
                error!("failed to initialize shell for job control: {}", e);
                e
            })?;
            Some(terminal)
        } else {
            None
        };

        let editor = if is_interactive {
            Some(Editor::with_capacity(config.command_history_capacity)?)
        } else {
            None
        };

        let mut shell = Self {
            editor,
            history_file: None,
            job_control: JobControl::new(config.job_table_capacity, terminal),
            last_exit_status: ExitStatus::from_success(),
            config,
            is_interactive,
        };

        if shell.history_enabled() {
            shell.load_history()?
        }

        info!("jsh started up (interactive: {})", is_interactive);
        Ok(shell)
    }

    fn history_enabled(&self) -> bool {
        self.config.enable_command_history && self.editor.is_some()
    }

    fn load_history(&mut self) -> Result<()> {
        self.history_file = dirs::home_dir().map(|p| p.join(HISTORY_FILE_NAME));
        match (self.history_file.as_ref(), self.editor.as_mut()) {
            (Some(history_file), Some(editor)) => editor.load_history(history_file)?,
            (None, _) => warn!("unable to get home directory"),
            _ => (),
        }

        Ok(())
    }

    /// Custom prompt to output to the user.
    /// Returns `None` when end of file is reached.
    fn prompt(&mut self) -> Result<Option<String>> {
        let cwd = env::current_dir().unwrap_or_default();
        let prompt = format!(
            "{}|{} $ ",
            self.last_exit_status.code().unwrap_or(1),
            display_path(&cwd, dirs::home_dir().as_deref()).display()
        );

        match self.editor {
            Some(ref mut editor) => editor.readline(&prompt),
            None => Ok(None),
        }
    }

    fn run_builtin(&mut self, program: &str, args: &[String]) {
        let mut stdout = io::stdout();
        let (status, result) = builtins::run(self, program, args, &mut stdout);
        if let Err(e) = result {
            debug!("builtin {} failed: {:?}", program, e);
            eprintln!("jsh: {}", e);
        }
        self.last_exit_status = status;
    }

    fn read_lines_from_stdin(&mut self) {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    let temp_result = self.execute_command_string(&line);
                    log_if_err!(temp_result, "execute_command_string");
                }
                Err(e) => {
                    error!("failed to read from stdin: {}", e);
                    break;
                }
            }
        }
    }
}

impl Shell for JobControlShell {
    fn execute_command_string(&mut self, input: &str) -> Result<()> {
        let input = input.trim();
        // skip if empty
        if input.is_empty() {
            return Ok(());
        }

        if self.history_enabled() {
            if let Some(ref mut editor) = self.editor {
                editor.add_history_entry(input);
            }
        }

        let (line, background) = split_background(input);
        let commands = match parser::parse(line) {
            Ok(ref commands) if commands.is_empty() && background => {
                Err(Error::syntax("&"))
            }
            result => result,
        };
        let commands = match commands {
            Ok(commands) => commands,
            Err(e) => {
                if let ErrorKind::Syntax(_) = *e.kind() {
                    eprintln!("jsh: {}", e);
                    self.last_exit_status = ExitStatus::from_status(SYNTAX_ERROR_EXIT_STATUS);
                    return Ok(());
                }

                return Err(e);
            }
        };

        let first = match commands.first() {
            Some(first) => first,
            None => return Ok(()),
        };
        if builtins::is_builtin(first.program()) {
            if commands.len() > 1 {
                warn!("builtin {} ignores the rest of its pipeline", first.program());
            }
            let program = first.program().to_string();
            let args = first.argv[1..].to_vec();
            self.run_builtin(&program, &args);
            return Ok(());
        }

        self.last_exit_status = match self.job_control.run(&commands, background) {
            Ok(outcome) => outcome.exit_status(),
            Err(e) => {
                error!("failed to run {:?}: {}", line, e);
                eprintln!("jsh: {}", e);
                ExitStatus::from_failure()
            }
        };
        Ok(())
    }

    fn execute_commands_from_file(&mut self, path: &Path) -> Result<()> {
        let mut f = File::open(path).context(ErrorKind::Io)?;
        let mut buffer = String::new();
        f.read_to_string(&mut buffer).context(ErrorKind::Io)?;

        for line in buffer.lines() {
            self.execute_command_string(line)?
        }

        Ok(())
    }

    fn execute_from_stdin(&mut self) {
        if !self.is_interactive {
            self.read_lines_from_stdin();
            return;
        }

        loop {
            // Report background jobs that stopped or finished since the last prompt.
            self.job_control.do_job_notification();

            let input = match self.prompt() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                e => {
                    log_if_err!(e, "prompt");
                    continue;
                }
            };

            let temp_result = self.execute_command_string(&input);
            log_if_err!(temp_result, "execute_command_string");
        }
    }

    fn exit(&mut self, n: Option<ExitStatus>) -> ! {
        if self.config.display_messages && self.is_interactive {
            println!("exit");
        }

        let code = n.unwrap_or_else(ExitStatus::from_success).code().unwrap_or(1);
        let code_like_u8 = code.rem_euclid(256);

        if self.history_enabled() {
            if let (Some(history_file), Some(editor)) =
                (self.history_file.as_ref(), self.editor.as_mut())
            {
                if let Err(e) = editor.save_history(history_file) {
                    error!(
                        "error: failed to save history to file during shutdown: {}",
                        e
                    );
                }
            }
        }

        info!("jsh has shut down with {}", code_like_u8);
        process::exit(code_like_u8);
    }

    fn last_exit_status(&self) -> ExitStatus {
        self.last_exit_status
    }

    fn is_interactive(&self) -> bool {
        self.is_interactive
    }

    fn job_control(&self) -> &JobControl {
        &self.job_control
    }
}

impl fmt::Debug for JobControlShell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interactive: {}\n{:?}\n{:?}",
            self.is_interactive, self.job_control, self.editor
        )
    }
}

pub fn create_shell(config: ShellConfig) -> Result<Box<dyn Shell>> {
    let shell = JobControlShell::new(config)?;
    Ok(Box::new(shell))
}

/// Splits a trailing `&` off `input`. Returns the rest of the line and
/// whether the pipeline should run in the background.
///
/// The `&` is escaped only when an odd number of backslashes precede it.
fn split_background(input: &str) -> (&str, bool) {
    let input = input.trim_end();
    match input.strip_suffix('&') {
        Some(rest) if rest.chars().rev().take_while(|&c| c == '\\').count() % 2 == 0 => {
            (rest.trim_end(), true)
        }
        _ => (input, false),
    }
}

/// `path` with the home directory replaced by `~`.
fn display_path(path: &Path, home: Option<&Path>) -> PathBuf {
    match home.and_then(|home| path.strip_prefix(home).ok()) {
        Some(rel) if rel.as_os_str().is_empty() => PathBuf::from("~"),
        Some(rel) => Path::new("~").join(rel),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> JobControlShell {
        JobControlShell::new(ShellConfig::noninteractive()).unwrap()
    }

    fn status_after(shell: &mut JobControlShell, line: &str) -> Option<i32> {
        shell.execute_command_string(line).unwrap();
        shell.last_exit_status().code()
    }

    #[test]
    fn test_split_background() {
        assert_eq!(split_background("sleep 5 &"), ("sleep 5", true));
        assert_eq!(split_background("sleep 5&  "), ("sleep 5", true));
        assert_eq!(split_background("sleep 5"), ("sleep 5", false));
        assert_eq!(split_background("echo \\&"), ("echo \\&", false));
        assert_eq!(split_background("echo \\\\&"), ("echo \\\\", true));
        assert_eq!(split_background("echo \\\\\\&"), ("echo \\\\\\&", false));
        assert_eq!(split_background("&"), ("", true));
    }

    #[test]
    fn test_display_path() {
        let home = Path::new("/home/user");
        assert_eq!(display_path(Path::new("/home/user"), Some(home)), PathBuf::from("~"));
        assert_eq!(
            display_path(Path::new("/home/user/src"), Some(home)),
            PathBuf::from("~/src")
        );
        assert_eq!(display_path(Path::new("/tmp"), Some(home)), PathBuf::from("/tmp"));
        assert_eq!(display_path(Path::new("/tmp"), None), PathBuf::from("/tmp"));
    }

    #[test]
    fn test_noninteractive_shell() {
        let shell = shell();
        assert!(!shell.is_interactive());
        assert!(shell.job_control().terminal().is_none());
        assert!(shell.editor.is_none());
    }

    #[test]
    fn test_last_exit_status() {
        let mut shell = shell();
        assert_eq!(status_after(&mut shell, "false"), Some(1));
        assert_eq!(status_after(&mut shell, "   "), Some(1));
        assert_eq!(status_after(&mut shell, "true"), Some(0));
        assert_eq!(status_after(&mut shell, "jsh-definitely-missing"), Some(127));
        assert_eq!(status_after(&mut shell, "echo 'unterminated"), Some(2));
        assert_eq!(status_after(&mut shell, "&"), Some(2));
    }

    #[test]
    fn test_builtin_errors_set_status() {
        let mut shell = shell();
        assert_eq!(status_after(&mut shell, "fg %9"), Some(1));
        assert_eq!(status_after(&mut shell, "bg"), Some(2));
        assert_eq!(status_after(&mut shell, "jobs -z"), Some(2));
        assert_eq!(status_after(&mut shell, "kill 1234"), Some(1));
        assert_eq!(status_after(&mut shell, "jobs"), Some(0));
    }

    #[test]
    fn test_background_then_kill() {
        let mut shell = shell();
        assert_eq!(status_after(&mut shell, "sleep 30 &"), Some(0));
        assert_eq!(shell.job_control().list_jobs().len(), 1);
        assert_eq!(status_after(&mut shell, "kill %1"), Some(0));
        assert_eq!(status_after(&mut shell, "kill %2"), Some(1));
    }
}
