use std::{path::Path, process::ExitStatus};

use crate::core::job_table;
use crate::errors::Result;

pub use self::job_control::{JobControl, PipelineOutcome};
pub use self::unix::create_shell;

pub mod builtins;
pub mod execute_command;
pub mod job_control;
pub mod terminal;
pub mod unix;
pub mod watcher;

pub const HISTORY_FILE_NAME: &str = ".jsh_history";
pub const SYNTAX_ERROR_EXIT_STATUS: i32 = 2;

pub trait Shell {
    fn execute_command_string(&mut self, input: &str) -> Result<()>;
    fn execute_commands_from_file(&mut self, path: &Path) -> Result<()>;
    fn execute_from_stdin(&mut self);
    /// Exits with `n`, or 0 when `n` is `None`.
    fn exit(&mut self, n: Option<ExitStatus>) -> !;
    fn last_exit_status(&self) -> ExitStatus;
    fn is_interactive(&self) -> bool;
    fn job_control(&self) -> &JobControl;
}

/// Policy object to control a Shell's behavior
#[derive(Debug, Copy, Clone)]
pub struct ShellConfig {
    /// Determines if new command entries will be added to the shell's command history.
    ///
    /// Note: This is checked before the other command history config fields.
    enable_command_history: bool,

    /// Number of entries to store in the shell's command history
    command_history_capacity: usize,

    /// Determines if the shell takes the terminal and hands it to foreground jobs.
    enable_job_control: bool,

    /// Determines if some messages (e.g. "exit") should be displayed.
    display_messages: bool,

    /// Number of jobs that can be tracked at once.
    job_table_capacity: usize,
}

impl ShellConfig {
    /// Creates an interactive shell, e.g. command history, job control
    ///
    /// # Complete List
    /// - Command History is enabled
    /// - Job Control is enabled
    /// - Some additional messages are displayed
    pub fn interactive(command_history_capacity: usize) -> Self {
        Self {
            enable_command_history: true,
            command_history_capacity,
            enable_job_control: true,
            display_messages: true,
            ..Default::default()
        }
    }

    /// Creates a noninteractive shell, e.g. no command history, no job control
    ///
    /// # Complete List
    /// - Command History is disabled. Commands are not saved.
    /// - Job Control is disabled. Pipelines still run in their own process
    ///   groups and can be sent to the background, but the terminal is never
    ///   handed over.
    /// - Fewer messages are displayed
    pub fn noninteractive() -> Self {
        Default::default()
    }

    pub fn with_job_table_capacity(self, job_table_capacity: usize) -> Self {
        Self {
            job_table_capacity,
            ..self
        }
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            enable_command_history: false,
            command_history_capacity: 0,
            enable_job_control: false,
            display_messages: false,
            job_table_capacity: job_table::DEFAULT_CAPACITY,
        }
    }
}
