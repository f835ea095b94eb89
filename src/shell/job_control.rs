//! Runs pipelines as jobs and moves them between the foreground and the
//! background.

use std::fmt;
use std::process::ExitStatus;

use failure::{Fail, ResultExt};
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::execute_command;
use super::terminal::{Terminal, TerminalState};
use super::watcher::{self, JobEvent, StatusWatcher};
use crate::core::job::{Job, JobId, JobState};
use crate::core::job_table::{self, SharedJobTable};
use crate::core::parser::ast::CommandDescriptor;
use crate::errors::{Error, ErrorKind, Result};
use crate::util::JshExitStatusExt;

/// What became of a pipeline once the shell stopped waiting on it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PipelineOutcome {
    /// Every stage terminated; holds the status of the last one.
    Completed(ExitStatus),
    /// The group was stopped and registered as a job, unless the table was full.
    Stopped(Option<JobId>),
    /// Launched without waiting, registered unless the table was full.
    Background(Option<JobId>),
}

impl PipelineOutcome {
    /// The status a shell reports for this outcome in `$?`.
    pub fn exit_status(&self) -> ExitStatus {
        match *self {
            PipelineOutcome::Completed(status) => status,
            PipelineOutcome::Stopped(_) => ExitStatus::from_shell_signal(Signal::SIGTSTP),
            PipelineOutcome::Background(_) => ExitStatus::from_success(),
        }
    }
}

#[derive(Debug, PartialEq)]
enum GroupStatus {
    Stopped,
    /// No members left. Holds the status picked by `wait_for_group`, if any was seen.
    Exited(Option<ExitStatus>),
}

/// Blocks until the process group `pgid` is stopped or has no members left.
///
/// With `last_process`, the reported status is that process's; otherwise it
/// is the status of whichever member was reaped last.
fn wait_for_group(pgid: Pid, last_process: Option<Pid>) -> Result<GroupStatus> {
    let mut status = None;
    loop {
        let wait_status = wait::waitpid(
            Pid::from_raw(-pgid.as_raw()),
            Some(WaitPidFlag::WUNTRACED),
        );
        let (pid, exit_status) = match wait_status {
            Ok(WaitStatus::Exited(pid, code)) => {
                debug!("{} exited with {}", pid, code);
                (pid, ExitStatus::from_status(code))
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                debug!("{} terminated by signal {:?}", pid, signal);
                (pid, ExitStatus::from_shell_signal(signal))
            }
            Ok(WaitStatus::Stopped(pid, signal)) => {
                debug!("{} was signaled to stop {:?}", pid, signal);
                return Ok(GroupStatus::Stopped);
            }
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return Ok(GroupStatus::Exited(status)),
            Err(e) => return Err(e.context(ErrorKind::Nix).into()),
        };

        if last_process.map_or(true, |last| last == pid) {
            status = Some(exit_status);
        }
    }
}

/// Owns the job table and, when interactive, the handle on the terminal.
pub struct JobControl {
    jobs: SharedJobTable,
    terminal: Option<Terminal>,
    watcher: Option<StatusWatcher>,
}

impl JobControl {
    /// `terminal` is `None` when the shell runs without a controlling terminal;
    /// jobs still get their own process groups but nobody is handed the terminal.
    pub fn new(job_table_capacity: usize, terminal: Option<Terminal>) -> Self {
        let jobs = job_table::shared(job_table_capacity);
        let watcher = match StatusWatcher::spawn(jobs.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("background jobs will only be checked before prompts: {}", e);
                None
            }
        };

        Self {
            jobs,
            terminal,
            watcher,
        }
    }

    pub fn terminal(&self) -> Option<Terminal> {
        self.terminal
    }

    /// Launches `commands` as one pipeline.
    ///
    /// A foreground pipeline is waited on until it stops or every stage
    /// terminates; a background one is registered and left running.
    pub fn run(&self, commands: &[CommandDescriptor], background: bool) -> Result<PipelineOutcome> {
        if commands.is_empty() {
            return Ok(PipelineOutcome::Completed(ExitStatus::from_success()));
        }

        let name = commands[0].program();
        let process_group = execute_command::spawn_processes(commands, !background, self.terminal)?;
        let pgid = process_group.id;

        if background {
            let job_id = self.register(pgid, name, JobState::Running);
            if let Some(job_id) = job_id {
                println!("[{}] {}", job_id, pgid);
            }
            return Ok(PipelineOutcome::Background(job_id));
        }

        let status = {
            let _terminal_state = self.terminal.map(|t| TerminalState::new(t, pgid));
            wait_for_group(pgid, process_group.last_process())?
        };

        match status {
            GroupStatus::Stopped => {
                let job_id = self.register(pgid, name, JobState::Stopped);
                if let Some(job_id) = job_id {
                    println!("{}", Job::new(job_id, pgid, name, JobState::Stopped).stop_notice());
                }
                Ok(PipelineOutcome::Stopped(job_id))
            }
            GroupStatus::Exited(status) => Ok(PipelineOutcome::Completed(
                status.unwrap_or_else(ExitStatus::from_success),
            )),
        }
    }

    /// Snapshot of the tracked jobs in id order.
    pub fn list_jobs(&self) -> Vec<Job> {
        job_table::lock(&self.jobs).list()
    }

    pub fn find_job(&self, job_id: JobId) -> Result<Job> {
        job_table::lock(&self.jobs)
            .find_by_id(job_id)
            .cloned()
            .ok_or_else(|| Error::no_such_job(format!("%{}", job_id)))
    }

    /// Continues the job if needed, hands it the terminal and waits on it like
    /// a foreground pipeline. A completed job is released; a job stopped again
    /// stays registered.
    pub fn bring_to_foreground(&self, job_id: JobId) -> Result<PipelineOutcome> {
        let job = {
            let mut jobs = job_table::lock(&self.jobs);
            let job = jobs
                .find_by_id(job_id)
                .cloned()
                .ok_or_else(|| Error::no_such_job(format!("%{}", job_id)))?;
            jobs.set_state(job.pgid(), JobState::Running);
            jobs.mark_foreground(job.pgid());
            job
        };
        debug!("putting job [{}] in foreground", job_id);

        let status = {
            let _terminal_state = self.terminal.map(|t| TerminalState::new(t, job.pgid()));
            continue_group(job.pgid()).and_then(|_| wait_for_group(job.pgid(), None))
        };

        let mut jobs = job_table::lock(&self.jobs);
        jobs.clear_foreground();
        match status? {
            GroupStatus::Stopped => {
                jobs.set_state(job.pgid(), JobState::Stopped);
                println!("{}", job.stop_notice());
                Ok(PipelineOutcome::Stopped(Some(job_id)))
            }
            GroupStatus::Exited(status) => {
                jobs.release(job.pgid());
                Ok(PipelineOutcome::Completed(
                    status.unwrap_or_else(ExitStatus::from_success),
                ))
            }
        }
    }

    /// Resumes a job without giving it the terminal.
    pub fn continue_in_background(&self, job_id: JobId) -> Result<Job> {
        let mut jobs = job_table::lock(&self.jobs);
        let job = jobs
            .find_by_id(job_id)
            .cloned()
            .ok_or_else(|| Error::no_such_job(format!("%{}", job_id)))?;
        debug!("putting job [{}] in background", job_id);

        continue_group(job.pgid())?;
        jobs.set_state(job.pgid(), JobState::Running);
        Ok(job)
    }

    /// Sends `SIGTERM` to every process of the job, continuing it so that a
    /// stopped job can act on it. The job is released once it has been reaped.
    pub fn kill_job(&self, job_id: JobId) -> Result<Job> {
        let job = self.find_job(job_id)?;
        info!("terminating job [{}] (pgid {})", job_id, job.pgid());
        signal::killpg(job.pgid(), Signal::SIGTERM).context(ErrorKind::Nix)?;
        let temp_result = continue_group(job.pgid());
        log_if_err!(temp_result, "failed to continue job [{}] after SIGTERM", job_id);
        Ok(job)
    }

    /// Status changes of background jobs since the last call, oldest first.
    ///
    /// Also reaps synchronously, which catches jobs whose processes all
    /// terminated before they were registered.
    pub fn pending_events(&self) -> Vec<JobEvent> {
        let mut events = self
            .watcher
            .as_ref()
            .map(StatusWatcher::pending_events)
            .unwrap_or_default();
        events.extend(watcher::reap_jobs(&mut job_table::lock(&self.jobs)));
        events
    }

    /// Tells the user about background jobs that stopped or finished.
    pub fn do_job_notification(&self) {
        for event in self.pending_events() {
            println!("{}", event);
        }
    }

    fn register(&self, pgid: Pid, name: &str, state: JobState) -> Option<JobId> {
        match job_table::lock(&self.jobs).register(pgid, name, state) {
            Ok(job_id) => Some(job_id),
            Err(e) => {
                warn!("process group {} ({}) is not tracked: {}", pgid, name, e);
                eprintln!("jsh: {}", e);
                None
            }
        }
    }
}

fn continue_group(pgid: Pid) -> Result<()> {
    match signal::killpg(pgid, Signal::SIGCONT) {
        // Already gone, the wait that follows will notice.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e.context(ErrorKind::Nix).into()),
    }
}

impl fmt::Debug for JobControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "terminal: {:?}\n{:?}",
            self.terminal,
            job_table::lock(&self.jobs)
        )
    }
}
