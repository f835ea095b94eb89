//! Asynchronous bookkeeping of background jobs.
//!
//! A dedicated thread wakes up on every `SIGCHLD`, reaps whatever status
//! changes the tracked background process groups have pending, updates the
//! job table and forwards what happened to the main flow over a channel.
//! Groups the main flow is waiting on in the foreground are left alone; their
//! statuses belong to that blocking wait.

use std::fmt;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use failure::ResultExt;
use log::{debug, error, info};
use nix::errno::Errno;
use nix::sys::wait::{self, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::consts::SIGCHLD;
use signal_hook::iterator::{Handle, Signals};

use crate::core::job::{Job, JobState};
use crate::core::job_table::{self, JobTable, SharedJobTable};
use crate::errors::{ErrorKind, Result};

/// A status change of a tracked job that the user should hear about.
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    Stopped(Job),
    /// Every process of the job's group has terminated; the job was released.
    Done(Job),
}

impl fmt::Display for JobEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobEvent::Stopped(ref job) => write!(f, "{}", job.stop_notice()),
            JobEvent::Done(ref job) => write!(f, "[{}]+ Done       {}", job.id(), job.name()),
        }
    }
}

/// Reaps all pending status changes of the background jobs in `table` without blocking.
pub fn reap_jobs(table: &mut JobTable) -> Vec<JobEvent> {
    let pgids: Vec<Pid> = table
        .jobs()
        .map(Job::pgid)
        .filter(|&pgid| !table.is_foreground(pgid))
        .collect();

    let mut events = Vec::new();
    for pgid in pgids {
        if let Some(event) = reap_group(table, pgid) {
            events.push(event);
        }
    }

    events
}

fn reap_group(table: &mut JobTable, pgid: Pid) -> Option<JobEvent> {
    let mut event = None;
    loop {
        let wait_status = wait::waitpid(
            Pid::from_raw(-pgid.as_raw()),
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        );
        match wait_status {
            Ok(WaitStatus::StillAlive) => break,
            Ok(WaitStatus::Stopped(pid, signal)) => {
                debug!("{} (group {}) was signaled to stop {:?}", pid, pgid, signal);
                if table.set_state(pgid, JobState::Stopped) == Some(JobState::Running) {
                    event = table.find_by_pgid(pgid).cloned().map(JobEvent::Stopped);
                }
            }
            Ok(WaitStatus::Exited(pid, status_code)) => {
                debug!("{} (group {}) exited with {}", pid, pgid, status_code);
            }
            Ok(WaitStatus::Signaled(pid, signal, _)) => {
                debug!("{} (group {}) terminated by signal {:?}", pid, pgid, signal);
            }
            Ok(_) => (),
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => {
                // no members left in the group
                return table.release(pgid).map(|mut job| {
                    job.set_state(JobState::Done);
                    JobEvent::Done(job)
                });
            }
            Err(e) => {
                error!("failed to reap process group {}: {}", pgid, e);
                break;
            }
        }
    }

    event
}

/// Owns the thread that reaps background jobs whenever a child changes status.
pub struct StatusWatcher {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
    events: Receiver<JobEvent>,
}

impl StatusWatcher {
    pub fn spawn(jobs: SharedJobTable) -> Result<Self> {
        let mut signals = Signals::new(&[SIGCHLD]).context(ErrorKind::Io)?;
        let handle = signals.handle();
        let (sender, events) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("status-watcher".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    let reaped = reap_jobs(&mut job_table::lock(&jobs));
                    for event in reaped {
                        if sender.send(event).is_err() {
                            return;
                        }
                    }
                }
            })
            .context(ErrorKind::Io)?;

        info!("status watcher started");
        Ok(Self {
            handle,
            thread: Some(thread),
            events,
        })
    }

    /// Events delivered since the last call, without blocking.
    pub fn pending_events(&self) -> Vec<JobEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for StatusWatcher {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("status watcher thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::CommandExt;
    use std::process::Command;
    use std::thread;
    use std::time::{Duration, Instant};

    use nix::sys::signal::{self, Signal};

    use super::*;
    use crate::core::job::JobId;

    fn spawn_group(program: &str, args: &[&str]) -> Pid {
        let child = Command::new(program)
            .args(args)
            .process_group(0)
            .spawn()
            .expect("failed to spawn test process");
        Pid::from_raw(child.id() as i32)
    }

    /// Calls `reap_jobs` until it yields an event or the deadline passes.
    fn reap_until_event(table: &mut JobTable) -> Vec<JobEvent> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let events = reap_jobs(table);
            if !events.is_empty() || Instant::now() > deadline {
                return events;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_finished_job_is_released() {
        let pgid = spawn_group("true", &[]);
        let mut table = JobTable::with_capacity(4);
        let id = table.register(pgid, "true", JobState::Running).unwrap();

        let events = reap_until_event(&mut table);
        assert_eq!(events.len(), 1);
        match events[0] {
            JobEvent::Done(ref job) => {
                assert_eq!(job.id(), id);
                assert_eq!(job.state(), JobState::Done);
            }
            ref other => panic!("unexpected event {:?}", other),
        }
        assert!(table.find_by_pgid(pgid).is_none());
        assert_eq!(events[0].to_string(), "[1]+ Done       true");
    }

    #[test]
    fn test_stop_then_kill() {
        let pgid = spawn_group("sleep", &["30"]);
        let mut table = JobTable::with_capacity(4);
        table.register(pgid, "sleep", JobState::Running).unwrap();

        assert!(reap_jobs(&mut table).is_empty());
        assert_eq!(table.find_by_pgid(pgid).unwrap().state(), JobState::Running);

        signal::killpg(pgid, Signal::SIGSTOP).unwrap();
        let events = reap_until_event(&mut table);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], JobEvent::Stopped(ref job) if job.id() == JobId(1)));
        assert_eq!(table.find_by_pgid(pgid).unwrap().state(), JobState::Stopped);
        assert_eq!(events[0].to_string(), "\n[1]+ Stopped    sleep");

        signal::killpg(pgid, Signal::SIGKILL).unwrap();
        let events = reap_until_event(&mut table);
        assert!(matches!(events[0], JobEvent::Done(_)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_foreground_group_is_not_reaped() {
        let pgid = spawn_group("true", &[]);
        let mut table = JobTable::with_capacity(4);
        table.register(pgid, "true", JobState::Running).unwrap();
        table.mark_foreground(pgid);

        thread::sleep(Duration::from_millis(200));
        assert!(reap_jobs(&mut table).is_empty());
        assert!(table.find_by_pgid(pgid).is_some());

        let status = wait::waitpid(Pid::from_raw(-pgid.as_raw()), None).unwrap();
        assert!(matches!(status, WaitStatus::Exited(pid, 0) if pid == pgid));
    }

    #[test]
    fn test_watcher_thread_delivers_events() {
        let jobs = job_table::shared(4);
        let watcher = StatusWatcher::spawn(jobs.clone()).unwrap();

        let pgid = spawn_group("sleep", &["0.2"]);
        job_table::lock(&jobs)
            .register(pgid, "sleep", JobState::Running)
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        let mut events = Vec::new();
        while events.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
            events = watcher.pending_events();
        }

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], JobEvent::Done(ref job) if job.pgid() == pgid));
        assert!(job_table::lock(&jobs).is_empty());
    }
}
