//! Fixed-capacity registry of the shell's jobs.
//!
//! A job's id is its slot index plus one, so ids are only unique among the
//! jobs currently registered and a freed id is handed out again.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;
use nix::unistd::Pid;

use super::job::{Job, JobId, JobState};
use crate::errors::{Error, Result};

/// Default number of jobs the shell can track at once.
pub const DEFAULT_CAPACITY: usize = 20;

/// The job table as shared between the main flow and the status watcher.
pub type SharedJobTable = Arc<Mutex<JobTable>>;

pub fn shared(capacity: usize) -> SharedJobTable {
    Arc::new(Mutex::new(JobTable::with_capacity(capacity)))
}

/// Locks the table. A panic while holding the lock leaves the table in a
/// usable state (every mutation is a single slot write), so poisoning is ignored.
pub fn lock(jobs: &SharedJobTable) -> MutexGuard<'_, JobTable> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct JobTable {
    slots: Vec<Option<Job>>,
    /// Group the main flow is blocked on; never reaped asynchronously.
    foreground: Option<Pid>,
}

impl JobTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            foreground: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers the process group `pgid` in the first free slot.
    ///
    /// If `pgid` is already registered, that job is updated in place instead.
    pub fn register(&mut self, pgid: Pid, name: &str, state: JobState) -> Result<JobId> {
        if let Some(job) = self.find_by_pgid_mut(pgid) {
            job.set_name(name);
            job.set_state(state);
            return Ok(job.id());
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(Error::job_table_full)?;
        let id = JobId(index as u32 + 1);
        self.slots[index] = Some(Job::new(id, pgid, name, state));
        debug!("registered job [{}] pgid {} ({}) as {}", id, pgid, name, state);
        Ok(id)
    }

    /// Frees the slot of `pgid`, returning the job that occupied it.
    pub fn release(&mut self, pgid: Pid) -> Option<Job> {
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(job) if job.pgid() == pgid))?;
        let job = slot.take();
        if self.foreground == Some(pgid) {
            self.foreground = None;
        }
        debug!("released job {:?}", job);
        job
    }

    pub fn find_by_id(&self, id: JobId) -> Option<&Job> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.slots.get(index)?.as_ref()
    }

    pub fn find_by_pgid(&self, pgid: Pid) -> Option<&Job> {
        self.jobs().find(|job| job.pgid() == pgid)
    }

    /// Changes the state of `pgid`'s job, returning the previous state.
    pub fn set_state(&mut self, pgid: Pid, state: JobState) -> Option<JobState> {
        let job = self.find_by_pgid_mut(pgid)?;
        let previous = job.state();
        job.set_state(state);
        Some(previous)
    }

    /// Jobs in slot order.
    pub fn list(&self) -> Vec<Job> {
        self.jobs().cloned().collect()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Marks `pgid` as waited on synchronously by the main flow.
    pub fn mark_foreground(&mut self, pgid: Pid) {
        self.foreground = Some(pgid);
    }

    pub fn clear_foreground(&mut self) {
        self.foreground = None;
    }

    pub fn is_foreground(&self, pgid: Pid) -> bool {
        self.foreground == Some(pgid)
    }

    fn find_by_pgid_mut(&mut self, pgid: Pid) -> Option<&mut Job> {
        self.slots
            .iter_mut()
            .filter_map(Option::as_mut)
            .find(|job| job.pgid() == pgid)
    }
}

impl fmt::Debug for JobTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}/{} jobs", self.len(), self.capacity())?;
        for job in self.jobs() {
            writeln!(f, "{:?}", job)?;
        }

        Ok(())
    }
}
