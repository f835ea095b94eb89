use std::fmt;

use nix::unistd::Pid;

/// Small positive integer the user refers to a job by, e.g. `%1`.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct JobId(pub u32);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobState {
    Running,
    Stopped,
    Done,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            JobState::Running => write!(f, "Running"),
            JobState::Stopped => write!(f, "Stopped"),
            JobState::Done => write!(f, "Done"),
        }
    }
}

/// The shell's handle on one launched pipeline's process group.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    id: JobId,
    pgid: Pid,
    name: String,
    state: JobState,
}

impl Job {
    pub fn new(id: JobId, pgid: Pid, name: &str, state: JobState) -> Self {
        Self {
            id,
            pgid,
            name: name.to_string(),
            state,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// The line printed when a job is stopped, by a foreground wait or asynchronously.
    pub fn stop_notice(&self) -> String {
        format!("\n[{}]+ Stopped    {}", self.id, self.name)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {:<10} {}", self.id, self.state.to_string(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let job = Job::new(JobId(2), Pid::from_raw(4242), "sleep", JobState::Stopped);
        assert_eq!(job.to_string(), "[2] Stopped    sleep");
        assert_eq!(job.stop_notice(), "\n[2]+ Stopped    sleep");
    }
}
