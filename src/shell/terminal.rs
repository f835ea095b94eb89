//! Ownership of the controlling terminal.
//!
//! The shell owns the terminal between commands. A job owns it only while
//! the shell is blocked waiting on that job; `TerminalState` hands it over and
//! takes it back when dropped, whatever the outcome of the wait.

use std::os::unix::io::RawFd;

use failure::ResultExt;
use log::{debug, info};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::termios::{self, Termios};
use nix::unistd::{self, Pid};

use crate::errors::{ErrorKind, Result};
use crate::util;

/// Signals the interactive shell ignores so that terminal keystrokes reach
/// the foreground job instead. Children restore their default dispositions.
pub const JOB_CONTROL_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// The controlling terminal and the process group the shell runs in.
#[derive(Clone, Copy, Debug)]
pub struct Terminal {
    fd: RawFd,
    shell_pgid: Pid,
}

impl Terminal {
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }
}

/// Makes the shell the foreground process group of its terminal.
///
/// Must be called once, before any pipeline runs. An error means the shell
/// could not get its own process group and must not continue interactively.
pub fn initialize_job_control() -> Result<Terminal> {
    let shell_terminal = util::unix::get_terminal();

    // Loop until the shell is in the foreground
    loop {
        let shell_pgid = unistd::getpgrp();
        if unistd::tcgetpgrp(shell_terminal).context(ErrorKind::Nix)? == shell_pgid {
            break;
        }
        signal::killpg(shell_pgid, Signal::SIGTTIN).context(ErrorKind::Nix)?;
    }

    // Ignore interactive and job-control signals
    for &sig in JOB_CONTROL_SIGNALS.iter() {
        let result = unsafe { signal::signal(sig, SigHandler::SigIgn) };
        result.context(ErrorKind::Nix)?;
    }

    // Put ourselves in our own process group. A session leader already leads
    // its group and is not allowed to call setpgid.
    let shell_pgid = Pid::this();
    if unistd::getpgrp() != shell_pgid {
        unistd::setpgid(shell_pgid, shell_pgid).context(ErrorKind::Nix)?;
    }

    // Grab control of the terminal
    unistd::tcsetpgrp(shell_terminal, shell_pgid).context(ErrorKind::Nix)?;

    info!("job control initialized, shell pgid {}", shell_pgid);
    Ok(Terminal {
        fd: shell_terminal,
        shell_pgid,
    })
}

/// RAII struct to encapsulate manipulating terminal state.
pub struct TerminalState {
    terminal: Terminal,
    prev_tmodes: Option<Termios>,
}

impl TerminalState {
    /// Gives the terminal to `new_pgid`, saving the shell's terminal modes.
    pub fn new(terminal: Terminal, new_pgid: Pid) -> TerminalState {
        debug!("setting terminal process group to {}", new_pgid);
        let prev_tmodes = termios::tcgetattr(terminal.fd()).ok();
        let temp_result = unistd::tcsetpgrp(terminal.fd(), new_pgid);
        log_if_err!(temp_result, "failed to give terminal to {}", new_pgid);
        TerminalState {
            terminal,
            prev_tmodes,
        }
    }
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        debug!("putting shell back into foreground and restoring shell's terminal modes");
        let temp_result = unistd::tcsetpgrp(self.terminal.fd(), self.terminal.shell_pgid());
        log_if_err!(temp_result, "failed to take back the terminal");
        if let Some(ref prev_tmodes) = self.prev_tmodes {
            let temp_result =
                termios::tcsetattr(self.terminal.fd(), termios::SetArg::TCSADRAIN, prev_tmodes);
            log_if_err!(temp_result, "error restoring terminal configuration for shell");
        }
    }
}
