//! Forks and execs the stages of a pipeline into a single process group.
//!
//! Everything a child needs (argument vectors, the resolved executable,
//! redirection paths, error messages) is prepared before forking, so between
//! `fork` and `exec` the child only makes system calls.

use std::ffi::{CStr, CString};
use std::fs::File;
use std::os::unix::ffi::OsStringExt;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use failure::{Fail, ResultExt};
use log::{debug, warn};
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::unistd::{self, ForkResult, Pid};

use super::terminal::{Terminal, JOB_CONTROL_SIGNALS};
use crate::core::parser::ast::CommandDescriptor;
use crate::core::resolver;
use crate::errors::{Error, ErrorKind, Result};

/// Exit status of a stage whose program cannot be found.
pub const COMMAND_NOT_FOUND_EXIT_STATUS: i32 = 127;
/// Exit status of a stage that failed to set up its redirections or to exec.
pub const STAGE_FAILURE_EXIT_STATUS: i32 = 1;

/// The processes launched for one pipeline.
#[derive(Debug)]
pub struct ProcessGroup {
    pub id: Pid,
    /// In pipeline order; the first is the group leader.
    pub processes: Vec<Pid>,
    pub foreground: bool,
}

impl ProcessGroup {
    pub fn last_process(&self) -> Option<Pid> {
        self.processes.last().cloned()
    }
}

/// One pipeline stage, ready to be handed to a forked child.
#[derive(Debug)]
struct Stage {
    name: String,
    argv: Vec<CString>,
    executable: Option<CString>,
    not_found_message: String,
    stdin: Option<CString>,
    stdout: Option<(CString, bool)>,
    stderr: Option<CString>,
}

impl Stage {
    fn prepare(command: &CommandDescriptor) -> Result<Self> {
        let executable = match resolver::resolve(command.program()) {
            Some(path) => Some(to_cstring(path.into_os_string().into_vec())?),
            None => None,
        };

        Ok(Self {
            name: command.program().to_string(),
            argv: command
                .argv
                .iter()
                .map(|arg| to_cstring(arg.as_bytes()))
                .collect::<Result<_>>()?,
            executable,
            not_found_message: format!("{}\n", Error::command_not_found(command.program())),
            stdin: command.stdin.as_ref().map(|p| to_cstring(p.as_str())).transpose()?,
            stdout: command
                .stdout
                .as_ref()
                .map(|r| to_cstring(r.path.as_str()).map(|path| (path, r.append)))
                .transpose()?,
            stderr: command.stderr.as_ref().map(|p| to_cstring(p.as_str())).transpose()?,
        })
    }
}

fn to_cstring<T: Into<Vec<u8>>>(bytes: T) -> Result<CString> {
    CString::new(bytes).map_err(|_| Error::syntax("\\0"))
}

/// Pipe ends a stage inherits from its neighbours.
#[derive(Clone, Copy, Debug)]
struct StageIo {
    /// Read end of the pipe from the previous stage.
    stdin: Option<RawFd>,
    /// `(read, write)` ends of the pipe to the next stage.
    stdout: Option<(RawFd, RawFd)>,
}

/// Spawns every stage of `commands` into one new process group.
///
/// `terminal` is given the group from inside each child before it execs when
/// the pipeline runs in the foreground. If a pipe or a fork fails, the launch
/// stops there; stages already running are left running.
pub fn spawn_processes(
    commands: &[CommandDescriptor],
    foreground: bool,
    terminal: Option<Terminal>,
) -> Result<ProcessGroup> {
    if commands.is_empty() {
        return Err(Error::empty_pipeline());
    }
    let stages = commands
        .iter()
        .map(Stage::prepare)
        .collect::<Result<Vec<_>>>()?;
    let child_terminal = if foreground { terminal } else { None };

    let mut pgid: Option<Pid> = None;
    let mut processes = Vec::with_capacity(stages.len());
    let mut prev_read: Option<File> = None;
    for (i, stage) in stages.iter().enumerate() {
        let next_pipe = if i + 1 < stages.len() {
            match create_pipe() {
                Ok(pipe) => Some(pipe),
                Err(e) => return Err(abort_launch(e, pgid, child_terminal)),
            }
        } else {
            None
        };

        let io = StageIo {
            stdin: prev_read.as_ref().map(AsRawFd::as_raw_fd),
            stdout: next_pipe
                .as_ref()
                .map(|(read, write)| (read.as_raw_fd(), write.as_raw_fd())),
        };

        match unsafe { unistd::fork() } {
            Ok(ForkResult::Child) => {
                let code = exec_stage(stage, pgid, child_terminal, io);
                unsafe { libc::_exit(code) }
            }
            Ok(ForkResult::Parent { child }) => {
                // Join the group from the parent too, so that nothing the
                // parent does next can observe the child outside of it.
                let group = *pgid.get_or_insert(child);
                let temp_result = unistd::setpgid(child, group);
                log_if_err!(temp_result, "failed to set pgid ({}) for pid ({})", group, child);
                debug!("spawned {} ({}) in process group {}", stage.name, child, group);
                processes.push(child);

                // Keep only the read end for the next stage; closes the rest.
                prev_read = next_pipe.map(|(read, _write)| read);
            }
            Err(e) => {
                let e = Error::from(e.context(ErrorKind::Nix));
                return Err(abort_launch(e, pgid, child_terminal));
            }
        }
    }

    Ok(ProcessGroup {
        id: pgid.ok_or_else(Error::empty_pipeline)?,
        processes,
        foreground,
    })
}

/// A child may already have taken the terminal; take it back before reporting.
fn abort_launch(e: Error, pgid: Option<Pid>, terminal: Option<Terminal>) -> Error {
    warn!("aborting pipeline launch (process group {:?}): {}", pgid, e);
    if let (Some(_), Some(terminal)) = (pgid, terminal) {
        let temp_result = unistd::tcsetpgrp(terminal.fd(), terminal.shell_pgid());
        log_if_err!(temp_result, "failed to take back the terminal");
    }
    e
}

/// Runs in the forked child. Only returns if the stage could not exec, with
/// the status the child should exit with.
fn exec_stage(stage: &Stage, pgid: Option<Pid>, terminal: Option<Terminal>, io: StageIo) -> i32 {
    let pid = unistd::getpid();
    let pgid = pgid.unwrap_or(pid);
    let _ = unistd::setpgid(pid, pgid);

    // Still ignoring SIGTTOU at this point, so this cannot stop us.
    if let Some(terminal) = terminal {
        let _ = unistd::tcsetpgrp(terminal.fd(), pgid);
    }

    for &sig in JOB_CONTROL_SIGNALS.iter().chain(&[Signal::SIGCHLD]) {
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }

    if let Some(read) = io.stdin {
        if let Err(e) = move_fd(read, libc::STDIN_FILENO) {
            return report(&[b"pipe"], e);
        }
    }
    if let Some((read, write)) = io.stdout {
        if let Err(e) = move_fd(write, libc::STDOUT_FILENO) {
            return report(&[b"pipe"], e);
        }
        let _ = unistd::close(read);
    }

    // Checked before redirections so the message reaches the shell's stderr.
    let executable = match stage.executable {
        Some(ref executable) => executable,
        None => {
            write_stderr(&[stage.not_found_message.as_bytes()]);
            return COMMAND_NOT_FOUND_EXIT_STATUS;
        }
    };

    if let Some(ref path) = stage.stdin {
        if let Err(e) = redirect(path, OFlag::O_RDONLY, libc::STDIN_FILENO) {
            return report(&[path.to_bytes()], e);
        }
    }
    if let Some((ref path, append)) = stage.stdout {
        let mode = if append { OFlag::O_APPEND } else { OFlag::O_TRUNC };
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | mode;
        if let Err(e) = redirect(path, flags, libc::STDOUT_FILENO) {
            return report(&[path.to_bytes()], e);
        }
    }
    if let Some(ref path) = stage.stderr {
        let flags = OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC;
        if let Err(e) = redirect(path, flags, libc::STDERR_FILENO) {
            return report(&[path.to_bytes()], e);
        }
    }

    let e = match unistd::execv(executable, &stage.argv) {
        Ok(never) => match never {},
        Err(e) => e,
    };
    report(&[stage.name.as_bytes()], e)
}

/// Makes `fd` available as `target` and closes the original.
fn move_fd(fd: RawFd, target: RawFd) -> nix::Result<()> {
    if fd != target {
        unistd::dup2(fd, target)?;
        unistd::close(fd)?;
    }
    Ok(())
}

fn redirect(path: &CStr, flags: OFlag, target: RawFd) -> nix::Result<()> {
    let fd = fcntl::open(path, flags, Mode::from_bits_truncate(0o644))?;
    move_fd(fd, target)
}

fn report(context: &[&[u8]], e: Errno) -> i32 {
    write_stderr(&[b"jsh: "]);
    write_stderr(context);
    write_stderr(&[b": ", e.desc().as_bytes(), b"\n"]);
    STAGE_FAILURE_EXIT_STATUS
}

fn write_stderr(parts: &[&[u8]]) {
    for part in parts {
        let _ = unistd::write(libc::STDERR_FILENO, part);
    }
}

/// Wraps `unistd::pipe()` to return RAII structs instead of raw, owning file descriptors
/// Returns (`read_end_pipe`, `write_end_pipe`)
fn create_pipe() -> Result<(File, File)> {
    // IMPORTANT: immediately pass the RawFds returned by unistd::pipe()
    // into RAII structs (File). If the function returns before they are moved
    // into RAII structs, the fds could be leaked.
    let (read_end_pipe, write_end_pipe) = unistd::pipe().context(ErrorKind::Nix)?;
    unsafe {
        Ok((
            File::from_raw_fd(read_end_pipe),
            File::from_raw_fd(write_end_pipe),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser;

    #[test]
    fn test_stage_preparation() {
        let commands = parser::parse("sh -c 'exit 3' > out.txt 2> err.txt < in.txt").unwrap();
        let stage = Stage::prepare(&commands[0]).unwrap();
        assert_eq!(stage.name, "sh");
        assert_eq!(stage.argv.len(), 3);
        assert_eq!(stage.argv[2].to_str().unwrap(), "exit 3");
        assert!(stage.executable.is_some());
        assert_eq!(stage.stdin.as_ref().unwrap().to_str().unwrap(), "in.txt");
        let (stdout, append) = stage.stdout.as_ref().unwrap();
        assert_eq!((stdout.to_str().unwrap(), *append), ("out.txt", false));
        assert_eq!(stage.stderr.as_ref().unwrap().to_str().unwrap(), "err.txt");
    }

    #[test]
    fn test_unresolved_stage_keeps_message() {
        let commands = parser::parse("jsh-definitely-missing arg").unwrap();
        let stage = Stage::prepare(&commands[0]).unwrap();
        assert!(stage.executable.is_none());
        assert_eq!(
            stage.not_found_message,
            "jsh-definitely-missing: command not found\n"
        );
    }

    #[test]
    fn test_stages_share_one_new_process_group() {
        use nix::sys::wait::{self, WaitStatus};

        let commands = parser::parse("sleep 1 | sleep 1 | sleep 1").unwrap();
        let group = spawn_processes(&commands, false, None).unwrap();
        assert_eq!(group.processes.len(), 3);
        assert_eq!(group.processes[0], group.id);
        assert_ne!(group.id, unistd::getpgrp());
        for &pid in &group.processes {
            assert_eq!(unistd::getpgid(Some(pid)).unwrap(), group.id);
        }

        let mut reaped = 0;
        loop {
            match wait::waitpid(Pid::from_raw(-group.id.as_raw()), None) {
                Ok(WaitStatus::Exited(_, 0)) => reaped += 1,
                Ok(other) => panic!("unexpected status {:?}", other),
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => panic!("waitpid failed: {}", e),
            }
        }
        assert_eq!(reaped, 3);
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        let err = spawn_processes(&[], true, None).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EmptyPipeline);
    }

    #[test]
    fn test_nul_bytes_are_rejected() {
        let command = CommandDescriptor {
            argv: vec!["echo".to_string(), "a\0b".to_string()],
            stdin: None,
            stdout: None,
            stderr: None,
        };
        let err = Stage::prepare(&command).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::Syntax("\\0".to_string()));
    }
}
