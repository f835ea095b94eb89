use std::io;
use std::os::unix::io::{AsRawFd, RawFd};

/// The shell's controlling terminal is whatever it reads commands from.
pub fn get_terminal() -> RawFd {
    io::stdin().as_raw_fd()
}
