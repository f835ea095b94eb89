//! Jsh - a job-control shell
//!
//! Runs pipelines of external programs in their own process groups, in the
//! foreground or the background, and tracks them as jobs that can be listed,
//! stopped, continued and killed.

#[macro_use]
mod util;

pub mod core;
mod editor;
pub mod errors;
pub mod shell;

pub use crate::shell::{create_shell, Shell, ShellConfig};
pub use crate::util::JshExitStatusExt;
