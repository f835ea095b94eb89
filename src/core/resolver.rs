//! Command path resolution.

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use nix::unistd::{self, AccessFlags};

/// Maps `name` to an executable path.
///
/// A name containing `/` is used as-is and only checked for execute permission;
/// otherwise each directory of `PATH` is searched in order.
pub fn resolve(name: &str) -> Option<PathBuf> {
    let path_var = env::var_os("PATH");
    resolve_in(name, path_var.as_ref().map(|p| p.as_os_str()))
}

pub fn resolve_in(name: &str, path_var: Option<&OsStr>) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if name.contains('/') {
        let path = Path::new(name);
        return if is_executable(path) {
            Some(path.to_path_buf())
        } else {
            None
        };
    }

    env::split_paths(path_var?)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && unistd::access(path, AccessFlags::X_OK).is_ok()
}
