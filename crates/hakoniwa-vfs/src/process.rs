//! Process context: working directory and identity stubs.
//!
//! The sandbox has no users, groups or process tree. Identity queries answer
//! `-1` so guests that print or compare them keep working.

use crate::error::{VfsError, VfsResult};
use crate::path;

/// Default working directory for a fresh session.
pub const DEFAULT_WORKING_DIR: &str = "/root";

/// Identity answer for every id query.
pub const NO_ID: i32 = -1;

#[derive(Debug, Clone)]
pub struct ProcessContext {
    wd: String,
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(DEFAULT_WORKING_DIR)
    }
}

impl ProcessContext {
    pub fn new(wd: &str) -> Self {
        Self {
            wd: path::abs_path(path::ROOT, wd),
        }
    }

    pub fn cwd(&self) -> &str {
        &self.wd
    }

    /// Change directory. Existence is the caller's concern.
    pub fn chdir(&mut self, dir: &str) {
        self.wd = path::abs_path(&self.wd, dir);
    }

    /// Resolve a guest path against the working directory.
    pub fn resolve(&self, p: &str) -> String {
        path::abs_path(&self.wd, p)
    }

    pub fn getuid(&self) -> i32 {
        NO_ID
    }

    pub fn getgid(&self) -> i32 {
        NO_ID
    }

    pub fn geteuid(&self) -> i32 {
        NO_ID
    }

    pub fn getegid(&self) -> i32 {
        NO_ID
    }

    pub fn pid(&self) -> i32 {
        NO_ID
    }

    pub fn ppid(&self) -> i32 {
        NO_ID
    }

    pub fn getgroups(&self) -> VfsResult<Vec<i32>> {
        Err(VfsError::not_implemented("getgroups"))
    }

    pub fn umask(&self, _mask: u32) -> VfsResult<u32> {
        Err(VfsError::not_implemented("umask"))
    }
}
