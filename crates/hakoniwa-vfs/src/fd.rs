//! Descriptor table.
//!
//! Handles are issued from a monotonic counter starting well above the
//! three standard streams and are never reused within a session.

use std::collections::HashMap;

use crate::error::{VfsError, VfsResult};

pub const STDIN: i32 = 0;
pub const STDOUT: i32 = 1;
pub const STDERR: i32 = 2;

/// First handle issued by a fresh table.
pub const DEFAULT_DESCRIPTOR_BASE: i32 = 1000;

/// True for the three standard stream handles.
pub fn is_standard(fd: i32) -> bool {
    (STDIN..=STDERR).contains(&fd)
}

/// An open descriptor: owning path and cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub fd: i32,
    pub path: String,
    pub position: u64,
    char_device: bool,
}

impl Descriptor {
    pub fn is_char_device(&self) -> bool {
        self.char_device
    }

    /// Move the cursor forward by `n`. Character devices stay put.
    pub fn advance(&mut self, n: usize) {
        if !self.char_device {
            self.position += n as u64;
        }
    }
}

#[derive(Debug)]
pub struct DescriptorTable {
    entries: HashMap<i32, Descriptor>,
    next: i32,
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new(DEFAULT_DESCRIPTOR_BASE)
    }
}

impl DescriptorTable {
    /// Create a table issuing handles from `base` upward.
    ///
    /// Bases inside the standard-stream range are lifted past it.
    pub fn new(base: i32) -> Self {
        Self {
            entries: HashMap::new(),
            next: base.max(STDERR + 1),
        }
    }

    /// Register a new descriptor and return its handle.
    pub fn open(&mut self, path: impl Into<String>, position: u64, char_device: bool) -> VfsResult<i32> {
        let fd = self.next;
        self.next = fd
            .checked_add(1)
            .ok_or_else(|| VfsError::generic("descriptor space exhausted"))?;
        self.entries.insert(
            fd,
            Descriptor {
                fd,
                path: path.into(),
                position,
                char_device,
            },
        );
        Ok(fd)
    }

    pub fn get(&self, fd: i32) -> VfsResult<&Descriptor> {
        self.entries.get(&fd).ok_or(VfsError::BadDescriptor(fd))
    }

    pub fn get_mut(&mut self, fd: i32) -> VfsResult<&mut Descriptor> {
        self.entries.get_mut(&fd).ok_or(VfsError::BadDescriptor(fd))
    }

    pub fn close(&mut self, fd: i32) -> VfsResult<Descriptor> {
        self.entries.remove(&fd).ok_or(VfsError::BadDescriptor(fd))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles currently open on `path`.
    pub fn open_on(&self, path: &str) -> Vec<i32> {
        let mut fds: Vec<i32> = self
            .entries
            .values()
            .filter(|d| d.path == path)
            .map(|d| d.fd)
            .collect();
        fds.sort_unstable();
        fds
    }
}
