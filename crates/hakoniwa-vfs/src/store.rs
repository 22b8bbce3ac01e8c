//! Path-keyed inode store.
//!
//! [`FileStore`] is a flat map from normalized absolute path to [`Inode`].
//! It has no locking of its own; the facade that owns it is responsible for
//! serializing access.

use std::collections::HashMap;

use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::types::{FileType, Times};

/// Default minimum backing capacity for file content.
pub const DEFAULT_MIN_CAPACITY: usize = 1024;

/// Default upper bound on a single file's length (1 GiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 1 << 30;

/// Growable file content.
///
/// Backing capacity starts at a minimum and doubles until a write fits. It
/// never shrinks on write; truncation changes the length only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileBuffer {
    data: Vec<u8>,
}

impl FileBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer holding exactly `bytes`.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self { data: bytes.into() }
    }

    /// Content length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current backing capacity.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// View the content.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy bytes starting at `position` into `out`.
    ///
    /// Returns the number of bytes copied; zero at or past end-of-file.
    pub fn read_at(&self, position: usize, out: &mut [u8]) -> usize {
        if position >= self.data.len() {
            return 0;
        }
        let n = out.len().min(self.data.len() - position);
        out[..n].copy_from_slice(&self.data[position..position + n]);
        n
    }

    /// Write `bytes` at `position`, zero-filling any gap past end-of-file.
    ///
    /// Fails `InvalidArgument` if the write would end beyond `max_len`.
    pub fn write_at(
        &mut self,
        position: usize,
        bytes: &[u8],
        min_capacity: usize,
        max_len: usize,
    ) -> VfsResult<usize> {
        let end = position
            .checked_add(bytes.len())
            .filter(|&end| end <= max_len)
            .ok_or_else(|| {
                VfsError::invalid_argument(format!(
                    "write of {} bytes at {} exceeds maximum file size {}",
                    bytes.len(),
                    position,
                    max_len
                ))
            })?;
        self.reserve_for(end, min_capacity, max_len);
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[position..end].copy_from_slice(bytes);
        Ok(bytes.len())
    }

    /// Set the length to exactly `len`, zero-extending when growing.
    pub fn truncate(&mut self, len: usize) {
        self.data.resize(len, 0);
    }

    fn reserve_for(&mut self, final_len: usize, min_capacity: usize, max_len: usize) {
        let mut n = self.data.capacity();
        if n == 0 {
            n = min_capacity.max(1);
        }
        while n < final_len {
            n = n.checked_mul(2).unwrap_or(final_len);
        }
        // Doubling stops at the size cap; the write itself always fits.
        let n = n.min(max_len).max(final_len);
        if self.data.capacity() < n {
            self.data.reserve_exact(n - self.data.len());
        }
    }
}

/// Entry in the store.
#[derive(Debug, Clone)]
pub enum Inode {
    Directory { times: Times },
    File { content: FileBuffer, times: Times },
    CharDevice { times: Times },
}

impl Inode {
    /// A fresh directory.
    pub fn directory() -> Self {
        Inode::Directory {
            times: Times::default(),
        }
    }

    /// A regular file holding `bytes`.
    pub fn file(bytes: impl Into<Vec<u8>>) -> Self {
        Inode::File {
            content: FileBuffer::from_bytes(bytes),
            times: Times::default(),
        }
    }

    /// A character device.
    pub fn char_device() -> Self {
        Inode::CharDevice {
            times: Times::default(),
        }
    }

    pub fn kind(&self) -> FileType {
        match self {
            Inode::Directory { .. } => FileType::Directory,
            Inode::File { .. } => FileType::File,
            Inode::CharDevice { .. } => FileType::CharDevice,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Inode::Directory { .. })
    }

    /// Content length for regular files, zero otherwise.
    pub fn size(&self) -> u64 {
        match self {
            Inode::File { content, .. } => content.len() as u64,
            _ => 0,
        }
    }

    pub fn times(&self) -> &Times {
        match self {
            Inode::Directory { times } => times,
            Inode::File { times, .. } => times,
            Inode::CharDevice { times } => times,
        }
    }

    pub fn times_mut(&mut self) -> &mut Times {
        match self {
            Inode::Directory { times } => times,
            Inode::File { times, .. } => times,
            Inode::CharDevice { times } => times,
        }
    }
}

/// Flat map of normalized path to inode.
#[derive(Debug, Default)]
pub struct FileStore {
    entries: HashMap<String, Inode>,
}

impl FileStore {
    /// Create a store holding only the root directory.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        entries.insert(path::ROOT.to_string(), Inode::directory());
        Self { entries }
    }

    pub fn get(&self, path: &str) -> Option<&Inode> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Inode> {
        self.entries.get_mut(path)
    }

    /// Insert or replace the entry at `path`.
    pub fn set(&mut self, path: impl Into<String>, inode: Inode) {
        self.entries.insert(path.into(), inode);
    }

    pub fn delete(&mut self, path: &str) -> Option<Inode> {
        self.entries.remove(path)
    }

    pub fn has(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.entries.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// True if any entry lies strictly under `dir`.
    pub fn has_children(&self, dir: &str) -> bool {
        let prefix = path::child_prefix(dir);
        self.entries
            .keys()
            .any(|k| k != dir && k.starts_with(&prefix))
    }

    /// Names of the immediate children of `dir`, sorted.
    pub fn child_paths(&self, dir: &str) -> Vec<String> {
        let prefix = path::child_prefix(dir);
        let mut names: Vec<String> = self
            .entries
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains(path::SEPARATOR))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    /// Move `from` and everything beneath it to `to`, keeping suffixes.
    pub fn rename_dir(&mut self, from: &str, to: &str) {
        let moving: Vec<String> = self
            .entries
            .keys()
            .filter(|k| path::is_within(k, from))
            .cloned()
            .collect();

        let mut moved = Vec::with_capacity(moving.len());
        for key in moving {
            if let Some(inode) = self.entries.remove(&key) {
                let new_path = if from == path::ROOT {
                    path::join(to, &key[1..])
                } else {
                    format!("{}{}", to, &key[from.len()..])
                };
                moved.push((new_path, inode));
            }
        }
        self.entries.extend(moved);
    }

    /// Delete every entry strictly under `dir`. Returns how many were removed.
    pub fn empty_dir(&mut self, dir: &str) -> usize {
        let prefix = path::child_prefix(dir);
        let before = self.entries.len();
        self.entries
            .retain(|k, _| k.as_str() == dir || !k.starts_with(&prefix));
        before - self.entries.len()
    }

    /// Create every missing directory along `path`.
    ///
    /// Fails `AlreadyExists` if a non-directory sits anywhere on the chain.
    pub fn mkdir_all(&mut self, path: &str) -> VfsResult<()> {
        for dir in path::dirs(path) {
            match self.entries.get(&dir) {
                Some(inode) if inode.is_dir() => continue,
                Some(_) => return Err(VfsError::already_exists(dir)),
                None => {
                    self.entries.insert(dir, Inode::directory());
                }
            }
        }
        Ok(())
    }

    /// Require that the parent of `path` exists and is a directory.
    pub fn check_parent(&self, path: &str) -> VfsResult<()> {
        let Some(parent) = path::parent(path) else {
            return Ok(());
        };
        match self.entries.get(parent) {
            Some(inode) if inode.is_dir() => Ok(()),
            Some(_) => Err(VfsError::not_a_directory(parent)),
            None => Err(VfsError::not_found(parent)),
        }
    }
}
