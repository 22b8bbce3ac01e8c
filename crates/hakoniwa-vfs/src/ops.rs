//! Guest operations trait.
//!
//! The operation set a guest bridge calls, shaped for message passing:
//! buffers are owned, reads return their bytes and every call resolves to a
//! [`VfsResult`]. Relative paths resolve against the session's working
//! directory.

use async_trait::async_trait;

use crate::error::VfsResult;
use crate::types::{OpenFlags, Stat};

#[async_trait]
pub trait GuestFs: Send + Sync {
    // ========================================================================
    // Descriptors
    // ========================================================================

    /// Open a path and return a fresh descriptor.
    async fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<i32>;

    /// Release a descriptor. Standard streams ignore close.
    async fn close(&self, fd: i32) -> VfsResult<()>;

    /// Read up to `length` bytes, at `position` if given, else at the cursor.
    ///
    /// Returns fewer bytes at end-of-file and none past it.
    async fn read(&self, fd: i32, length: usize, position: Option<u64>) -> VfsResult<Vec<u8>>;

    /// Write `data`, at `position` if given, else at the cursor.
    async fn write(&self, fd: i32, data: &[u8], position: Option<u64>) -> VfsResult<usize>;

    async fn fsync(&self, fd: i32) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    async fn stat(&self, path: &str) -> VfsResult<Stat>;

    async fn lstat(&self, path: &str) -> VfsResult<Stat>;

    async fn fstat(&self, fd: i32) -> VfsResult<Stat>;

    /// Set access and modification times, in seconds.
    async fn utimes(&self, path: &str, atime: f64, mtime: f64) -> VfsResult<()>;

    async fn truncate(&self, path: &str, len: u64) -> VfsResult<()>;

    async fn ftruncate(&self, fd: i32, len: u64) -> VfsResult<()>;

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()>;

    async fn fchmod(&self, fd: i32, mode: u32) -> VfsResult<()>;

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()>;

    async fn fchown(&self, fd: i32, uid: u32, gid: u32) -> VfsResult<()>;

    async fn lchown(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()>;

    // ========================================================================
    // Directory tree
    // ========================================================================

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()>;

    async fn rmdir(&self, path: &str) -> VfsResult<()>;

    async fn unlink(&self, path: &str) -> VfsResult<()>;

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Child names of a directory, sorted.
    async fn readdir(&self, path: &str) -> VfsResult<Vec<String>>;

    async fn link(&self, existing: &str, new: &str) -> VfsResult<()>;

    async fn symlink(&self, target: &str, link: &str) -> VfsResult<()>;

    async fn readlink(&self, path: &str) -> VfsResult<String>;

    // ========================================================================
    // Process
    // ========================================================================

    async fn cwd(&self) -> VfsResult<String>;

    async fn chdir(&self, dir: &str) -> VfsResult<()>;

    async fn getuid(&self) -> VfsResult<i32>;

    async fn getgid(&self) -> VfsResult<i32>;

    async fn geteuid(&self) -> VfsResult<i32>;

    async fn getegid(&self) -> VfsResult<i32>;

    async fn getgroups(&self) -> VfsResult<Vec<i32>>;

    async fn pid(&self) -> VfsResult<i32>;

    async fn ppid(&self) -> VfsResult<i32>;

    async fn umask(&self, mask: u32) -> VfsResult<u32>;

    // ========================================================================
    // Convenience methods (default implementations)
    // ========================================================================

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Read entire file contents through a temporary descriptor.
    async fn read_all(&self, path: &str) -> VfsResult<Vec<u8>> {
        let size = self.stat(path).await?.size;
        let fd = self.open(path, OpenFlags::read(), 0).await?;
        let data = self.read(fd, size as usize, Some(0)).await;
        self.close(fd).await?;
        data
    }

    /// Create or truncate a file and write `data` as its whole content.
    async fn write_all(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let fd = self.open(path, OpenFlags::create_truncate(), 0o644).await?;
        let written = self.write(fd, data, Some(0)).await;
        self.close(fd).await?;
        written.map(|_| ())
    }
}
