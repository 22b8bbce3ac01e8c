//! The VFS facade.
//!
//! [`Vfs`] composes the store, descriptor table, process context and host
//! streams into the syscall-shaped operation set a guest bridge consumes.
//! Every method takes the facade by reference and completes synchronously;
//! serializing calls is the owner's job (see [`crate::session::Session`]).
//!
//! ## Descriptor policy
//!
//! Descriptors are bound to a path, not to an inode. After the path is
//! unlinked or renamed away, I/O through an existing descriptor fails
//! `NotFound`; if something is later created at that path, the descriptor
//! sees it. Closing always succeeds.

use std::ops::Range;

use crate::config::SessionConfig;
use crate::error::{VfsError, VfsResult};
use crate::fd::{self, DescriptorTable, STDERR, STDIN, STDOUT};
use crate::host::{HostIo, NullHost};
use crate::path;
use crate::process::ProcessContext;
use crate::seed::{self, SeedFiles};
use crate::store::{FileBuffer, FileStore, Inode};
use crate::types::{FileType, OpenFlags, Stat, Times};

pub struct Vfs {
    files: FileStore,
    fds: DescriptorTable,
    process: ProcessContext,
    host: Box<dyn HostIo>,
    min_capacity: usize,
    max_file_size: usize,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("entries", &self.files.len())
            .field("open_fds", &self.fds.len())
            .field("cwd", &self.process.cwd())
            .finish()
    }
}

impl Vfs {
    /// Create a facade holding the configured base tree.
    pub fn new(config: &SessionConfig) -> VfsResult<Self> {
        let mut files = FileStore::new();
        seed::apply_base(&mut files, config)?;
        Ok(Self {
            files,
            fds: DescriptorTable::new(config.descriptor_base),
            process: ProcessContext::new(&config.working_dir),
            host: Box::new(NullHost),
            min_capacity: config.min_capacity,
            max_file_size: config.max_file_size,
        })
    }

    // ========================================================================
    // Environment
    // ========================================================================

    pub fn store(&self) -> &FileStore {
        &self.files
    }

    pub fn descriptors(&self) -> &DescriptorTable {
        &self.fds
    }

    pub fn process(&self) -> &ProcessContext {
        &self.process
    }

    /// Install new standard streams, returning the previous ones.
    pub fn set_host(&mut self, host: Box<dyn HostIo>) -> Box<dyn HostIo> {
        std::mem::replace(&mut self.host, host)
    }

    /// Bulk-seed files (absolute paths), creating parents.
    pub fn seed(&mut self, files: &SeedFiles) -> VfsResult<usize> {
        let n = seed::apply(&mut self.files, files)?;
        tracing::info!(files = n, entries = self.files.len(), "seeded");
        Ok(n)
    }

    /// Materialize a working directory and write a flat name → content map
    /// into it.
    ///
    /// Names are single path components; anything that would land outside
    /// `dir` fails `InvalidArgument` before the tree is touched.
    pub fn provision(&mut self, dir: &str, files: &SeedFiles) -> VfsResult<String> {
        let dir = self.process.resolve(dir);
        if let Some(name) = files.keys().find(|name| !is_plain_name(name)) {
            return Err(VfsError::invalid_argument(format!(
                "run file name must be a single component: {:?}",
                name
            )));
        }
        self.files.mkdir_all(&dir)?;
        for (name, content) in files {
            let target = path::abs_path(&dir, name);
            if self.files.get(&target).is_some_and(Inode::is_dir) {
                return Err(VfsError::is_a_directory(target));
            }
            self.files.set(target, Inode::file(content.clone()));
        }
        tracing::debug!(dir = %dir, files = files.len(), "provisioned");
        Ok(dir)
    }

    /// Delete everything beneath a directory, keeping the directory itself.
    pub fn empty_dir(&mut self, dir: &str) -> VfsResult<usize> {
        let dir = self.process.resolve(dir);
        match self.files.get(&dir) {
            Some(inode) if inode.is_dir() => {}
            Some(_) => return Err(VfsError::not_a_directory(dir)),
            None => return Err(VfsError::not_found(dir)),
        }
        let removed = self.files.empty_dir(&dir);
        tracing::debug!(dir = %dir, removed, "emptied");
        Ok(removed)
    }

    /// Whole content of a file.
    pub fn read_file(&self, p: &str) -> VfsResult<Vec<u8>> {
        let p = self.process.resolve(p);
        match self.files.get(&p) {
            Some(Inode::File { content, .. }) => Ok(content.as_bytes().to_vec()),
            Some(Inode::CharDevice { .. }) => Ok(Vec::new()),
            Some(Inode::Directory { .. }) => Err(VfsError::is_a_directory(p)),
            None => Err(VfsError::not_found(p)),
        }
    }

    // ========================================================================
    // Process
    // ========================================================================

    pub fn cwd(&self) -> &str {
        self.process.cwd()
    }

    /// Change the working directory to an existing directory.
    pub fn chdir(&mut self, dir: &str) -> VfsResult<()> {
        let target = self.process.resolve(dir);
        match self.files.get(&target) {
            Some(inode) if inode.is_dir() => {
                self.process.chdir(&target);
                Ok(())
            }
            Some(_) => Err(VfsError::not_a_directory(target)),
            None => Err(VfsError::not_found(target)),
        }
    }

    // ========================================================================
    // Descriptors
    // ========================================================================

    pub fn open(&mut self, p: &str, flags: OpenFlags, _mode: u32) -> VfsResult<i32> {
        let p = self.process.resolve(p);

        match self.files.get(&p) {
            Some(_) if flags.create && flags.exclusive => {
                return Err(VfsError::already_exists(p));
            }
            Some(_) => {}
            None if flags.create => {
                self.files.check_parent(&p)?;
                self.files.set(p.clone(), Inode::file(Vec::new()));
            }
            None => return Err(VfsError::not_found(p)),
        }

        if flags.truncate {
            match self.files.get_mut(&p) {
                Some(Inode::File { content, .. }) => *content = FileBuffer::new(),
                Some(Inode::Directory { .. }) => return Err(VfsError::is_a_directory(p)),
                _ => {}
            }
        }

        let (position, char_device) = match self.files.get(&p) {
            Some(Inode::File { content, .. }) if flags.append => (content.len() as u64, false),
            Some(Inode::CharDevice { .. }) => (0, true),
            _ => (0, false),
        };
        let fd = self.fds.open(p.clone(), position, char_device)?;
        tracing::debug!(fd, path = %p, flags = flags.bits(), "open");
        Ok(fd)
    }

    pub fn close(&mut self, fd: i32) -> VfsResult<()> {
        if fd::is_standard(fd) {
            return Ok(());
        }
        let desc = self.fds.close(fd)?;
        tracing::debug!(fd, path = %desc.path, "close");
        Ok(())
    }

    /// Read up to `length` bytes into `buf[offset..]`.
    ///
    /// With `position` the read happens there and the cursor is untouched;
    /// otherwise it happens at the cursor, which then advances.
    pub fn read(
        &mut self,
        fd: i32,
        buf: &mut [u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> VfsResult<usize> {
        let window = io_window(buf.len(), offset, length)?;
        let out = &mut buf[window];

        match fd {
            STDIN => return self.host.read_stdin(out),
            STDOUT | STDERR => return Err(VfsError::BadDescriptor(fd)),
            _ => {}
        }

        let desc = self.fds.get(fd)?;
        let at = to_offset(position.unwrap_or(desc.position))?;
        let n = match self.files.get(&desc.path) {
            Some(Inode::File { content, .. }) => content.read_at(at, out),
            Some(Inode::CharDevice { .. }) => 0,
            Some(Inode::Directory { .. }) => return Err(VfsError::is_a_directory(&desc.path)),
            None => return Err(VfsError::not_found(&desc.path)),
        };

        if position.is_none() {
            self.fds.get_mut(fd)?.advance(n);
        }
        Ok(n)
    }

    /// Read up to `length` bytes into a fresh buffer.
    ///
    /// The buffer is sized to what the source can actually return, so a
    /// huge `length` never allocates more than the file holds.
    pub fn read_to_vec(
        &mut self,
        fd: i32,
        length: usize,
        position: Option<u64>,
    ) -> VfsResult<Vec<u8>> {
        let available = match fd {
            STDIN => STDIN_CHUNK,
            STDOUT | STDERR => return Err(VfsError::BadDescriptor(fd)),
            _ => {
                let desc = self.fds.get(fd)?;
                let at = to_offset(position.unwrap_or(desc.position))?;
                match self.files.get(&desc.path) {
                    Some(Inode::File { content, .. }) => content.len().saturating_sub(at),
                    _ => 0,
                }
            }
        };
        let len = length.min(available);
        let mut buf = vec![0u8; len];
        let n = self.read(fd, &mut buf, 0, len, position)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Write `length` bytes from `buf[offset..]`.
    ///
    /// Cursor handling mirrors [`Vfs::read`]. Standard output and error go
    /// to the host; the null device swallows everything.
    pub fn write(
        &mut self,
        fd: i32,
        buf: &[u8],
        offset: usize,
        length: usize,
        position: Option<u64>,
    ) -> VfsResult<usize> {
        let data = &buf[io_window(buf.len(), offset, length)?];

        match fd {
            STDOUT => {
                self.host.write_stdout(data)?;
                return Ok(data.len());
            }
            STDERR => {
                self.host.write_stderr(data)?;
                return Ok(data.len());
            }
            STDIN => return Err(VfsError::BadDescriptor(fd)),
            _ => {}
        }

        let desc = self.fds.get(fd)?;
        let at = to_offset(position.unwrap_or(desc.position))?;
        let n = match self.files.get_mut(&desc.path) {
            Some(Inode::File { content, .. }) => {
                content.write_at(at, data, self.min_capacity, self.max_file_size)?
            }
            Some(Inode::CharDevice { .. }) => data.len(),
            Some(Inode::Directory { .. }) => return Err(VfsError::is_a_directory(&desc.path)),
            None => return Err(VfsError::not_found(&desc.path)),
        };

        if position.is_none() {
            self.fds.get_mut(fd)?.advance(n);
        }
        Ok(n)
    }

    pub fn fsync(&self, fd: i32) -> VfsResult<()> {
        if !fd::is_standard(fd) {
            self.fds.get(fd)?;
        }
        Ok(())
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    pub fn stat(&self, p: &str) -> VfsResult<Stat> {
        let p = self.process.resolve(p);
        self.stat_abs(&p)
    }

    /// Same as [`Vfs::stat`]; the sandbox has no links to not follow.
    pub fn lstat(&self, p: &str) -> VfsResult<Stat> {
        self.stat(p)
    }

    pub fn fstat(&self, fd: i32) -> VfsResult<Stat> {
        if fd::is_standard(fd) {
            return Ok(Stat::new(FileType::CharDevice, 0, &Times::default()));
        }
        let desc = self.fds.get(fd)?;
        self.stat_abs(&desc.path)
    }

    fn stat_abs(&self, p: &str) -> VfsResult<Stat> {
        let inode = self.files.get(p).ok_or_else(|| VfsError::not_found(p))?;
        Ok(Stat::new(inode.kind(), inode.size(), inode.times()))
    }

    /// Overwrite access and modification times (seconds) verbatim.
    pub fn utimes(&mut self, p: &str, atime: f64, mtime: f64) -> VfsResult<()> {
        let p = self.process.resolve(p);
        let inode = self
            .files
            .get_mut(&p)
            .ok_or_else(|| VfsError::not_found(&p))?;
        let times = inode.times_mut();
        times.atime = Some(atime);
        times.mtime = Some(mtime);
        Ok(())
    }

    pub fn truncate(&mut self, p: &str, len: u64) -> VfsResult<()> {
        let p = self.process.resolve(p);
        self.truncate_abs(&p, len)
    }

    pub fn ftruncate(&mut self, fd: i32, len: u64) -> VfsResult<()> {
        if fd::is_standard(fd) {
            return Ok(());
        }
        let p = self.fds.get(fd)?.path.clone();
        self.truncate_abs(&p, len)
    }

    fn truncate_abs(&mut self, p: &str, len: u64) -> VfsResult<()> {
        let len = to_offset(len)?;
        if len > self.max_file_size {
            return Err(VfsError::invalid_argument(format!(
                "length {} exceeds maximum file size {}",
                len, self.max_file_size
            )));
        }
        match self.files.get_mut(p) {
            Some(Inode::File { content, .. }) => {
                content.truncate(len);
                Ok(())
            }
            Some(Inode::CharDevice { .. }) => Ok(()),
            Some(Inode::Directory { .. }) => Err(VfsError::is_a_directory(p)),
            None => Err(VfsError::not_found(p)),
        }
    }

    // ========================================================================
    // Directory tree
    // ========================================================================

    pub fn mkdir(&mut self, p: &str, _mode: u32) -> VfsResult<()> {
        let p = self.process.resolve(p);
        let chain = path::dirs(&p);
        if let Some((_, parents)) = chain.split_last() {
            for dir in parents {
                match self.files.get(dir) {
                    Some(inode) if inode.is_dir() => {}
                    Some(_) => return Err(VfsError::already_exists(dir)),
                    None => return Err(VfsError::not_found(dir)),
                }
            }
        }
        if self.files.has(&p) {
            return Err(VfsError::already_exists(p));
        }
        tracing::debug!(path = %p, "mkdir");
        self.files.set(p, Inode::directory());
        Ok(())
    }

    pub fn rmdir(&mut self, p: &str) -> VfsResult<()> {
        let p = self.process.resolve(p);
        if p == path::ROOT {
            return Err(VfsError::invalid_argument("cannot remove root"));
        }
        match self.files.get(&p) {
            None => return Err(VfsError::not_found(p)),
            Some(inode) if !inode.is_dir() => return Err(VfsError::not_a_directory(p)),
            Some(_) => {}
        }
        if self.files.has_children(&p) {
            return Err(VfsError::not_empty(p));
        }
        tracing::debug!(path = %p, "rmdir");
        self.files.delete(&p);
        Ok(())
    }

    pub fn unlink(&mut self, p: &str) -> VfsResult<()> {
        let p = self.process.resolve(p);
        match self.files.get(&p) {
            None => return Err(VfsError::not_found(p)),
            Some(inode) if inode.is_dir() => return Err(VfsError::is_a_directory(p)),
            Some(_) => {}
        }
        let open = self.fds.open_on(&p);
        tracing::debug!(path = %p, ?open, "unlink");
        self.files.delete(&p);
        Ok(())
    }

    /// Rename a file or a whole directory subtree.
    pub fn rename(&mut self, from: &str, to: &str) -> VfsResult<()> {
        let from = self.process.resolve(from);
        let to = self.process.resolve(to);

        let from_is_dir = match self.files.get(&from) {
            Some(inode) => inode.is_dir(),
            None => return Err(VfsError::not_found(from)),
        };
        if from == to {
            return Ok(());
        }
        if from == path::ROOT {
            return Err(VfsError::invalid_argument("cannot rename root"));
        }
        if from_is_dir && path::is_within(&to, &from) {
            return Err(VfsError::invalid_argument(format!(
                "cannot move {} into itself",
                from
            )));
        }
        self.files.check_parent(&to)?;

        let to_is_dir = self.files.get(&to).map(Inode::is_dir);
        if from_is_dir {
            match to_is_dir {
                None => {}
                Some(false) => return Err(VfsError::not_a_directory(to)),
                Some(true) if self.files.has_children(&to) => {
                    return Err(VfsError::not_empty(to));
                }
                Some(true) => {
                    self.files.delete(&to);
                }
            }
            self.files.rename_dir(&from, &to);
        } else {
            if to_is_dir == Some(true) {
                return Err(VfsError::is_a_directory(to));
            }
            let inode = self
                .files
                .delete(&from)
                .ok_or_else(|| VfsError::not_found(&from))?;
            self.files.set(to.clone(), inode);
        }
        tracing::debug!(from = %from, to = %to, "rename");
        Ok(())
    }

    /// Names of the immediate children of a directory, sorted.
    pub fn readdir(&self, p: &str) -> VfsResult<Vec<String>> {
        let p = self.process.resolve(p);
        match self.files.get(&p) {
            Some(inode) if inode.is_dir() => Ok(self.files.child_paths(&p)),
            Some(_) => Err(VfsError::not_a_directory(p)),
            None => Err(VfsError::not_found(p)),
        }
    }

    // ========================================================================
    // Accepted no-ops and unsupported calls
    // ========================================================================

    pub fn chmod(&mut self, p: &str, mode: u32) -> VfsResult<()> {
        tracing::trace!(path = p, mode, "chmod ignored");
        Ok(())
    }

    pub fn fchmod(&mut self, fd: i32, mode: u32) -> VfsResult<()> {
        tracing::trace!(fd, mode, "fchmod ignored");
        Ok(())
    }

    pub fn chown(&mut self, p: &str, uid: u32, gid: u32) -> VfsResult<()> {
        tracing::trace!(path = p, uid, gid, "chown ignored");
        Ok(())
    }

    pub fn fchown(&mut self, fd: i32, uid: u32, gid: u32) -> VfsResult<()> {
        tracing::trace!(fd, uid, gid, "fchown ignored");
        Ok(())
    }

    pub fn lchown(&mut self, _p: &str, _uid: u32, _gid: u32) -> VfsResult<()> {
        Err(VfsError::not_implemented("lchown"))
    }

    pub fn link(&mut self, _existing: &str, _new: &str) -> VfsResult<()> {
        Err(VfsError::not_implemented("link"))
    }

    pub fn symlink(&mut self, _target: &str, _link: &str) -> VfsResult<()> {
        Err(VfsError::not_implemented("symlink"))
    }

    pub fn readlink(&self, _p: &str) -> VfsResult<String> {
        Err(VfsError::not_implemented("readlink"))
    }
}

/// Largest single read served from the host's stdin.
const STDIN_CHUNK: usize = 64 * 1024;

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(path::SEPARATOR)
}

/// Byte range of `buf` addressed by `offset` and `length`.
fn io_window(buf_len: usize, offset: usize, length: usize) -> VfsResult<Range<usize>> {
    match offset.checked_add(length) {
        Some(end) if end <= buf_len => Ok(offset..end),
        _ => Err(VfsError::invalid_argument(format!(
            "offset {} + length {} exceeds buffer of {}",
            offset, length, buf_len
        ))),
    }
}

fn to_offset(position: u64) -> VfsResult<usize> {
    usize::try_from(position)
        .map_err(|_| VfsError::invalid_argument(format!("offset {} out of range", position)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CaptureHost;
    use crate::store::DEFAULT_MAX_FILE_SIZE;

    fn vfs() -> Vfs {
        Vfs::new(&SessionConfig::default()).unwrap()
    }

    fn create(vfs: &mut Vfs, p: &str, data: &[u8]) -> i32 {
        let fd = vfs.open(p, OpenFlags::create(), 0o644).unwrap();
        vfs.write(fd, data, 0, data.len(), None).unwrap();
        fd
    }

    #[test]
    fn test_open_missing_without_create() {
        let mut vfs = vfs();
        let err = vfs.open("/root/nope", OpenFlags::read(), 0).unwrap_err();
        assert!(matches!(err, VfsError::NotFound(ref p) if p == "/root/nope"));
    }

    #[test]
    fn test_create_requires_parent() {
        let mut vfs = vfs();
        assert!(matches!(
            vfs.open("/missing/dir/f", OpenFlags::create(), 0),
            Err(VfsError::NotFound(_))
        ));
        create(&mut vfs, "/root/file", b"x");
        assert!(matches!(
            vfs.open("/root/file/child", OpenFlags::create(), 0),
            Err(VfsError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_exclusive_create() {
        let mut vfs = vfs();
        let flags = OpenFlags {
            exclusive: true,
            ..OpenFlags::create()
        };
        vfs.open("/tmp/lock", flags, 0).unwrap();
        assert!(matches!(vfs.open("/tmp/lock", flags, 0), Err(VfsError::AlreadyExists(_))));
    }

    #[test]
    fn test_write_then_stat_size() {
        let mut vfs = vfs();
        create(&mut vfs, "main.go", b"package main\n");
        let stat = vfs.stat("/root/main.go").unwrap();
        assert_eq!(stat.kind, FileType::File);
        assert!(stat.is_file());
        assert_eq!(stat.size, 13);
    }

    #[test]
    fn test_cursor_advances() {
        let mut vfs = vfs();
        let fd = create(&mut vfs, "/tmp/f", b"abc");
        vfs.write(fd, b"def", 0, 3, None).unwrap();
        assert_eq!(vfs.descriptors().get(fd).unwrap().position, 6);

        let fd2 = vfs.open("/tmp/f", OpenFlags::read(), 0).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(fd2, &mut buf, 0, 4, None).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(vfs.read(fd2, &mut buf, 0, 4, None).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(vfs.read(fd2, &mut buf, 0, 4, None).unwrap(), 0);
    }

    #[test]
    fn test_positional_io_leaves_cursor() {
        let mut vfs = vfs();
        let fd = vfs.open("/tmp/p", OpenFlags::create(), 0).unwrap();
        vfs.write(fd, b"xyz", 0, 3, Some(10)).unwrap();
        assert_eq!(vfs.descriptors().get(fd).unwrap().position, 0);

        let mut buf = [0u8; 3];
        assert_eq!(vfs.read(fd, &mut buf, 0, 3, Some(10)).unwrap(), 3);
        assert_eq!(&buf, b"xyz");
        assert_eq!(vfs.stat("/tmp/p").unwrap().size, 13);
        assert_eq!(vfs.descriptors().get(fd).unwrap().position, 0);
    }

    #[test]
    fn test_buffer_window() {
        let mut vfs = vfs();
        let fd = vfs.open("/tmp/w", OpenFlags::create(), 0).unwrap();
        vfs.write(fd, b"--hello--", 2, 5, None).unwrap();
        assert_eq!(vfs.read_file("/tmp/w").unwrap(), b"hello");

        let mut buf = [b'.'; 8];
        assert_eq!(vfs.read(fd, &mut buf, 3, 5, Some(0)).unwrap(), 5);
        assert_eq!(&buf, b"...hello");

        assert!(matches!(
            vfs.write(fd, b"abc", 2, 5, None),
            Err(VfsError::InvalidArgument(_))
        ));
        assert!(matches!(
            vfs.read(fd, &mut buf, 6, 4, None),
            Err(VfsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_truncate_and_append_flags() {
        let mut vfs = vfs();
        create(&mut vfs, "/tmp/log", b"line1\n");

        let fd = vfs.open("/tmp/log", OpenFlags::append(), 0).unwrap();
        assert_eq!(vfs.descriptors().get(fd).unwrap().position, 6);
        vfs.write(fd, b"line2\n", 0, 6, None).unwrap();
        assert_eq!(vfs.read_file("/tmp/log").unwrap(), b"line1\nline2\n");

        vfs.open("/tmp/log", OpenFlags::create_truncate(), 0).unwrap();
        assert_eq!(vfs.stat("/tmp/log").unwrap().size, 0);
    }

    #[test]
    fn test_standard_streams() {
        let mut vfs = vfs();
        let host = CaptureHost::with_stdin(b"input".to_vec());
        vfs.set_host(Box::new(host.clone()));

        assert_eq!(vfs.write(STDOUT, b"out", 0, 3, None).unwrap(), 3);
        assert_eq!(vfs.write(STDERR, b"err", 0, 3, None).unwrap(), 3);
        assert_eq!(host.stdout(), b"out");
        assert_eq!(host.stderr(), b"err");

        let mut buf = [0u8; 16];
        assert_eq!(vfs.read(STDIN, &mut buf, 0, 16, None).unwrap(), 5);
        assert_eq!(&buf[..5], b"input");
        assert_eq!(vfs.read(STDIN, &mut buf, 0, 16, None).unwrap(), 0);

        assert!(matches!(vfs.write(STDIN, b"x", 0, 1, None), Err(VfsError::BadDescriptor(0))));
        assert!(matches!(vfs.read(STDOUT, &mut buf, 0, 1, None), Err(VfsError::BadDescriptor(1))));
        assert!(vfs.fstat(STDOUT).unwrap().kind.is_char_device());
        vfs.close(STDOUT).unwrap();
    }

    #[test]
    fn test_null_device() {
        let mut vfs = vfs();
        let fd = vfs.open("/dev/null", OpenFlags::append(), 0).unwrap();
        assert_eq!(vfs.write(fd, b"discard me", 0, 10, None).unwrap(), 10);
        assert_eq!(vfs.descriptors().get(fd).unwrap().position, 0);
        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(fd, &mut buf, 0, 4, None).unwrap(), 0);
        assert_eq!(vfs.stat("/dev/null").unwrap().kind, FileType::CharDevice);
        assert_eq!(vfs.stat("/dev/null").unwrap().size, 0);
    }

    #[test]
    fn test_directory_descriptor() {
        let mut vfs = vfs();
        let fd = vfs.open("/tmp", OpenFlags::read(), 0).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(vfs.read(fd, &mut buf, 0, 4, None), Err(VfsError::IsADirectory(_))));
        assert!(matches!(vfs.write(fd, b"x", 0, 1, None), Err(VfsError::IsADirectory(_))));
        assert!(vfs.fstat(fd).unwrap().is_dir());
        assert!(matches!(
            vfs.open("/tmp", OpenFlags::create_truncate(), 0),
            Err(VfsError::IsADirectory(_))
        ));
    }

    #[test]
    fn test_close() {
        let mut vfs = vfs();
        let fd = create(&mut vfs, "/tmp/c", b"");
        vfs.close(fd).unwrap();
        assert!(matches!(vfs.close(fd), Err(VfsError::BadDescriptor(_))));
        assert!(matches!(vfs.fstat(fd), Err(VfsError::BadDescriptor(_))));
        assert!(matches!(vfs.fsync(fd), Err(VfsError::BadDescriptor(_))));
    }

    #[test]
    fn test_mkdir_rules() {
        let mut vfs = vfs();
        vfs.mkdir("/root/a", 0o755).unwrap();
        assert!(matches!(vfs.mkdir("/root/a", 0o755), Err(VfsError::AlreadyExists(_))));
        assert!(matches!(vfs.mkdir("/", 0o755), Err(VfsError::AlreadyExists(_))));
        assert!(matches!(vfs.mkdir("/root/x/y", 0o755), Err(VfsError::NotFound(_))));

        create(&mut vfs, "/root/file", b"");
        assert!(matches!(
            vfs.mkdir("/root/file/sub", 0o755),
            Err(VfsError::AlreadyExists(ref p)) if p == "/root/file"
        ));
        assert!(matches!(vfs.mkdir("/root/file", 0o755), Err(VfsError::AlreadyExists(_))));
    }

    #[test]
    fn test_rmdir_rules() {
        let mut vfs = vfs();
        vfs.mkdir("/tmp/d", 0).unwrap();
        create(&mut vfs, "/tmp/d/child", b"");

        assert!(matches!(vfs.rmdir("/tmp/d"), Err(VfsError::NotEmpty(_))));
        assert!(matches!(vfs.rmdir("/tmp/d/child"), Err(VfsError::NotADirectory(_))));
        assert!(matches!(vfs.rmdir("/tmp/gone"), Err(VfsError::NotFound(_))));
        assert!(matches!(vfs.rmdir("/"), Err(VfsError::InvalidArgument(_))));

        vfs.unlink("/tmp/d/child").unwrap();
        vfs.rmdir("/tmp/d").unwrap();
        assert!(vfs.stat("/tmp/d").is_err());
    }

    #[test]
    fn test_unlink_rules() {
        let mut vfs = vfs();
        assert!(matches!(vfs.unlink("/tmp"), Err(VfsError::IsADirectory(_))));
        assert!(matches!(vfs.unlink("/tmp/missing"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_rename_file_overwrites() {
        let mut vfs = vfs();
        create(&mut vfs, "/tmp/a", b"new");
        create(&mut vfs, "/tmp/b", b"old contents");
        vfs.rename("/tmp/a", "/tmp/b").unwrap();
        assert_eq!(vfs.read_file("/tmp/b").unwrap(), b"new");
        assert!(matches!(vfs.stat("/tmp/a"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_rename_directory_cases() {
        let mut vfs = vfs();
        vfs.mkdir("/tmp/src", 0).unwrap();
        create(&mut vfs, "/tmp/src/f", b"1");

        vfs.mkdir("/tmp/empty", 0).unwrap();
        vfs.rename("/tmp/src", "/tmp/empty").unwrap();
        assert_eq!(vfs.read_file("/tmp/empty/f").unwrap(), b"1");
        assert!(vfs.stat("/tmp/src").is_err());

        vfs.mkdir("/tmp/full", 0).unwrap();
        create(&mut vfs, "/tmp/full/g", b"");
        assert!(matches!(vfs.rename("/tmp/empty", "/tmp/full"), Err(VfsError::NotEmpty(_))));

        create(&mut vfs, "/tmp/plain", b"");
        assert!(matches!(vfs.rename("/tmp/empty", "/tmp/plain"), Err(VfsError::NotADirectory(_))));
        assert!(matches!(vfs.rename("/tmp/plain", "/tmp/full"), Err(VfsError::IsADirectory(_))));
        assert!(matches!(
            vfs.rename("/tmp/empty", "/tmp/empty/inner"),
            Err(VfsError::InvalidArgument(_))
        ));
        assert!(matches!(vfs.rename("/tmp/none", "/tmp/x"), Err(VfsError::NotFound(_))));
        assert!(matches!(vfs.rename("/tmp/plain", "/nowhere/x"), Err(VfsError::NotFound(_))));
        vfs.rename("/tmp/plain", "/tmp/plain").unwrap();
    }

    #[test]
    fn test_descriptor_after_unlink() {
        let mut vfs = vfs();
        let fd = create(&mut vfs, "/tmp/f", b"data");
        vfs.unlink("/tmp/f").unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(vfs.read(fd, &mut buf, 0, 4, Some(0)), Err(VfsError::NotFound(_))));
        assert!(matches!(vfs.fstat(fd), Err(VfsError::NotFound(_))));

        create(&mut vfs, "/tmp/f", b"again");
        assert_eq!(vfs.read(fd, &mut buf, 0, 4, Some(0)).unwrap(), 4);
        assert_eq!(&buf, b"agai");
        vfs.close(fd).unwrap();
    }

    #[test]
    fn test_readdir() {
        let mut vfs = vfs();
        vfs.mkdir("/root/pkg", 0).unwrap();
        create(&mut vfs, "/root/pkg/b.go", b"");
        create(&mut vfs, "/root/pkg/a.go", b"");
        vfs.mkdir("/root/pkg/sub", 0).unwrap();
        create(&mut vfs, "/root/pkg/sub/deep.go", b"");

        assert_eq!(vfs.readdir("pkg").unwrap(), vec!["a.go", "b.go", "sub"]);
        assert!(matches!(vfs.readdir("/root/pkg/a.go"), Err(VfsError::NotADirectory(_))));
        assert!(matches!(vfs.readdir("/nope"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_utimes() {
        let mut vfs = vfs();
        create(&mut vfs, "/tmp/t", b"");
        vfs.utimes("/tmp/t", 10.0, 20.5).unwrap();
        let stat = vfs.stat("/tmp/t").unwrap();
        assert_eq!(stat.atime_ms, 10_000.0);
        assert_eq!(stat.mtime_ms, 20_500.0);
        assert!(matches!(vfs.utimes("/tmp/none", 0.0, 0.0), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_truncate_variants() {
        let mut vfs = vfs();
        let fd = create(&mut vfs, "/tmp/t", b"hello world");
        vfs.truncate("/tmp/t", 5).unwrap();
        assert_eq!(vfs.read_file("/tmp/t").unwrap(), b"hello");
        vfs.ftruncate(fd, 7).unwrap();
        assert_eq!(vfs.read_file("/tmp/t").unwrap(), b"hello\0\0");
        assert!(matches!(vfs.truncate("/tmp", 0), Err(VfsError::IsADirectory(_))));
        assert!(matches!(vfs.truncate("/tmp/none", 0), Err(VfsError::NotFound(_))));
        vfs.truncate("/dev/null", 0).unwrap();
    }

    #[test]
    fn test_policy_table() {
        let mut vfs = vfs();
        vfs.chmod("/tmp", 0o700).unwrap();
        vfs.chown("/tmp", 1, 1).unwrap();
        vfs.fchmod(1000, 0o600).unwrap();
        vfs.fchown(1000, 0, 0).unwrap();
        assert!(matches!(vfs.lchown("/tmp", 0, 0), Err(VfsError::NotImplemented("lchown"))));
        assert!(matches!(vfs.link("/a", "/b"), Err(VfsError::NotImplemented("link"))));
        assert!(matches!(vfs.symlink("/a", "/b"), Err(VfsError::NotImplemented("symlink"))));
        assert!(matches!(vfs.readlink("/a"), Err(VfsError::NotImplemented("readlink"))));
    }

    #[test]
    fn test_chdir() {
        let mut vfs = vfs();
        vfs.chdir("/tmp").unwrap();
        create(&mut vfs, "rel", b"1");
        assert!(vfs.stat("/tmp/rel").is_ok());
        assert!(matches!(vfs.chdir("rel"), Err(VfsError::NotADirectory(_))));
        assert!(matches!(vfs.chdir("/missing"), Err(VfsError::NotFound(_))));
        assert_eq!(vfs.cwd(), "/tmp");
    }

    #[test]
    fn test_provision_and_empty_dir() {
        let mut vfs = vfs();
        let files: SeedFiles = [
            ("main.go".to_string(), b"package main".to_vec()),
            ("go.mod".to_string(), b"module x".to_vec()),
        ]
        .into_iter()
        .collect();
        let dir = vfs.provision("/root/run1", &files).unwrap();
        assert_eq!(dir, "/root/run1");
        assert_eq!(vfs.readdir(&dir).unwrap(), vec!["go.mod", "main.go"]);

        assert_eq!(vfs.empty_dir(&dir).unwrap(), 2);
        assert!(vfs.readdir(&dir).unwrap().is_empty());
        assert!(matches!(vfs.empty_dir("/root/none"), Err(VfsError::NotFound(_))));
    }

    #[test]
    fn test_provision_rejects_escaping_names() {
        let mut vfs = vfs();
        for name in ["../../etc/passwd", "sub/main.go", "..", ".", ""] {
            let files: SeedFiles = [(name.to_string(), b"x".to_vec())].into_iter().collect();
            assert!(
                matches!(vfs.provision("/root/run", &files), Err(VfsError::InvalidArgument(_))),
                "accepted {:?}",
                name
            );
        }
        assert!(!vfs.store().has("/etc/passwd"));
        assert!(!vfs.store().has("/root/run"));
    }

    #[test]
    fn test_out_of_range_positions_fail_cleanly() {
        let mut vfs = vfs();
        let fd = create(&mut vfs, "/tmp/f", b"abc");

        assert!(matches!(
            vfs.write(fd, b"xyz", 0, 3, Some(u64::MAX - 1)),
            Err(VfsError::InvalidArgument(_))
        ));
        assert!(matches!(
            vfs.write(fd, b"x", 0, 1, Some(DEFAULT_MAX_FILE_SIZE as u64)),
            Err(VfsError::InvalidArgument(_))
        ));
        assert_eq!(vfs.read_file("/tmp/f").unwrap(), b"abc");

        let mut buf = [0u8; 4];
        assert_eq!(vfs.read(fd, &mut buf, 0, 4, Some(u64::MAX)).unwrap(), 0);
    }

    #[test]
    fn test_huge_truncate_fails_cleanly() {
        let mut vfs = vfs();
        let fd = create(&mut vfs, "/tmp/t", b"abc");
        assert!(matches!(
            vfs.truncate("/tmp/t", u64::MAX),
            Err(VfsError::InvalidArgument(_))
        ));
        assert!(matches!(
            vfs.ftruncate(fd, DEFAULT_MAX_FILE_SIZE as u64 + 1),
            Err(VfsError::InvalidArgument(_))
        ));
        assert_eq!(vfs.stat("/tmp/t").unwrap().size, 3);
    }

    #[test]
    fn test_max_file_size_is_configurable() {
        let config = SessionConfig {
            max_file_size: 8,
            ..Default::default()
        };
        let mut vfs = Vfs::new(&config).unwrap();
        let fd = create(&mut vfs, "/tmp/small", b"12345678");
        assert!(matches!(
            vfs.write(fd, b"9", 0, 1, None),
            Err(VfsError::InvalidArgument(_))
        ));
        vfs.ftruncate(fd, 8).unwrap();
        assert!(matches!(vfs.ftruncate(fd, 9), Err(VfsError::InvalidArgument(_))));
    }

    #[test]
    fn test_read_to_vec_sizes_buffer_to_content() {
        let mut vfs = vfs();
        let fd = create(&mut vfs, "/tmp/r", b"hello");

        let data = vfs.read_to_vec(fd, usize::MAX, Some(1)).unwrap();
        assert_eq!(data, b"ello");
        assert!(vfs.read_to_vec(fd, usize::MAX, Some(u64::MAX)).unwrap().is_empty());

        // Cursor reads drain the file and then hit EOF.
        let fd2 = vfs.open("/tmp/r", OpenFlags::read(), 0).unwrap();
        assert_eq!(vfs.read_to_vec(fd2, usize::MAX, None).unwrap(), b"hello");
        assert!(vfs.read_to_vec(fd2, usize::MAX, None).unwrap().is_empty());

        assert!(matches!(vfs.read_to_vec(1, usize::MAX, None), Err(VfsError::BadDescriptor(1))));
        assert!(matches!(
            vfs.read_to_vec(4242, usize::MAX, None),
            Err(VfsError::BadDescriptor(4242))
        ));
        vfs.set_host(Box::new(CaptureHost::with_stdin(b"in".to_vec())));
        assert_eq!(vfs.read_to_vec(0, usize::MAX, None).unwrap(), b"in");
    }
}
