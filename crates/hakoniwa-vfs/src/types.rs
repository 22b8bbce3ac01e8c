//! Core VFS types.
//!
//! These are the shapes the guest bridge sees: file kinds, stat records and
//! open flags. They serialize so a bridge can forward them as-is.

use serde::{Deserialize, Serialize};

/// File type bit mask.
pub const S_IFMT: u32 = 0o170000;
/// Regular file.
pub const S_IFREG: u32 = 0o100000;
/// Directory.
pub const S_IFDIR: u32 = 0o040000;
/// Character device.
pub const S_IFCHR: u32 = 0o020000;

/// File type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Character device (standard streams, null device).
    CharDevice,
}

impl FileType {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    /// Returns true if this is a character device.
    pub fn is_char_device(&self) -> bool {
        matches!(self, FileType::CharDevice)
    }

    /// Mode bits for this kind.
    pub fn mode_bits(&self) -> u32 {
        match self {
            FileType::File => S_IFREG,
            FileType::Directory => S_IFDIR,
            FileType::CharDevice => S_IFCHR,
        }
    }
}

/// Access and modification timestamps, in seconds, stored as given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Times {
    pub atime: Option<f64>,
    pub mtime: Option<f64>,
}

/// Stat record.
///
/// The sandbox has no owners, links, devices or change times, so those
/// fields are always zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub kind: FileType,
    pub mode: u32,
    pub dev: u64,
    pub ino: u64,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    /// Milliseconds.
    pub atime_ms: f64,
    /// Milliseconds.
    pub mtime_ms: f64,
    /// Milliseconds.
    pub ctime_ms: f64,
}

impl Stat {
    /// Build a stat record for an entry of `kind` and `size`.
    pub fn new(kind: FileType, size: u64, times: &Times) -> Self {
        Self {
            kind,
            mode: kind.mode_bits(),
            dev: 0,
            ino: 0,
            nlink: 0,
            uid: 0,
            gid: 0,
            rdev: 0,
            size,
            blksize: 0,
            blocks: 0,
            atime_ms: times.atime.map(|s| s * 1000.0).unwrap_or(0.0),
            mtime_ms: times.mtime.map(|s| s * 1000.0).unwrap_or(0.0),
            ctime_ms: 0.0,
        }
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }
}

/// Open file flags.
///
/// Decoded from the guest's integer flag word; see the `O_*` constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags {
    /// Write-only access.
    pub write_only: bool,
    /// Read-write access.
    pub read_write: bool,
    /// Create if not exists.
    pub create: bool,
    /// Truncate on open.
    pub truncate: bool,
    /// Append mode.
    pub append: bool,
    /// Exclusive create (fail if exists).
    pub exclusive: bool,
}

impl OpenFlags {
    pub const O_RDONLY: u32 = 0;
    pub const O_WRONLY: u32 = 1 << 0;
    pub const O_RDWR: u32 = 1 << 1;
    pub const O_CREAT: u32 = 1 << 2;
    pub const O_TRUNC: u32 = 1 << 3;
    pub const O_APPEND: u32 = 1 << 4;
    pub const O_EXCL: u32 = 1 << 5;

    /// Decode a guest flag word. Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> Self {
        Self {
            write_only: bits & Self::O_WRONLY != 0,
            read_write: bits & Self::O_RDWR != 0,
            create: bits & Self::O_CREAT != 0,
            truncate: bits & Self::O_TRUNC != 0,
            append: bits & Self::O_APPEND != 0,
            exclusive: bits & Self::O_EXCL != 0,
        }
    }

    /// Encode back into a guest flag word.
    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        if self.write_only {
            bits |= Self::O_WRONLY;
        }
        if self.read_write {
            bits |= Self::O_RDWR;
        }
        if self.create {
            bits |= Self::O_CREAT;
        }
        if self.truncate {
            bits |= Self::O_TRUNC;
        }
        if self.append {
            bits |= Self::O_APPEND;
        }
        if self.exclusive {
            bits |= Self::O_EXCL;
        }
        bits
    }

    /// Read-only access.
    pub fn read() -> Self {
        Self::default()
    }

    /// Create with write access.
    pub fn create() -> Self {
        Self {
            read_write: true,
            create: true,
            ..Default::default()
        }
    }

    /// Create and truncate.
    pub fn create_truncate() -> Self {
        Self {
            truncate: true,
            ..Self::create()
        }
    }

    /// Open for appending, creating if needed.
    pub fn append() -> Self {
        Self {
            write_only: true,
            create: true,
            append: true,
            ..Default::default()
        }
    }
}
