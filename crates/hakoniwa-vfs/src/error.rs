//! VFS error types.
//!
//! Every operation reports failure through [`VfsResult`]. Each variant maps
//! to a short POSIX-style machine code ([`ErrorCode`]) that a guest bridge
//! hands back to the guest, plus free text for humans.

use std::io;
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Short machine code carried alongside every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorCode {
    #[strum(serialize = "ENOENT")]
    NoEntry,
    #[strum(serialize = "EEXIST")]
    Exists,
    #[strum(serialize = "ENOTDIR")]
    NotDir,
    #[strum(serialize = "EISDIR")]
    IsDir,
    #[strum(serialize = "ENOTEMPTY")]
    NotEmpty,
    #[strum(serialize = "ENOSYS")]
    NoSys,
    #[strum(serialize = "EBADF")]
    BadFd,
    #[strum(serialize = "EINVAL")]
    Invalid,
    #[strum(serialize = "EIO")]
    Io,
}

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// File or directory not found.
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("file exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    NotEmpty(String),

    /// Operation has no meaning inside the sandbox.
    #[error("{0} not implemented")]
    NotImplemented(&'static str),

    /// Descriptor is not open.
    #[error("bad file descriptor: {0}")]
    BadDescriptor(i32),

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Host-provided stream failed.
    #[error("host stream error: {0}")]
    Host(String),

    /// Other error.
    #[error("{0}")]
    Generic(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a NotEmpty error.
    pub fn not_empty(path: impl Into<String>) -> Self {
        Self::NotEmpty(path.into())
    }

    /// Create a NotImplemented error, logging it the way the guest runtime
    /// expects unsupported calls to be surfaced.
    pub fn not_implemented(op: &'static str) -> Self {
        tracing::warn!(op, "operation not implemented");
        Self::NotImplemented(op)
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a Generic error.
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Machine code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            VfsError::NotFound(_) => ErrorCode::NoEntry,
            VfsError::AlreadyExists(_) => ErrorCode::Exists,
            VfsError::NotADirectory(_) => ErrorCode::NotDir,
            VfsError::IsADirectory(_) => ErrorCode::IsDir,
            VfsError::NotEmpty(_) => ErrorCode::NotEmpty,
            VfsError::NotImplemented(_) => ErrorCode::NoSys,
            VfsError::BadDescriptor(_) => ErrorCode::BadFd,
            VfsError::InvalidArgument(_) => ErrorCode::Invalid,
            VfsError::Host(_) | VfsError::Generic(_) => ErrorCode::Io,
        }
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        let kind = match &e {
            VfsError::NotFound(_) => io::ErrorKind::NotFound,
            VfsError::AlreadyExists(_) => io::ErrorKind::AlreadyExists,
            VfsError::NotADirectory(_) => io::ErrorKind::NotADirectory,
            VfsError::IsADirectory(_) => io::ErrorKind::IsADirectory,
            VfsError::NotEmpty(_) => io::ErrorKind::DirectoryNotEmpty,
            VfsError::NotImplemented(_) => io::ErrorKind::Unsupported,
            VfsError::BadDescriptor(_) | VfsError::InvalidArgument(_) => {
                io::ErrorKind::InvalidInput
            }
            VfsError::Host(_) | VfsError::Generic(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, e.to_string())
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
