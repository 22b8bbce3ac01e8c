//! # hakoniwa-vfs
//!
//! In-memory filesystem and process context for a sandboxed guest program.
//!
//! A guest (typically a compiled toolchain running inside a WebAssembly
//! host) makes POSIX-style calls; this crate answers them from memory.
//! Nothing touches the host filesystem.
//!
//! - [`Vfs`] - Synchronous facade: store, descriptors, working directory
//! - [`Session`] - Serialized async handle with lazy seeding and runs
//! - [`GuestFs`] - Async operation set a guest bridge calls
//! - [`syscall`] - Request/reply shapes for message-based bridges
//!
//! ## Design Decisions
//!
//! - **Flat path map**: entries are keyed by normalized absolute path; a
//!   directory is an entry with no content and its children are the keys
//!   below it.
//! - **Path-bound descriptors**: a descriptor remembers a path and a cursor,
//!   and every I/O call looks the path up again.
//! - **One owner**: each session owns its store; there are no globals.

pub mod config;
pub mod error;
pub mod fd;
pub mod host;
pub mod ops;
pub mod path;
pub mod process;
pub mod seed;
pub mod session;
pub mod store;
pub mod syscall;
pub mod types;
pub mod vfs;

pub use config::{ConfigError, SessionConfig};
pub use error::{ErrorCode, VfsError, VfsResult};
pub use host::{CaptureHost, HostIo, NullHost, TracingSink};
pub use ops::GuestFs;
pub use seed::{SeedFiles, SeedSource, StaticSeed};
pub use session::{RunHandle, RunOutput, RunSpec, Session};
pub use syscall::{Payload, Reply, ReplyError, Request, dispatch};
pub use types::{FileType, OpenFlags, Stat, Times};
pub use vfs::Vfs;
