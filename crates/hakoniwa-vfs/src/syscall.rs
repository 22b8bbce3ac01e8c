//! Request/reply dispatch.
//!
//! A bridge that speaks messages rather than Rust calls sends a [`Request`]
//! and gets a [`Reply`] back: either an error with its machine code or a
//! JSON result. One request per call.
//!
//! ```json
//! {"op": "open", "path": "main.go", "flags": 4}
//! {"op": "write", "fd": 1000, "data": "package main\n"}
//! {"op": "read", "fd": 1000, "length": 64, "position": 0}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{VfsError, VfsResult};
use crate::ops::GuestFs;
use crate::types::OpenFlags;

fn default_mode() -> u32 {
    0o666
}

/// Byte payload: UTF-8 text when possible, raw bytes otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Payload::Text(text),
            Err(e) => Payload::Bytes(e.into_bytes()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(s) => s.as_bytes(),
            Payload::Bytes(b) => b,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Open {
        path: String,
        #[serde(default)]
        flags: u32,
        #[serde(default = "default_mode")]
        mode: u32,
    },
    Close {
        fd: i32,
    },
    Read {
        fd: i32,
        length: usize,
        #[serde(default)]
        position: Option<u64>,
    },
    Write {
        fd: i32,
        data: Payload,
        #[serde(default)]
        position: Option<u64>,
    },
    Fsync {
        fd: i32,
    },
    Stat {
        path: String,
    },
    Lstat {
        path: String,
    },
    Fstat {
        fd: i32,
    },
    Utimes {
        path: String,
        atime: f64,
        mtime: f64,
    },
    Truncate {
        path: String,
        len: u64,
    },
    Ftruncate {
        fd: i32,
        len: u64,
    },
    Chmod {
        path: String,
        mode: u32,
    },
    Fchmod {
        fd: i32,
        mode: u32,
    },
    Chown {
        path: String,
        uid: u32,
        gid: u32,
    },
    Fchown {
        fd: i32,
        uid: u32,
        gid: u32,
    },
    Lchown {
        path: String,
        uid: u32,
        gid: u32,
    },
    Mkdir {
        path: String,
        #[serde(default = "default_mode")]
        mode: u32,
    },
    Rmdir {
        path: String,
    },
    Unlink {
        path: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Readdir {
        path: String,
    },
    Link {
        existing: String,
        new: String,
    },
    Symlink {
        target: String,
        link: String,
    },
    Readlink {
        path: String,
    },
    Cwd,
    Chdir {
        path: String,
    },
    Getuid,
    Getgid,
    Geteuid,
    Getegid,
    Getgroups,
    Pid,
    Ppid,
    Umask {
        mask: u32,
    },
}

impl Request {
    /// Wire name of the operation.
    pub fn op(&self) -> &'static str {
        match self {
            Request::Open { .. } => "open",
            Request::Close { .. } => "close",
            Request::Read { .. } => "read",
            Request::Write { .. } => "write",
            Request::Fsync { .. } => "fsync",
            Request::Stat { .. } => "stat",
            Request::Lstat { .. } => "lstat",
            Request::Fstat { .. } => "fstat",
            Request::Utimes { .. } => "utimes",
            Request::Truncate { .. } => "truncate",
            Request::Ftruncate { .. } => "ftruncate",
            Request::Chmod { .. } => "chmod",
            Request::Fchmod { .. } => "fchmod",
            Request::Chown { .. } => "chown",
            Request::Fchown { .. } => "fchown",
            Request::Lchown { .. } => "lchown",
            Request::Mkdir { .. } => "mkdir",
            Request::Rmdir { .. } => "rmdir",
            Request::Unlink { .. } => "unlink",
            Request::Rename { .. } => "rename",
            Request::Readdir { .. } => "readdir",
            Request::Link { .. } => "link",
            Request::Symlink { .. } => "symlink",
            Request::Readlink { .. } => "readlink",
            Request::Cwd => "cwd",
            Request::Chdir { .. } => "chdir",
            Request::Getuid => "getuid",
            Request::Getgid => "getgid",
            Request::Geteuid => "geteuid",
            Request::Getegid => "getegid",
            Request::Getgroups => "getgroups",
            Request::Pid => "pid",
            Request::Ppid => "ppid",
            Request::Umask { .. } => "umask",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub code: String,
    pub message: String,
}

impl From<&VfsError> for ReplyError {
    fn from(e: &VfsError) -> Self {
        Self {
            code: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

/// Outcome of one request: `error` is null on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub error: Option<ReplyError>,
    #[serde(default)]
    pub result: Value,
}

impl Reply {
    pub fn ok(result: Value) -> Self {
        Self {
            error: None,
            result,
        }
    }

    pub fn err(e: &VfsError) -> Self {
        Self {
            error: Some(e.into()),
            result: Value::Null,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl From<VfsResult<Value>> for Reply {
    fn from(r: VfsResult<Value>) -> Self {
        match r {
            Ok(v) => Reply::ok(v),
            Err(e) => Reply::err(&e),
        }
    }
}

/// Execute one request against `fs`.
pub async fn dispatch<F: GuestFs + ?Sized>(fs: &F, req: Request) -> Reply {
    let op = req.op();
    let reply: Reply = execute(fs, req).await.into();
    if let Some(err) = &reply.error {
        tracing::debug!(op, code = %err.code, "request failed");
    }
    reply
}

async fn execute<F: GuestFs + ?Sized>(fs: &F, req: Request) -> VfsResult<Value> {
    Ok(match req {
        Request::Open { path, flags, mode } => {
            json!(fs.open(&path, OpenFlags::from_bits(flags), mode).await?)
        }
        Request::Close { fd } => done(fs.close(fd).await)?,
        Request::Read {
            fd,
            length,
            position,
        } => {
            let data = fs.read(fd, length, position).await?;
            let n = data.len();
            json!({ "n": n, "data": Payload::from_bytes(data) })
        }
        Request::Write { fd, data, position } => {
            json!(fs.write(fd, data.as_bytes(), position).await?)
        }
        Request::Fsync { fd } => done(fs.fsync(fd).await)?,
        Request::Stat { path } => to_value(fs.stat(&path).await?)?,
        Request::Lstat { path } => to_value(fs.lstat(&path).await?)?,
        Request::Fstat { fd } => to_value(fs.fstat(fd).await?)?,
        Request::Utimes { path, atime, mtime } => done(fs.utimes(&path, atime, mtime).await)?,
        Request::Truncate { path, len } => done(fs.truncate(&path, len).await)?,
        Request::Ftruncate { fd, len } => done(fs.ftruncate(fd, len).await)?,
        Request::Chmod { path, mode } => done(fs.chmod(&path, mode).await)?,
        Request::Fchmod { fd, mode } => done(fs.fchmod(fd, mode).await)?,
        Request::Chown { path, uid, gid } => done(fs.chown(&path, uid, gid).await)?,
        Request::Fchown { fd, uid, gid } => done(fs.fchown(fd, uid, gid).await)?,
        Request::Lchown { path, uid, gid } => done(fs.lchown(&path, uid, gid).await)?,
        Request::Mkdir { path, mode } => done(fs.mkdir(&path, mode).await)?,
        Request::Rmdir { path } => done(fs.rmdir(&path).await)?,
        Request::Unlink { path } => done(fs.unlink(&path).await)?,
        Request::Rename { from, to } => done(fs.rename(&from, &to).await)?,
        Request::Readdir { path } => json!(fs.readdir(&path).await?),
        Request::Link { existing, new } => done(fs.link(&existing, &new).await)?,
        Request::Symlink { target, link } => done(fs.symlink(&target, &link).await)?,
        Request::Readlink { path } => json!(fs.readlink(&path).await?),
        Request::Cwd => json!(fs.cwd().await?),
        Request::Chdir { path } => done(fs.chdir(&path).await)?,
        Request::Getuid => json!(fs.getuid().await?),
        Request::Getgid => json!(fs.getgid().await?),
        Request::Geteuid => json!(fs.geteuid().await?),
        Request::Getegid => json!(fs.getegid().await?),
        Request::Getgroups => json!(fs.getgroups().await?),
        Request::Pid => json!(fs.pid().await?),
        Request::Ppid => json!(fs.ppid().await?),
        Request::Umask { mask } => json!(fs.umask(mask).await?),
    })
}

fn done(r: VfsResult<()>) -> VfsResult<Value> {
    r.map(|()| Value::Null)
}

fn to_value<T: Serialize>(v: T) -> VfsResult<Value> {
    serde_json::to_value(v).map_err(|e| VfsError::generic(e.to_string()))
}
