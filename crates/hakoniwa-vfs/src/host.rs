//! Host-side standard streams.
//!
//! Writes to descriptors 1 and 2 never touch the store; they go to the
//! [`HostIo`] installed on the facade. Reads from descriptor 0 pull from it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::VfsResult;

/// Standard-stream endpoints supplied by the environment.
pub trait HostIo: Send {
    /// Accept bytes written by the guest to standard output.
    fn write_stdout(&mut self, buf: &[u8]) -> VfsResult<()>;

    /// Accept bytes written by the guest to standard error.
    fn write_stderr(&mut self, buf: &[u8]) -> VfsResult<()>;

    /// Fill `buf` from standard input. Zero means end of input.
    fn read_stdin(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let _ = buf;
        Ok(0)
    }
}

/// Discards output; standard input is always at end.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl HostIo for NullHost {
    fn write_stdout(&mut self, _buf: &[u8]) -> VfsResult<()> {
        Ok(())
    }

    fn write_stderr(&mut self, _buf: &[u8]) -> VfsResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Captured {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdin: Vec<u8>,
    stdin_pos: usize,
}

/// Collects output in memory. Clones share the same buffers, so a caller can
/// keep one handle while the facade owns another.
#[derive(Debug, Default, Clone)]
pub struct CaptureHost {
    inner: Arc<Mutex<Captured>>,
}

impl CaptureHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture output and serve `stdin` to the guest.
    pub fn with_stdin(stdin: impl Into<Vec<u8>>) -> Self {
        let host = Self::default();
        host.inner.lock().stdin = stdin.into();
        host
    }

    pub fn stdout(&self) -> Vec<u8> {
        self.inner.lock().stdout.clone()
    }

    pub fn stderr(&self) -> Vec<u8> {
        self.inner.lock().stderr.clone()
    }
}

impl HostIo for CaptureHost {
    fn write_stdout(&mut self, buf: &[u8]) -> VfsResult<()> {
        self.inner.lock().stdout.extend_from_slice(buf);
        Ok(())
    }

    fn write_stderr(&mut self, buf: &[u8]) -> VfsResult<()> {
        self.inner.lock().stderr.extend_from_slice(buf);
        Ok(())
    }

    fn read_stdin(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let mut inner = self.inner.lock();
        let start = inner.stdin_pos;
        let n = buf.len().min(inner.stdin.len() - start);
        buf[..n].copy_from_slice(&inner.stdin[start..start + n]);
        inner.stdin_pos += n;
        Ok(n)
    }
}

/// Emits guest output through `tracing`, one event per complete line.
///
/// Partial lines are held until a newline arrives or [`TracingSink::flush`]
/// is called.
#[derive(Debug, Default)]
pub struct TracingSink {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit any held partial lines.
    pub fn flush(&mut self) {
        emit("stdout", &std::mem::take(&mut self.stdout));
        emit("stderr", &std::mem::take(&mut self.stderr));
    }
}

fn push_lines(stream: &'static str, held: &mut Vec<u8>, buf: &[u8]) {
    held.extend_from_slice(buf);
    if let Some(nl) = held.iter().rposition(|&b| b == b'\n') {
        let rest = held.split_off(nl + 1);
        let complete = std::mem::replace(held, rest);
        for line in complete[..complete.len() - 1].split(|&b| b == b'\n') {
            emit(stream, line);
        }
    }
}

fn emit(stream: &'static str, line: &[u8]) {
    if line.is_empty() {
        return;
    }
    tracing::info!(target: "guest", stream, "{}", String::from_utf8_lossy(line));
}

impl HostIo for TracingSink {
    fn write_stdout(&mut self, buf: &[u8]) -> VfsResult<()> {
        push_lines("stdout", &mut self.stdout, buf);
        Ok(())
    }

    fn write_stderr(&mut self, buf: &[u8]) -> VfsResult<()> {
        push_lines("stderr", &mut self.stderr, buf);
        Ok(())
    }
}

impl Drop for TracingSink {
    fn drop(&mut self) {
        self.flush();
    }
}
