//! Serialized session handle.
//!
//! A [`Session`] owns one [`Vfs`] behind an async mutex. Every call takes the
//! lock for its whole duration, so calls from one guest complete in the
//! order they were issued and a write is always visible to the next read.
//!
//! An optional [`SeedSource`] is loaded on the first call, under the same
//! lock. If loading fails the caller sees the error and the next call tries
//! again.
//!
//! ## Runs
//!
//! [`Session::start_run`] provisions a working directory, writes the run's
//! input files into it, points the guest's standard streams at the run's
//! [`HostIo`] and changes into the directory. [`Session::finish_run`] puts
//! the previous directory and streams back and returns the requested output
//! files.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::SessionConfig;
use crate::error::{VfsError, VfsResult};
use crate::host::HostIo;
use crate::ops::GuestFs;
use crate::path;
use crate::seed::{SeedFiles, SeedSource};
use crate::types::{OpenFlags, Stat};
use crate::vfs::Vfs;

struct State {
    vfs: Vfs,
    pending_seed: Option<Arc<dyn SeedSource>>,
}

pub struct Session {
    state: Mutex<State>,
    clear_run_dir: bool,
}

/// Inputs for one guest run.
pub struct RunSpec {
    /// Working directory for the run; created with parents.
    pub dir: String,
    /// Flat file name → content map written into `dir`.
    pub files: SeedFiles,
    /// Standard streams for the run.
    pub host: Box<dyn HostIo>,
}

impl RunSpec {
    pub fn new(dir: impl Into<String>, files: SeedFiles, host: Box<dyn HostIo>) -> Self {
        Self {
            dir: dir.into(),
            files,
            host,
        }
    }
}

/// Token for a run in progress; hand it back to [`Session::finish_run`].
#[must_use = "a run must be finished to restore the session"]
pub struct RunHandle {
    dir: String,
    prev_cwd: String,
    prev_host: Box<dyn HostIo>,
}

impl RunHandle {
    /// Absolute working directory of the run.
    pub fn dir(&self) -> &str {
        &self.dir
    }
}

/// Files collected when a run finishes.
#[derive(Debug, Clone, Default)]
pub struct RunOutput {
    /// Requested name → content, for names that existed.
    pub files: SeedFiles,
}

impl Session {
    pub fn new(config: &SessionConfig) -> VfsResult<Self> {
        Ok(Self {
            state: Mutex::new(State {
                vfs: Vfs::new(config)?,
                pending_seed: None,
            }),
            clear_run_dir: config.clear_run_dir,
        })
    }

    /// Load `source` on first use.
    pub fn with_seed(mut self, source: Arc<dyn SeedSource>) -> Self {
        self.state.get_mut().pending_seed = Some(source);
        self
    }

    /// Install default standard streams.
    pub fn with_host(mut self, host: Box<dyn HostIo>) -> Self {
        self.state.get_mut().vfs.set_host(host);
        self
    }

    async fn lock(&self) -> VfsResult<MutexGuard<'_, State>> {
        let mut state = self.state.lock().await;
        if let Some(source) = state.pending_seed.clone() {
            let files = source.load().await.inspect_err(|e| {
                tracing::warn!(error = %e, "seed load failed; will retry");
            })?;
            state.vfs.seed(&files)?;
            state.pending_seed = None;
        }
        Ok(state)
    }

    /// Force the lazy seed to load now.
    pub async fn ensure_seeded(&self) -> VfsResult<()> {
        self.lock().await.map(|_| ())
    }

    /// Run `f` against the facade while holding the session lock.
    pub async fn with_vfs<R>(&self, f: impl FnOnce(&mut Vfs) -> R) -> VfsResult<R> {
        let mut state = self.lock().await?;
        Ok(f(&mut state.vfs))
    }

    /// Delete everything beneath `dir`, keeping `dir`.
    pub async fn empty_dir(&self, dir: &str) -> VfsResult<usize> {
        self.lock().await?.vfs.empty_dir(dir)
    }

    /// Provision the run directory and switch the guest into it.
    pub async fn start_run(&self, spec: RunSpec) -> VfsResult<RunHandle> {
        let mut state = self.lock().await?;
        let vfs = &mut state.vfs;

        let dir = vfs.provision(&spec.dir, &spec.files)?;
        let prev_cwd = vfs.cwd().to_string();
        vfs.chdir(&dir)?;
        let prev_host = vfs.set_host(spec.host);

        tracing::info!(dir = %dir, files = spec.files.len(), "run started");
        Ok(RunHandle {
            dir,
            prev_cwd,
            prev_host,
        })
    }

    /// Restore the session and collect `outputs` (names relative to the run
    /// directory). Names that do not exist are skipped.
    pub async fn finish_run<S: AsRef<str>>(
        &self,
        run: RunHandle,
        outputs: &[S],
    ) -> VfsResult<RunOutput> {
        let mut state = self.lock().await?;
        let vfs = &mut state.vfs;

        let collected = collect_outputs(vfs, &run.dir, outputs);

        // Dropping the run's host here flushes any buffered guest output.
        drop(vfs.set_host(run.prev_host));
        if let Err(e) = vfs.chdir(&run.prev_cwd) {
            tracing::warn!(cwd = %run.prev_cwd, error = %e, "previous working directory is gone");
        }
        if self.clear_run_dir {
            vfs.empty_dir(&run.dir)?;
        }

        let files = collected?;
        tracing::info!(dir = %run.dir, outputs = files.len(), "run finished");
        Ok(RunOutput { files })
    }
}

fn collect_outputs<S: AsRef<str>>(vfs: &Vfs, dir: &str, outputs: &[S]) -> VfsResult<SeedFiles> {
    let mut files = SeedFiles::new();
    for name in outputs {
        let name = name.as_ref();
        match vfs.read_file(&path::abs_path(dir, name)) {
            Ok(content) => {
                files.insert(name.to_string(), content);
            }
            Err(VfsError::NotFound(_)) => {
                tracing::debug!(name, "output not produced");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(files)
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("clear_run_dir", &self.clear_run_dir)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GuestFs for Session {
    async fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<i32> {
        self.lock().await?.vfs.open(path, flags, mode)
    }

    async fn close(&self, fd: i32) -> VfsResult<()> {
        self.lock().await?.vfs.close(fd)
    }

    async fn read(&self, fd: i32, length: usize, position: Option<u64>) -> VfsResult<Vec<u8>> {
        self.lock().await?.vfs.read_to_vec(fd, length, position)
    }

    async fn write(&self, fd: i32, data: &[u8], position: Option<u64>) -> VfsResult<usize> {
        self.lock()
            .await?
            .vfs
            .write(fd, data, 0, data.len(), position)
    }

    async fn fsync(&self, fd: i32) -> VfsResult<()> {
        self.lock().await?.vfs.fsync(fd)
    }

    async fn stat(&self, path: &str) -> VfsResult<Stat> {
        self.lock().await?.vfs.stat(path)
    }

    async fn lstat(&self, path: &str) -> VfsResult<Stat> {
        self.lock().await?.vfs.lstat(path)
    }

    async fn fstat(&self, fd: i32) -> VfsResult<Stat> {
        self.lock().await?.vfs.fstat(fd)
    }

    async fn utimes(&self, path: &str, atime: f64, mtime: f64) -> VfsResult<()> {
        self.lock().await?.vfs.utimes(path, atime, mtime)
    }

    async fn truncate(&self, path: &str, len: u64) -> VfsResult<()> {
        self.lock().await?.vfs.truncate(path, len)
    }

    async fn ftruncate(&self, fd: i32, len: u64) -> VfsResult<()> {
        self.lock().await?.vfs.ftruncate(fd, len)
    }

    async fn chmod(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.lock().await?.vfs.chmod(path, mode)
    }

    async fn fchmod(&self, fd: i32, mode: u32) -> VfsResult<()> {
        self.lock().await?.vfs.fchmod(fd, mode)
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()> {
        self.lock().await?.vfs.chown(path, uid, gid)
    }

    async fn fchown(&self, fd: i32, uid: u32, gid: u32) -> VfsResult<()> {
        self.lock().await?.vfs.fchown(fd, uid, gid)
    }

    async fn lchown(&self, path: &str, uid: u32, gid: u32) -> VfsResult<()> {
        self.lock().await?.vfs.lchown(path, uid, gid)
    }

    async fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        self.lock().await?.vfs.mkdir(path, mode)
    }

    async fn rmdir(&self, path: &str) -> VfsResult<()> {
        self.lock().await?.vfs.rmdir(path)
    }

    async fn unlink(&self, path: &str) -> VfsResult<()> {
        self.lock().await?.vfs.unlink(path)
    }

    async fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        self.lock().await?.vfs.rename(from, to)
    }

    async fn readdir(&self, path: &str) -> VfsResult<Vec<String>> {
        self.lock().await?.vfs.readdir(path)
    }

    async fn link(&self, existing: &str, new: &str) -> VfsResult<()> {
        self.lock().await?.vfs.link(existing, new)
    }

    async fn symlink(&self, target: &str, link: &str) -> VfsResult<()> {
        self.lock().await?.vfs.symlink(target, link)
    }

    async fn readlink(&self, path: &str) -> VfsResult<String> {
        self.lock().await?.vfs.readlink(path)
    }

    async fn cwd(&self) -> VfsResult<String> {
        Ok(self.lock().await?.vfs.cwd().to_string())
    }

    async fn chdir(&self, dir: &str) -> VfsResult<()> {
        self.lock().await?.vfs.chdir(dir)
    }

    async fn getuid(&self) -> VfsResult<i32> {
        Ok(self.lock().await?.vfs.process().getuid())
    }

    async fn getgid(&self) -> VfsResult<i32> {
        Ok(self.lock().await?.vfs.process().getgid())
    }

    async fn geteuid(&self) -> VfsResult<i32> {
        Ok(self.lock().await?.vfs.process().geteuid())
    }

    async fn getegid(&self) -> VfsResult<i32> {
        Ok(self.lock().await?.vfs.process().getegid())
    }

    async fn getgroups(&self) -> VfsResult<Vec<i32>> {
        self.lock().await?.vfs.process().getgroups()
    }

    async fn pid(&self) -> VfsResult<i32> {
        Ok(self.lock().await?.vfs.process().pid())
    }

    async fn ppid(&self) -> VfsResult<i32> {
        Ok(self.lock().await?.vfs.process().ppid())
    }

    async fn umask(&self, mask: u32) -> VfsResult<u32> {
        self.lock().await?.vfs.process().umask(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::CaptureHost;
    use crate::seed::StaticSeed;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> Session {
        Session::new(&SessionConfig::default()).unwrap()
    }

    /// Fails the first `failures` loads, then serves one file.
    struct FlakySeed {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SeedSource for FlakySeed {
        async fn load(&self) -> VfsResult<SeedFiles> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(VfsError::generic("seed unavailable"));
            }
            Ok([("/go/VERSION".to_string(), b"go1.14".to_vec())]
                .into_iter()
                .collect())
        }
    }

    #[tokio::test]
    async fn test_lazy_seed_loads_once() {
        let seed: StaticSeed = [("/go/src/fmt/print.go", b"package fmt".to_vec())]
            .into_iter()
            .collect();
        let session = session().with_seed(Arc::new(seed));

        assert_eq!(session.readdir("/go/src/fmt").await.unwrap(), vec!["print.go"]);
        session.unlink("/go/src/fmt/print.go").await.unwrap();
        assert!(!session.exists("/go/src/fmt/print.go").await);
    }

    #[tokio::test]
    async fn test_failed_seed_retries() {
        let seed = Arc::new(FlakySeed {
            failures: 1,
            calls: AtomicUsize::new(0),
        });
        let session = session().with_seed(seed.clone());

        assert!(matches!(session.stat("/go/VERSION").await, Err(VfsError::Generic(_))));
        assert_eq!(session.stat("/go/VERSION").await.unwrap().size, 6);
        session.stat("/go").await.unwrap();
        assert_eq!(seed.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_after_write() {
        let session = session();
        let fd = session.open("out.txt", OpenFlags::create(), 0o644).await.unwrap();
        let payload: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(session.write(fd, &payload, None).await.unwrap(), 2000);
        assert_eq!(session.read(fd, 2000, Some(0)).await.unwrap(), payload);
        assert!(session.read(fd, 10, None).await.unwrap().is_empty());
        session.close(fd).await.unwrap();
        assert_eq!(session.read_all("/root/out.txt").await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_concurrent_callers_serialize() {
        let session = Arc::new(session());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                let name = format!("/tmp/f{}", i);
                session.write_all(&name, name.as_bytes()).await.unwrap();
                session.read_all(&name).await.unwrap()
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            assert_eq!(task.await.unwrap(), format!("/tmp/f{}", i).into_bytes());
        }
        assert_eq!(session.readdir("/tmp").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let session = session();
        let capture = CaptureHost::new();
        let files: SeedFiles = [("main.go".to_string(), b"package main".to_vec())]
            .into_iter()
            .collect();

        let run = session
            .start_run(RunSpec::new("/root/job", files, Box::new(capture.clone())))
            .await
            .unwrap();
        assert_eq!(run.dir(), "/root/job");
        assert_eq!(session.cwd().await.unwrap(), "/root/job");

        session.write(1, b"hello\n", None).await.unwrap();
        session.write_all("main.wasm", b"\0asm").await.unwrap();

        let output = session
            .finish_run(run, &["main.wasm", "missing.out"])
            .await
            .unwrap();
        assert_eq!(output.files.len(), 1);
        assert_eq!(output.files["main.wasm"], b"\0asm");
        assert_eq!(capture.stdout(), b"hello\n");
        assert_eq!(session.cwd().await.unwrap(), "/root");

        // Output after the run no longer reaches the run's host.
        session.write(1, b"later", None).await.unwrap();
        assert_eq!(capture.stdout(), b"hello\n");
        assert!(session.exists("/root/job/main.go").await);
    }

    #[tokio::test]
    async fn test_run_dir_cleared_when_configured() {
        let config = SessionConfig {
            clear_run_dir: true,
            ..Default::default()
        };
        let session = Session::new(&config).unwrap();
        let files: SeedFiles = [("a.txt".to_string(), b"a".to_vec())].into_iter().collect();
        let run = session
            .start_run(RunSpec::new("/tmp/run", files, Box::new(CaptureHost::new())))
            .await
            .unwrap();
        let output = session.finish_run(run, &["a.txt"]).await.unwrap();
        assert_eq!(output.files["a.txt"], b"a");
        assert!(session.readdir("/tmp/run").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dir_entry_point() {
        let session = session();
        session.mkdir("/tmp/cache", 0o755).await.unwrap();
        session.write_all("/tmp/cache/x", b"1").await.unwrap();
        assert_eq!(session.empty_dir("/tmp/cache").await.unwrap(), 1);
        assert!(session.exists("/tmp/cache").await);
    }

    #[tokio::test]
    async fn test_identity() {
        let session = session();
        assert_eq!(session.getuid().await.unwrap(), -1);
        assert_eq!(session.pid().await.unwrap(), -1);
        assert!(matches!(session.umask(0).await, Err(VfsError::NotImplemented(_))));
    }
}
