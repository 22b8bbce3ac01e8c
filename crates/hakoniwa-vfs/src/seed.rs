//! Initial tree materialization.
//!
//! A session starts from a small base tree (scratch, device and home
//! directories) and may then receive a one-time bulk seed, e.g. a packaged
//! standard library, from a [`SeedSource`].

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::config::SessionConfig;
use crate::error::{VfsError, VfsResult};
use crate::path;
use crate::store::{FileStore, Inode};

/// Path → content map used for bulk seeding and run provisioning.
pub type SeedFiles = BTreeMap<String, Vec<u8>>;

/// Supplier of bulk seed content, loaded once per session on first use.
#[async_trait]
pub trait SeedSource: Send + Sync {
    /// Produce the files to materialize. Paths must be absolute.
    async fn load(&self) -> VfsResult<SeedFiles>;
}

/// Seed content already in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSeed {
    files: SeedFiles,
}

impl StaticSeed {
    pub fn new(files: SeedFiles) -> Self {
        Self { files }
    }
}

impl<K: Into<String>, V: Into<Vec<u8>>> FromIterator<(K, V)> for StaticSeed {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[async_trait]
impl SeedSource for StaticSeed {
    async fn load(&self) -> VfsResult<SeedFiles> {
        Ok(self.files.clone())
    }
}

/// Create the configured base directories, placeholder files and devices.
pub fn apply_base(store: &mut FileStore, config: &SessionConfig) -> VfsResult<()> {
    for dir in &config.base_dirs {
        store.mkdir_all(dir)?;
    }
    for file in &config.base_files {
        place(store, file, Inode::file(Vec::new()))?;
    }
    for device in &config.devices {
        place(store, device, Inode::char_device())?;
    }
    tracing::debug!(entries = store.len(), "base tree ready");
    Ok(())
}

/// Write every seed file, creating parent directories as needed.
///
/// Existing files at seed paths are replaced. Returns the number of files
/// written.
pub fn apply(store: &mut FileStore, files: &SeedFiles) -> VfsResult<usize> {
    for (p, content) in files {
        let normalized = path::abs_path(path::ROOT, p);
        place(store, &normalized, Inode::file(content.clone()))?;
    }
    Ok(files.len())
}

fn place(store: &mut FileStore, p: &str, inode: Inode) -> VfsResult<()> {
    if let Some(parent) = path::parent(p) {
        store.mkdir_all(parent)?;
    }
    if let Some(existing) = store.get(p) {
        if existing.is_dir() {
            return Err(VfsError::is_a_directory(p));
        }
    }
    store.set(p, inode);
    Ok(())
}
