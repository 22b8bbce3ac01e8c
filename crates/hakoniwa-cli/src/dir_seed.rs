//! Seed source backed by a host directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hakoniwa_vfs::path::abs_path;
use hakoniwa_vfs::{SeedFiles, SeedSource, VfsError, VfsResult};
use walkdir::WalkDir;

/// Mirrors every regular file under `root` into the guest tree at `prefix`.
#[derive(Debug, Clone)]
pub struct DirSeed {
    root: PathBuf,
    prefix: String,
}

impl DirSeed {
    pub fn new(root: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            root: root.into(),
            prefix: abs_path("/", prefix),
        }
    }
}

#[async_trait]
impl SeedSource for DirSeed {
    async fn load(&self) -> VfsResult<SeedFiles> {
        let root = self.root.clone();
        let prefix = self.prefix.clone();
        tokio::task::spawn_blocking(move || walk(&root, &prefix))
            .await
            .map_err(|e| VfsError::generic(format!("seed walk aborted: {}", e)))?
    }
}

fn walk(root: &Path, prefix: &str) -> VfsResult<SeedFiles> {
    let mut files = SeedFiles::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| VfsError::generic(format!("seed walk: {}", e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| VfsError::generic(e.to_string()))?;
        let rel = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(entry.path()).map_err(|e| {
            VfsError::generic(format!("seed read {}: {}", entry.path().display(), e))
        })?;
        files.insert(abs_path(prefix, &rel), content);
    }
    tracing::info!(root = %root.display(), prefix, files = files.len(), "walked seed directory");
    Ok(files)
}
