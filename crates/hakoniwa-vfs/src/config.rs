//! Session configuration.
//!
//! Loaded from RON; every field has a default so an empty file (`()`) is a
//! valid configuration.
//!
//! ```ron
//! (
//!     working_dir: "/root",
//!     base_dirs: ["/tmp", "/dev", "/root", "/root/go"],
//!     base_files: ["/var/cache/README"],
//!     clear_run_dir: true,
//! )
//! ```
//!
//! `config/go-js-wasm.ron` reproduces the tree a Go `js/wasm` toolchain
//! expects (`/go`, `/var/cache/00`..`ff`, tool placeholders).

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fd::{DEFAULT_DESCRIPTOR_BASE, STDERR};
use crate::path;
use crate::process::DEFAULT_WORKING_DIR;
use crate::store::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MIN_CAPACITY};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Initial working directory.
    pub working_dir: String,
    /// First descriptor handle issued by `open`.
    pub descriptor_base: i32,
    /// Minimum backing capacity for file content.
    pub min_capacity: usize,
    /// Largest length a file may reach through write or truncate.
    pub max_file_size: usize,
    /// Directories created when the session starts (parents included).
    pub base_dirs: Vec<String>,
    /// Empty placeholder files created when the session starts.
    pub base_files: Vec<String>,
    /// Character devices created when the session starts.
    pub devices: Vec<String>,
    /// Empty the run directory when a run finishes.
    pub clear_run_dir: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            working_dir: DEFAULT_WORKING_DIR.to_string(),
            descriptor_base: DEFAULT_DESCRIPTOR_BASE,
            min_capacity: DEFAULT_MIN_CAPACITY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            base_dirs: vec!["/tmp".into(), "/dev".into(), DEFAULT_WORKING_DIR.into()],
            base_files: Vec::new(),
            devices: vec!["/dev/null".into()],
            clear_run_dir: false,
        }
    }
}

impl SessionConfig {
    /// Parse a RON document.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = ron::from_str(text)?;
        config.validate()
    }

    /// Read and parse a RON file.
    pub fn load(file: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(file.as_ref())?;
        Self::from_ron(&text)
    }

    /// Check ranges and normalize every path field.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.descriptor_base <= STDERR {
            return Err(ConfigError::Invalid(format!(
                "descriptor_base {} overlaps the standard streams",
                self.descriptor_base
            )));
        }
        if self.min_capacity == 0 {
            return Err(ConfigError::Invalid("min_capacity must be positive".into()));
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid("max_file_size must be positive".into()));
        }
        for p in self
            .base_dirs
            .iter()
            .chain(&self.base_files)
            .chain(&self.devices)
            .chain(std::iter::once(&self.working_dir))
        {
            if !p.starts_with(path::SEPARATOR) {
                return Err(ConfigError::Invalid(format!("path must be absolute: {}", p)));
            }
        }

        let normalize = |p: &String| path::abs_path(path::ROOT, p);
        self.working_dir = normalize(&self.working_dir);
        self.base_dirs = self.base_dirs.iter().map(normalize).collect();
        self.base_files = self.base_files.iter().map(normalize).collect();
        self.devices = self.devices.iter().map(normalize).collect();
        Ok(self)
    }
}
