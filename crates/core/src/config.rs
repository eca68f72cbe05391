//! Store configuration
//!
//! Read from a TOML file, typically `<root>/rstore.toml`:
//! ```toml
//! root = "/var/lib/rstore"
//! strict_paths = true
//!
//! [locking]
//! provider = "file"
//! timeout_ms = 10000
//! poll_interval_ms = 10
//! lock_root = "/var/lib/.rstore.locks"
//! ```

use crate::error::{Result, StoreError};
use crate::paths::Validation;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding `strict_paths`
pub const STRICT_PATHS_ENV: &str = "RSTORE_STRICT_PATHS";

/// Default name of the configuration file inside a store root
pub const CONFIG_FILE_NAME: &str = "rstore.toml";

/// Lock root used when the store root has no parent to sit beside
const FALLBACK_LOCK_ROOT: &str = "rstore-locks";

/// Top-level store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the resources (must exist)
    pub root: PathBuf,
    /// Reject the blocked character set in path segments
    pub strict_paths: bool,
    pub locking: LockingConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            strict_paths: true,
            locking: LockingConfig::default(),
        }
    }
}

/// Which lock provider guards mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockProviderKind {
    /// Threads of one process
    #[default]
    Memory,
    /// Processes sharing the store root
    File,
    /// No locking at all
    Null,
}

/// Lock provider settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    pub provider: LockProviderKind,
    /// Upper bound on waiting for a lock
    pub timeout_ms: u64,
    /// Delay between attempts to claim a lock file
    pub poll_interval_ms: u64,
    /// Directory for lock files; outside the store root so they never show
    /// up as resources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_root: Option<PathBuf>,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            provider: LockProviderKind::Memory,
            timeout_ms: 10_000,
            poll_interval_ms: 10,
            lock_root: None,
        }
    }
}

impl StoreConfig {
    /// Configuration with defaults for `root`
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| StoreError::Config(e.to_string()))
    }

    /// Load from a TOML file; a relative `root` is resolved against the file's directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            if config.root.is_relative() {
                config.root = dir.join(&config.root);
            }
            if let Some(lock_root) = config.locking.lock_root.as_mut() {
                if lock_root.is_relative() {
                    *lock_root = dir.join(&*lock_root);
                }
            }
        }
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides
    pub fn apply_env(&mut self) {
        if let Ok(value) = std::env::var(STRICT_PATHS_ENV) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.strict_paths = true,
                "0" | "false" | "no" => self.strict_paths = false,
                _ => {}
            }
        }
    }

    /// Directory shared by every process locking this store
    ///
    /// Defaults to a hidden sibling of the root: `/srv/data` locks in
    /// `/srv/.data.locks`.
    pub fn lock_root(&self) -> PathBuf {
        if let Some(lock_root) = &self.locking.lock_root {
            return lock_root.clone();
        }
        let root = std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone());
        match (root.parent(), root.file_name()) {
            (Some(parent), Some(name)) => {
                parent.join(format!(".{}.locks", name.to_string_lossy()))
            }
            _ => std::env::temp_dir().join(FALLBACK_LOCK_ROOT),
        }
    }

    pub fn validation(&self) -> Validation {
        if self.strict_paths {
            Validation::Strict
        } else {
            Validation::Lenient
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StoreError::Config(e.to_string()))
    }
}
