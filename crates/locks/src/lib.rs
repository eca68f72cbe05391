//! Mutual exclusion keyed by opaque strings
//!
//! This crate provides:
//! - The [`LockProvider`] contract and the [`Lock`] handle
//! - [`MemoryLockProvider`]: reentrant per-thread locks within one process
//! - [`FileLockProvider`]: marker files shared by every process using a root
//! - [`NullLockProvider`]: no locking at all

pub mod file;
pub mod memory;
pub mod null;

pub use file::FileLockProvider;
pub use memory::{Interrupter, MemoryLockProvider};
pub use null::NullLockProvider;

use rstore_core::{LockProviderKind, LockingConfig};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failure to obtain or give back a lock
#[derive(Debug, Error)]
pub enum LockError {
    /// Waited the whole budget without obtaining the lock
    #[error("failed to acquire lock {key:?} after {waited_ms} ms")]
    Timeout { key: String, waited_ms: u64 },

    /// The waiting thread was interrupted; its interrupt flag stays set
    #[error("interrupted while waiting for lock {key:?}")]
    Interrupted { key: String },

    #[error("lock file error for {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Common result type used throughout rstore-locks
pub type Result<T> = std::result::Result<T, LockError>;

/// Source of locks
pub trait LockProvider: Send + Sync {
    /// Block until the lock for `key` is held
    fn acquire(&self, key: &str) -> Result<Lock>;
}

/// Provider-specific work done when a lock is given back
pub(crate) trait Release: Send {
    fn release(self: Box<Self>) -> Result<()>;
}

/// A held lock
///
/// Released explicitly with [`Lock::release`] or implicitly on drop.
/// Releasing twice is a no-op.
pub struct Lock {
    key: String,
    release: Option<Box<dyn Release>>,
}

impl Lock {
    pub(crate) fn new(key: &str, release: Box<dyn Release>) -> Self {
        Self {
            key: key.to_string(),
            release: Some(release),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// False once released
    pub fn is_held(&self) -> bool {
        self.release.is_some()
    }

    pub fn release(&mut self) -> Result<()> {
        match self.release.take() {
            Some(release) => release.release(),
            None => Ok(()),
        }
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(key = %self.key, "failed to release lock on drop: {}", e);
        }
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("key", &self.key)
            .field("held", &self.is_held())
            .finish()
    }
}

/// Build the provider selected in `config`; file locks live below `lock_root`
pub fn provider_from_config(config: &LockingConfig, lock_root: &Path) -> Arc<dyn LockProvider> {
    match config.provider {
        LockProviderKind::Memory => Arc::new(
            MemoryLockProvider::new().with_timeout(Duration::from_millis(config.timeout_ms)),
        ),
        LockProviderKind::File => Arc::new(
            FileLockProvider::new(lock_root)
                .with_timeout(Duration::from_millis(config.timeout_ms))
                .with_poll_interval(Duration::from_millis(config.poll_interval_ms)),
        ),
        LockProviderKind::Null => Arc::new(NullLockProvider),
    }
}
