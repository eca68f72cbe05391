//! Cross-process locks backed by marker files
//!
//! A lock on `key` is the file `<root>/filelocks/<sha1-hex(key)>.lock`,
//! created with `create_new` so exactly one claimant wins. The file holds the
//! claimant's pid so a marker left behind by a dead process can be reclaimed.
//! Reclaiming happens under a `<sha1-hex(key)>.reclaim` guard created the
//! same way, so two claimants never both remove a marker they judged stale.

use crate::memory::{Interrupter, MemoryLockProvider};
use crate::{Lock, LockError, LockProvider, Release, Result};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Subdirectory of the provider root holding marker files
pub const LOCK_DIR: &str = "filelocks";

/// Extension of the guard file held while a stale marker is removed
const RECLAIM_EXTENSION: &str = "reclaim";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Marker file content
#[derive(Debug, Serialize, Deserialize)]
struct LockContent {
    pid: u32,
    acquired_at: u64,
}

struct Shared {
    lock_dir: PathBuf,
    /// Nesting depth of keys whose marker this provider owns
    depth: DashMap<String, usize>,
}

/// [`LockProvider`] that excludes every process sharing `root`
///
/// Within one provider, threads are first serialized by an in-process lock,
/// which also makes same-thread nesting cheap: only the outermost hold
/// touches the marker file.
#[derive(Clone)]
pub struct FileLockProvider {
    shared: Arc<Shared>,
    memory: MemoryLockProvider,
    timeout: Duration,
    poll_interval: Duration,
}

impl FileLockProvider {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            shared: Arc::new(Shared {
                lock_dir: root.as_ref().join(LOCK_DIR),
                depth: DashMap::new(),
            }),
            memory: MemoryLockProvider::new(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Base delay between claim attempts; each retry adds random jitter up to the same amount
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn lock_dir(&self) -> &Path {
        &self.shared.lock_dir
    }

    /// Marker file used for `key`
    pub fn marker_path(&self, key: &str) -> PathBuf {
        self.shared.lock_dir.join(marker_name(key))
    }

    /// Acquire within the configured timeout, failing early if `interrupter` fires
    pub fn acquire_interruptibly(&self, key: &str, interrupter: &Interrupter) -> Result<Lock> {
        self.acquire_inner(key, Some(interrupter))
    }

    fn acquire_inner(&self, key: &str, interrupter: Option<&Interrupter>) -> Result<Lock> {
        let started = Instant::now();
        let local = self.memory.acquire_inner(key, Some(self.timeout), interrupter)?;

        // the in-process lock makes this thread the only one touching `key` here
        if let Some(mut depth) = self.shared.depth.get_mut(key) {
            *depth += 1;
            return Ok(self.handle(key, local));
        }

        let marker = self.marker_path(key);
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match OpenOptions::new().write(true).create_new(true).open(&marker) {
                Ok(mut file) => {
                    if let Err(source) = write_content(&mut file) {
                        let _ = fs::remove_file(&marker);
                        return Err(io_error(key, source));
                    }
                    break;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    fs::create_dir_all(&self.shared.lock_dir).map_err(|e| io_error(key, e))?;
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if is_stale(&marker) && self.reclaim(key, &marker)? {
                        continue;
                    }
                }
                Err(e) => return Err(io_error(key, e)),
            }

            if interrupter.is_some_and(Interrupter::is_interrupted) {
                return Err(LockError::Interrupted {
                    key: key.to_string(),
                });
            }
            let waited = started.elapsed();
            if waited >= self.timeout {
                debug!(key, attempts, "gave up waiting for lock marker");
                return Err(LockError::Timeout {
                    key: key.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            let jitter = rand::thread_rng().gen_range(0..=self.poll_interval.as_millis() as u64);
            let pause = self.poll_interval + Duration::from_millis(jitter);
            std::thread::sleep(pause.min(self.timeout - waited));
        }

        debug!(key, attempts, "acquired file lock");
        self.shared.depth.insert(key.to_string(), 1);
        Ok(self.handle(key, local))
    }

    /// Remove `marker` if it is still stale once the reclaim guard is held
    ///
    /// The guard is a `create_new` sibling, so the re-check and the removal
    /// never interleave with another claimant's. Returns `true` when the
    /// marker is gone and claiming can be retried immediately.
    fn reclaim(&self, key: &str, marker: &Path) -> Result<bool> {
        let guard = marker.with_extension(RECLAIM_EXTENSION);
        match OpenOptions::new().write(true).create_new(true).open(&guard) {
            Ok(mut file) => {
                if let Err(source) = write_content(&mut file) {
                    let _ = fs::remove_file(&guard);
                    return Err(io_error(key, source));
                }
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                // a claimant that died mid-reclaim leaves its guard behind
                if is_stale(&guard) {
                    warn!(key, guard = %guard.display(), "removing abandoned reclaim guard");
                    let _ = fs::remove_file(&guard);
                }
                return Ok(false);
            }
            Err(e) => return Err(io_error(key, e)),
        }

        let reclaimed = if is_stale(marker) {
            warn!(key, marker = %marker.display(), "reclaiming stale lock marker");
            match fs::remove_file(marker) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
                Err(e) => Err(io_error(key, e)),
            }
        } else {
            Ok(false)
        };
        if let Err(e) = fs::remove_file(&guard) {
            warn!(key, "failed to remove reclaim guard: {}", e);
        }
        reclaimed
    }

    fn handle(&self, key: &str, local: Lock) -> Lock {
        Lock::new(
            key,
            Box::new(FileRelease {
                shared: Arc::clone(&self.shared),
                key: key.to_string(),
                local,
            }),
        )
    }
}

impl LockProvider for FileLockProvider {
    fn acquire(&self, key: &str) -> Result<Lock> {
        self.acquire_inner(key, None)
    }
}

struct FileRelease {
    shared: Arc<Shared>,
    key: String,
    local: Lock,
}

impl Release for FileRelease {
    fn release(mut self: Box<Self>) -> Result<()> {
        let outermost = match self.shared.depth.get_mut(&self.key) {
            Some(mut depth) => {
                *depth -= 1;
                *depth == 0
            }
            None => false,
        };
        let mut result = Ok(());
        if outermost {
            self.shared.depth.remove(&self.key);
            let marker = self.shared.lock_dir.join(marker_name(&self.key));
            result = match fs::remove_file(&marker) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(key = %self.key, "lock marker already gone on release");
                    Ok(())
                }
                Err(e) => Err(io_error(&self.key, e)),
            };
            debug!(key = %self.key, "released file lock");
        }
        self.local.release()?;
        result
    }
}

/// Fixed-width marker file name for `key`
pub fn marker_name(key: &str) -> String {
    format!("{}.lock", hex::encode(Sha1::digest(key.as_bytes())))
}

/// Record this process as the owner of a freshly created file
fn write_content(file: &mut fs::File) -> std::io::Result<()> {
    let content = LockContent {
        pid: std::process::id(),
        acquired_at: current_timestamp_ms(),
    };
    let bytes = serde_json::to_vec(&content).map_err(std::io::Error::from)?;
    file.write_all(&bytes)
}

fn io_error(key: &str, source: std::io::Error) -> LockError {
    LockError::Io {
        key: key.to_string(),
        source,
    }
}

/// A marker is stale when it names a process that no longer runs
///
/// Unreadable or half-written markers are treated as live; their writer may
/// still be finishing.
fn is_stale(marker: &Path) -> bool {
    let Ok(bytes) = fs::read(marker) else {
        return false;
    };
    match serde_json::from_slice::<LockContent>(&bytes) {
        Ok(content) => content.pid != std::process::id() && !is_process_alive(content.pid),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    // null signal only checks existence
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Above every platform's pid limit
    const DEAD_PID: u32 = i32::MAX as u32;

    #[test]
    fn test_marker_name_is_fixed_width_hex() {
        let name = marker_name("job-1");
        assert_eq!(name.len(), 40 + ".lock".len());
        assert!(name[..40].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, marker_name("job-2"));
        assert_eq!(name, marker_name("job-1"));
    }

    #[test]
    fn test_marker_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path());
        let marker = provider.marker_path("k");

        let mut lock = provider.acquire("k").unwrap();
        let content: LockContent = serde_json::from_slice(&fs::read(&marker).unwrap()).unwrap();
        assert_eq!(content.pid, std::process::id());
        assert!(content.acquired_at > 0);

        lock.release().unwrap();
        assert!(!marker.exists());
    }

    #[test]
    fn test_nested_hold_keeps_marker() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path());
        let marker = provider.marker_path("k");

        let mut outer = provider.acquire("k").unwrap();
        let mut inner = provider.acquire("k").unwrap();
        inner.release().unwrap();
        assert!(marker.exists());
        outer.release().unwrap();
        assert!(!marker.exists());
    }

    #[test]
    fn test_stale_marker_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path()).with_timeout(Duration::from_millis(200));
        fs::create_dir_all(provider.lock_dir()).unwrap();
        let dead = LockContent {
            pid: 999_999,
            acquired_at: 1,
        };
        fs::write(provider.marker_path("k"), serde_json::to_vec(&dead).unwrap()).unwrap();

        assert!(provider.acquire("k").is_ok());
    }

    #[test]
    fn test_live_foreign_marker_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path()).with_timeout(Duration::from_millis(100));
        fs::create_dir_all(provider.lock_dir()).unwrap();
        fs::write(provider.marker_path("k"), b"{").unwrap();

        match provider.acquire("k") {
            Err(LockError::Timeout { waited_ms, .. }) => assert!(waited_ms >= 100),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_interruptible_acquire_honors_timeout() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path()).with_timeout(Duration::from_millis(200));
        fs::create_dir_all(provider.lock_dir()).unwrap();
        fs::write(provider.marker_path("k"), b"{").unwrap();

        let started = Instant::now();
        match provider.acquire_interruptibly("k", &Interrupter::new()) {
            Err(LockError::Timeout { waited_ms, .. }) => assert!(waited_ms >= 200),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_interruptible_acquire_times_out_behind_local_holder() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path()).with_timeout(Duration::from_millis(200));
        let _held = provider.acquire("k").unwrap();

        let other = provider.clone();
        let result = std::thread::spawn(move || other.acquire_interruptibly("k", &Interrupter::new()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(LockError::Timeout { .. })));
    }

    #[test]
    fn test_reclaim_spares_live_marker() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path());
        let mut held = provider.acquire("k").unwrap();
        let marker = provider.marker_path("k");

        assert!(!provider.reclaim("k", &marker).unwrap());
        assert!(marker.exists());
        assert!(!marker.with_extension(RECLAIM_EXTENSION).exists());
        held.release().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_reclaim_waits_for_foreign_guard() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileLockProvider::new(temp_dir.path());
        fs::create_dir_all(provider.lock_dir()).unwrap();
        let marker = provider.marker_path("k");
        let dead = LockContent {
            pid: DEAD_PID,
            acquired_at: 1,
        };
        fs::write(&marker, serde_json::to_vec(&dead).unwrap()).unwrap();

        // a guard owned by a live claimant blocks reclamation
        let guard = marker.with_extension(RECLAIM_EXTENSION);
        fs::write(&guard, b"").unwrap();
        assert!(!provider.reclaim("k", &marker).unwrap());
        assert!(marker.exists());

        // an abandoned guard is cleared, then the next attempt reclaims
        fs::write(&guard, serde_json::to_vec(&dead).unwrap()).unwrap();
        assert!(!provider.reclaim("k", &marker).unwrap());
        assert!(!guard.exists());
        assert!(provider.reclaim("k", &marker).unwrap());
        assert!(!marker.exists());
    }

    #[test]
    fn test_process_alive_current() {
        assert!(is_process_alive(std::process::id()));
    }
}
