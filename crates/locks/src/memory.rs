//! Reentrant in-process locks
//!
//! Each key maps to a primitive that records its owning thread and how many
//! nested holds that thread has. The map entry lives only while some thread
//! holds or waits on the key.

use crate::{Lock, LockError, LockProvider, Release, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How often an interruptible waiter re-checks its flag
const INTERRUPT_POLL: Duration = Duration::from_millis(10);

/// Cooperative interruption flag for blocked acquirers
///
/// Cloned handles share the flag. Interrupting a waiter makes its acquire
/// fail with [`LockError::Interrupted`]; the flag stays set until cleared.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    flag: Arc<AtomicBool>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Owner {
    thread: Option<ThreadId>,
    holds: usize,
}

#[derive(Default)]
struct KeyLock {
    owner: Mutex<Owner>,
    released: Condvar,
}

struct Entry {
    lock: Arc<KeyLock>,
    /// Threads holding or waiting
    users: usize,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    fn enter(&self, key: &str) -> Arc<KeyLock> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            lock: Arc::new(KeyLock::default()),
            users: 0,
        });
        entry.users += 1;
        Arc::clone(&entry.lock)
    }

    fn leave(&self, key: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(key) {
            entry.users -= 1;
            if entry.users == 0 {
                entries.remove(key);
                trace!(key, "discarded idle lock entry");
            }
        }
    }
}

/// [`LockProvider`] for threads of a single process
///
/// The owning thread may acquire a key it already holds without blocking;
/// other threads wait until every nested hold has been released. Handles
/// are cheap to clone and share one registry.
#[derive(Clone)]
pub struct MemoryLockProvider {
    registry: Arc<Registry>,
    timeout: Option<Duration>,
}

impl Default for MemoryLockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLockProvider {
    /// Provider whose `acquire` waits indefinitely
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            timeout: None,
        }
    }

    /// Bound how long `acquire` waits
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Acquire, giving up after `timeout`
    pub fn try_acquire_for(&self, key: &str, timeout: Duration) -> Result<Lock> {
        self.acquire_inner(key, Some(timeout), None)
    }

    /// Acquire, failing early if `interrupter` fires while waiting
    pub fn acquire_interruptibly(&self, key: &str, interrupter: &Interrupter) -> Result<Lock> {
        self.acquire_inner(key, self.timeout, Some(interrupter))
    }

    /// Number of keys currently held or waited on
    pub fn active_keys(&self) -> usize {
        self.registry.entries.lock().len()
    }

    pub(crate) fn acquire_inner(
        &self,
        key: &str,
        timeout: Option<Duration>,
        interrupter: Option<&Interrupter>,
    ) -> Result<Lock> {
        let started = Instant::now();
        let deadline = timeout.map(|t| started + t);
        let key_lock = self.registry.enter(key);
        let me = thread::current().id();

        let mut owner = key_lock.owner.lock();
        loop {
            match owner.thread {
                None => {
                    owner.thread = Some(me);
                    owner.holds = 1;
                    break;
                }
                Some(holder) if holder == me => {
                    owner.holds += 1;
                    break;
                }
                Some(_) => {}
            }

            if interrupter.is_some_and(Interrupter::is_interrupted) {
                drop(owner);
                self.registry.leave(key);
                debug!(key, "lock wait interrupted");
                return Err(LockError::Interrupted {
                    key: key.to_string(),
                });
            }

            let now = Instant::now();
            let mut wait = match deadline {
                Some(deadline) if now >= deadline => {
                    drop(owner);
                    self.registry.leave(key);
                    return Err(LockError::Timeout {
                        key: key.to_string(),
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
                Some(deadline) => Some(deadline - now),
                None => None,
            };
            if interrupter.is_some() {
                wait = Some(wait.map_or(INTERRUPT_POLL, |w| w.min(INTERRUPT_POLL)));
            }
            match wait {
                Some(wait) => {
                    key_lock.released.wait_for(&mut owner, wait);
                }
                None => key_lock.released.wait(&mut owner),
            }
        }
        let depth = owner.holds;
        drop(owner);

        trace!(key, depth, "acquired memory lock");
        Ok(Lock::new(
            key,
            Box::new(MemoryRelease {
                registry: Arc::clone(&self.registry),
                key: key.to_string(),
                lock: key_lock,
            }),
        ))
    }
}

impl LockProvider for MemoryLockProvider {
    fn acquire(&self, key: &str) -> Result<Lock> {
        self.acquire_inner(key, self.timeout, None)
    }
}

struct MemoryRelease {
    registry: Arc<Registry>,
    key: String,
    lock: Arc<KeyLock>,
}

impl Release for MemoryRelease {
    fn release(self: Box<Self>) -> Result<()> {
        {
            let mut owner = self.lock.owner.lock();
            owner.holds = owner.holds.saturating_sub(1);
            if owner.holds == 0 {
                owner.thread = None;
                self.lock.released.notify_all();
            }
        }
        self.registry.leave(&self.key);
        trace!(key = %self.key, "released memory lock");
        Ok(())
    }
}
