//! Store mutations guarded by a lock and followed by a notification
//!
//! Every mutation follows the same sequence: lock the affected paths, compute
//! the notification against the current state, apply the change, release, and
//! only then dispatch. Listeners therefore never run while a lock is held.

use anyhow::{bail, Context, Result};
use rstore_core::{FileSystemResourceStore, ResourceStore, ResourceType, StoreConfig};
use rstore_locks::{provider_from_config, Lock, LockProvider};
use rstore_watcher::{Kind, NotificationDispatcher, ResourceNotification, SimpleNotificationDispatcher};
use std::io::{self, Read};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A store plus the lock provider and dispatcher coordinating its writers
#[derive(Clone)]
pub struct GuardedStore {
    store: FileSystemResourceStore,
    locks: Arc<dyn LockProvider>,
    dispatcher: Arc<SimpleNotificationDispatcher>,
}

impl GuardedStore {
    pub fn new(
        store: FileSystemResourceStore,
        locks: Arc<dyn LockProvider>,
        dispatcher: Arc<SimpleNotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            locks,
            dispatcher,
        }
    }

    /// Open the configured store with its configured lock provider
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let store = FileSystemResourceStore::from_config(config)
            .with_context(|| format!("Failed to open store at {}", config.root.display()))?;
        let locks = provider_from_config(&config.locking, &config.lock_root());
        Ok(Self::new(store, locks, Arc::new(SimpleNotificationDispatcher::new())))
    }

    pub fn store(&self) -> &FileSystemResourceStore {
        &self.store
    }

    pub fn locks(&self) -> &Arc<dyn LockProvider> {
        &self.locks
    }

    pub fn dispatcher(&self) -> &Arc<SimpleNotificationDispatcher> {
        &self.dispatcher
    }

    /// Replace the content at `path`, creating it if needed
    ///
    /// Returns the kind of change that was announced.
    pub fn write(&self, path: &str, data: &mut dyn Read) -> Result<Kind> {
        let resource = self.store.get(path)?;
        let mut lock = self.lock(&resource.path())?;

        let kind = match resource.resource_type() {
            ResourceType::Undefined => Kind::EntryCreate,
            ResourceType::Resource => Kind::EntryModify,
            ResourceType::Directory => bail!("Cannot write to directory '{}'", path),
        };
        let notification = ResourceNotification::for_change(&resource, kind)?;

        let mut out = resource.open_write()?;
        let written = match io::copy(data, &mut out) {
            Ok(written) => written,
            Err(e) => {
                // the staged content is discarded with the writer
                drop(out);
                if kind == Kind::EntryCreate {
                    if let Err(cleanup) = resource.delete() {
                        warn!(path = %resource.path(), "failed to remove empty leaf: {}", cleanup);
                    }
                }
                return Err(e).context("Failed to write content");
            }
        };
        out.commit()?;
        lock.release()?;

        info!(path = %resource.path(), bytes = written, kind = %kind, "wrote resource");
        self.dispatcher.changed(&notification);
        Ok(kind)
    }

    /// Delete `path` and everything below it; false if nothing was there
    pub fn delete(&self, path: &str) -> Result<bool> {
        let resource = self.store.get(path)?;
        let mut lock = self.lock(&resource.path())?;

        if resource.resource_type() == ResourceType::Undefined {
            return Ok(false);
        }
        let notification = ResourceNotification::for_change(&resource, Kind::EntryDelete)?;
        let deleted = resource.delete()?;
        lock.release()?;

        if deleted {
            info!(path = %resource.path(), "deleted resource");
            self.dispatcher.changed(&notification);
        }
        Ok(deleted)
    }

    /// Move `from` to `to`; false if the store refused the move
    pub fn rename(&self, from: &str, to: &str) -> Result<bool> {
        let source = self.store.get(from)?;
        let target = self.store.get(to)?;

        // fixed order so two opposite renames cannot deadlock
        let (first, second) = if source.path() <= target.path() {
            (source.path(), target.path())
        } else {
            (target.path(), source.path())
        };
        let mut outer = self.lock(&first)?;
        let mut inner = if first == second {
            None
        } else {
            Some(self.lock(&second)?)
        };

        if source.resource_type() == ResourceType::Undefined {
            return Ok(false);
        }
        let notification = ResourceNotification::for_rename(&source, &target)?;
        let renamed = source.rename_to(&target)?;
        if let Some(inner) = inner.as_mut() {
            inner.release()?;
        }
        outer.release()?;

        if renamed {
            info!(from = %source.path(), to = %target.path(), "renamed resource");
            self.dispatcher.changed(&notification);
        }
        Ok(renamed)
    }

    fn lock(&self, path: &str) -> Result<Lock> {
        debug!(path, "locking");
        self.locks
            .acquire(path)
            .with_context(|| format!("Failed to lock '{}'", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstore_core::Validation;
    use rstore_locks::MemoryLockProvider;
    use std::sync::Mutex;
    use tempfile::TempDir;

    type Seen = Arc<Mutex<Vec<(String, Kind)>>>;

    fn guarded() -> (TempDir, GuardedStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSystemResourceStore::open(temp_dir.path(), Validation::Strict).unwrap();
        let guarded = GuardedStore::new(
            store,
            Arc::new(MemoryLockProvider::new()),
            Arc::new(SimpleNotificationDispatcher::new()),
        );
        (temp_dir, guarded)
    }

    fn watch(guarded: &GuardedStore, path: &str, seen: &Seen) {
        let sink = Arc::clone(seen);
        guarded
            .dispatcher()
            .add_listener(
                path,
                Arc::new(move |n: &ResourceNotification| {
                    sink.lock().unwrap().push((n.path().to_string(), n.kind()));
                }),
            )
            .unwrap();
    }

    #[test]
    fn test_write_announces_create_then_modify() {
        let (_tmp, guarded) = guarded();
        let seen = Seen::default();
        watch(&guarded, "styles/a.sld", &seen);

        assert_eq!(guarded.write("styles/a.sld", &mut &b"one"[..]).unwrap(), Kind::EntryCreate);
        assert_eq!(guarded.write("styles/a.sld", &mut &b"two"[..]).unwrap(), Kind::EntryModify);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("styles/a.sld".to_string(), Kind::EntryCreate),
                ("styles/a.sld".to_string(), Kind::EntryModify),
            ]
        );
        assert_eq!(guarded.store().get("styles/a.sld").unwrap().read_all().unwrap(), b"two");
    }

    /// Yields one chunk, then fails
    struct BrokenReader {
        sent: bool,
    }

    impl Read for BrokenReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "source went away"));
            }
            self.sent = true;
            let chunk = b"PARTIAL";
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn test_failed_write_keeps_previous_content() {
        let (_tmp, guarded) = guarded();
        guarded.write("doc.txt", &mut &b"ORIGINAL CONTENT"[..]).unwrap();
        let seen = Seen::default();
        watch(&guarded, "doc.txt", &seen);

        assert!(guarded.write("doc.txt", &mut BrokenReader { sent: false }).is_err());

        let doc = guarded.store().get("doc.txt").unwrap();
        assert_eq!(doc.read_all().unwrap(), b"ORIGINAL CONTENT");
        assert!(seen.lock().unwrap().is_empty());
        // the key is free again
        guarded.write("doc.txt", &mut &b"next"[..]).unwrap();
        assert_eq!(doc.read_all().unwrap(), b"next");
    }

    #[test]
    fn test_failed_create_leaves_nothing_behind() {
        let (_tmp, guarded) = guarded();
        let seen = Seen::default();
        watch(&guarded, "new.txt", &seen);

        assert!(guarded.write("new.txt", &mut BrokenReader { sent: false }).is_err());
        assert_eq!(
            guarded.store().get("new.txt").unwrap().resource_type(),
            ResourceType::Undefined
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_write_to_directory_fails() {
        let (_tmp, guarded) = guarded();
        guarded.store().get("dir").unwrap().dir().unwrap();
        assert!(guarded.write("dir", &mut &b"x"[..]).is_err());
    }

    #[test]
    fn test_delete_missing_is_quiet() {
        let (_tmp, guarded) = guarded();
        let seen = Seen::default();
        watch(&guarded, "ghost", &seen);

        assert!(!guarded.delete("ghost").unwrap());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_rename_notifies_both_sides() {
        let (_tmp, guarded) = guarded();
        guarded.write("a/file", &mut &b"x"[..]).unwrap();
        let seen = Seen::default();
        watch(&guarded, "a/file", &seen);
        watch(&guarded, "b/file", &seen);

        assert!(guarded.rename("a/file", "b/file").unwrap());
        let mut seen = seen.lock().unwrap().clone();
        seen.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            seen,
            vec![
                ("a/file".to_string(), Kind::EntryDelete),
                ("b/file".to_string(), Kind::EntryCreate),
            ]
        );
    }
}
