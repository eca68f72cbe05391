//! Path keyed listener registry and synchronous dispatch

use crate::notification::{Event, Kind, ResourceNotification};
use ahash::AHashMap;
use parking_lot::RwLock;
use rstore_core::paths::{self, Validation};
use rstore_core::Result;
use std::sync::Arc;
use tracing::{debug, trace};

/// Receives change notifications for one path
///
/// Called synchronously on the thread that dispatched the change; long
/// running work blocks the dispatcher's caller.
pub trait ResourceListener: Send + Sync {
    fn changed(&self, notification: &ResourceNotification);
}

impl<F> ResourceListener for F
where
    F: Fn(&ResourceNotification) + Send + Sync,
{
    fn changed(&self, notification: &ResourceNotification) {
        self(notification)
    }
}

/// Registry of listeners and delivery of notifications to them
pub trait NotificationDispatcher: Send + Sync {
    /// Bind `listener` to `path` until removed
    fn add_listener(&self, path: &str, listener: Arc<dyn ResourceListener>) -> Result<()>;

    /// Unbind a listener, compared by identity; false if it was not bound to `path`
    fn remove_listener(&self, path: &str, listener: &Arc<dyn ResourceListener>) -> bool;

    /// Deliver a change to every listener bound to an affected path
    fn changed(&self, notification: &ResourceNotification);
}

/// In-memory [`NotificationDispatcher`]
///
/// Dispatch snapshots the listeners for every affected path before invoking
/// any of them, so listeners may add or remove registrations (including
/// their own) from inside `changed()`. Such edits take effect for the next
/// dispatch.
#[derive(Default)]
pub struct SimpleNotificationDispatcher {
    handlers: RwLock<AHashMap<String, Vec<Arc<dyn ResourceListener>>>>,
}

impl SimpleNotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of registrations
    pub fn listener_count(&self) -> usize {
        self.handlers.read().values().map(Vec::len).sum()
    }

    /// Number of listeners bound to `path`
    pub fn listeners_at(&self, path: &str) -> usize {
        match paths::normalize(path, Validation::Lenient) {
            Ok(path) => self.handlers.read().get(&path).map_or(0, Vec::len),
            Err(_) => 0,
        }
    }

    /// Per-path events a notification stands for
    ///
    /// Notifications built with [`ResourceNotification::for_change`] carry
    /// their expansion. A bare notification is expanded from what the
    /// registry knows: a delete reaches registered descendants, and create and
    /// delete both mark every ancestor as modified.
    fn derive_events(
        notification: &ResourceNotification,
        registered: &AHashMap<String, Vec<Arc<dyn ResourceListener>>>,
    ) -> Vec<Event> {
        if !notification.events().is_empty() {
            return notification.events().to_vec();
        }

        let origin = notification.path();
        let kind = notification.kind();
        let mut events = vec![Event::new(origin, kind)];
        if kind == Kind::EntryModify {
            return events;
        }
        if kind == Kind::EntryDelete {
            let mut below: Vec<&String> = registered
                .keys()
                .filter(|path| is_descendant(path, origin))
                .collect();
            below.sort();
            events.extend(below.into_iter().map(|p| Event::new(p.as_str(), Kind::EntryDelete)));
        }
        let mut parent = paths::parent(origin);
        while let Some(ancestor) = parent {
            parent = paths::parent(&ancestor);
            events.push(Event::new(ancestor, Kind::EntryModify));
        }
        events
    }
}

fn is_descendant(path: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() {
        return !path.is_empty();
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

impl NotificationDispatcher for SimpleNotificationDispatcher {
    fn add_listener(&self, path: &str, listener: Arc<dyn ResourceListener>) -> Result<()> {
        let path = paths::normalize(path, Validation::Lenient)?;
        debug!(path = %path, "adding listener");
        self.handlers.write().entry(path).or_default().push(listener);
        Ok(())
    }

    fn remove_listener(&self, path: &str, listener: &Arc<dyn ResourceListener>) -> bool {
        let Ok(path) = paths::normalize(path, Validation::Lenient) else {
            return false;
        };
        let mut handlers = self.handlers.write();
        let Some(bound) = handlers.get_mut(&path) else {
            return false;
        };
        let before = bound.len();
        bound.retain(|l| !Arc::ptr_eq(l, listener));
        let removed = bound.len() != before;
        if bound.is_empty() {
            handlers.remove(&path);
        }
        if removed {
            debug!(path = %path, "removed listener");
        }
        removed
    }

    fn changed(&self, notification: &ResourceNotification) {
        let deliveries: Vec<(Arc<dyn ResourceListener>, ResourceNotification)> = {
            let handlers = self.handlers.read();
            let events = Self::derive_events(notification, &handlers);
            let mut deliveries = Vec::new();
            for event in events {
                if let Some(bound) = handlers.get(&event.path) {
                    for listener in bound {
                        let single = ResourceNotification::new(
                            event.path.clone(),
                            event.kind,
                            notification.timestamp(),
                            vec![event.clone()],
                        );
                        deliveries.push((Arc::clone(listener), single));
                    }
                }
            }
            deliveries
        };

        debug!(
            path = notification.path(),
            kind = %notification.kind(),
            deliveries = deliveries.len(),
            "dispatching notification"
        );
        for (listener, single) in deliveries {
            trace!(path = single.path(), kind = %single.kind(), "delivering");
            listener.changed(&single);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<(String, Kind)>>>, Arc<dyn ResourceListener>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener: Arc<dyn ResourceListener> = Arc::new(move |n: &ResourceNotification| {
            sink.lock().push((n.path().to_string(), n.kind()));
        });
        (seen, listener)
    }

    #[test]
    fn test_add_and_remove() {
        let dispatcher = SimpleNotificationDispatcher::new();
        let (_seen, listener) = recorder();
        dispatcher.add_listener("/a/b/", Arc::clone(&listener)).unwrap();
        assert_eq!(dispatcher.listeners_at("a/b"), 1);

        let (_other_seen, other) = recorder();
        assert!(!dispatcher.remove_listener("a/b", &other));
        assert!(!dispatcher.remove_listener("a", &listener));
        assert!(dispatcher.remove_listener("a/b", &listener));
        assert_eq!(dispatcher.listener_count(), 0);
        assert!(dispatcher.add_listener("a/../b", listener).is_err());
    }

    #[test]
    fn test_modify_reaches_only_its_path() {
        let dispatcher = SimpleNotificationDispatcher::new();
        let (at_leaf, leaf) = recorder();
        let (at_parent, parent) = recorder();
        dispatcher.add_listener("a/b", leaf).unwrap();
        dispatcher.add_listener("a", parent).unwrap();

        dispatcher.changed(&ResourceNotification::new("a/b", Kind::EntryModify, 1, vec![]));

        assert_eq!(*at_leaf.lock(), vec![("a/b".to_string(), Kind::EntryModify)]);
        assert!(at_parent.lock().is_empty());
    }

    #[test]
    fn test_bare_delete_reaches_registered_descendants() {
        let dispatcher = SimpleNotificationDispatcher::new();
        let (seen, listener) = recorder();
        for path in ["d", "d/x", "d/x/y", "dx", "", "other"] {
            dispatcher.add_listener(path, Arc::clone(&listener)).unwrap();
        }

        dispatcher.changed(&ResourceNotification::new("d", Kind::EntryDelete, 1, vec![]));

        let mut got = seen.lock().clone();
        got.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(
            got,
            vec![
                ("".to_string(), Kind::EntryModify),
                ("d".to_string(), Kind::EntryDelete),
                ("d/x".to_string(), Kind::EntryDelete),
                ("d/x/y".to_string(), Kind::EntryDelete),
            ]
        );
    }

    #[test]
    fn test_each_listener_sees_only_its_event() {
        let dispatcher = SimpleNotificationDispatcher::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        dispatcher
            .add_listener(
                "a",
                Arc::new(move |n: &ResourceNotification| sink.lock().push(n.clone())),
            )
            .unwrap();

        let events = vec![
            Event::new("a/b", Kind::EntryCreate),
            Event::new("a", Kind::EntryModify),
        ];
        dispatcher.changed(&ResourceNotification::new("a/b", Kind::EntryCreate, 42, events));

        let received = received.lock();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].path(), "a");
        assert_eq!(received[0].kind(), Kind::EntryModify);
        assert_eq!(received[0].timestamp(), 42);
        assert_eq!(received[0].events(), &[Event::new("a", Kind::EntryModify)]);
    }

    #[test]
    fn test_is_descendant() {
        assert!(is_descendant("a/b", "a"));
        assert!(!is_descendant("ab", "a"));
        assert!(!is_descendant("a", "a"));
        assert!(is_descendant("a", ""));
        assert!(!is_descendant("", ""));
    }
}
