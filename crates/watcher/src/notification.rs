//! Change notifications and their expansion into per-path events
//!
//! A structural change touches more paths than the one it happened at:
//! deleting a directory removes every descendant, creating a nested leaf may
//! create several directories on the way and changes the listing of every
//! existing ancestor. The helpers here compute that full event set from the
//! state of the store *before* the change is applied.

use rstore_core::{paths, resources};
use rstore_core::{Resource, ResourceType, Result};
use std::collections::HashSet;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Type of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Resource came into existence
    EntryCreate,
    /// Content or listing changed
    EntryModify,
    /// Resource ceased to exist
    EntryDelete,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::EntryCreate => "ENTRY_CREATE",
            Kind::EntryModify => "ENTRY_MODIFY",
            Kind::EntryDelete => "ENTRY_DELETE",
        };
        f.write_str(name)
    }
}

/// Change to a single path
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub path: String,
    pub kind: Kind,
}

impl Event {
    pub fn new(path: impl Into<String>, kind: Kind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// A change that originated at one path, with every affected path listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNotification {
    path: String,
    kind: Kind,
    timestamp: u64,
    events: Vec<Event>,
}

impl ResourceNotification {
    pub fn new(path: impl Into<String>, kind: Kind, timestamp: u64, events: Vec<Event>) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp,
            events,
        }
    }

    /// Notification for a change about to be applied to `resource`
    ///
    /// Must be called before the change: the expansion inspects which
    /// descendants and ancestors currently exist.
    pub fn for_change(resource: &Resource, kind: Kind) -> Result<Self> {
        Ok(Self::new(
            resource.path(),
            kind,
            current_timestamp_ms(),
            expand(resource, kind)?,
        ))
    }

    /// Notification for `source` about to be renamed to `target`
    ///
    /// Expands as the deletion of the source subtree followed by the creation
    /// of the target subtree. The target root is reported as modified when it
    /// already exists as a directory.
    pub fn for_rename(source: &Resource, target: &Resource) -> Result<Self> {
        let mut events = expand(source, Kind::EntryDelete)?;

        let target_existed = target.resource_type() == ResourceType::Directory;
        let mut created = expand(target, Kind::EntryCreate)?;
        if target_existed {
            created[0].kind = Kind::EntryModify;
        }
        let target_root = target.path();
        let source_root = source.path();
        let mut moved = Vec::new();
        for descendant in resources::list_recursively(source)? {
            let relative = descendant.path()[source_root.len()..]
                .trim_start_matches('/')
                .to_string();
            moved.push(Event::new(
                paths::join(&target_root, &relative)?,
                Kind::EntryCreate,
            ));
        }
        // moved descendants follow the target root, ahead of its ancestors
        created.splice(1..1, moved);
        events.extend(created);

        Ok(Self::new(
            source.path(),
            Kind::EntryDelete,
            current_timestamp_ms(),
            dedup(events),
        ))
    }

    /// Path the change originated at
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Milliseconds since the Unix epoch
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Every affected path with its individual kind
    pub fn events(&self) -> &[Event] {
        &self.events
    }
}

/// Event set for a change of `kind` at `resource`, given the current state
pub fn expand(resource: &Resource, kind: Kind) -> Result<Vec<Event>> {
    let mut events = vec![Event::new(resource.path(), kind)];
    match kind {
        Kind::EntryModify => {}
        Kind::EntryDelete => {
            for descendant in resources::list_recursively(resource)? {
                events.push(Event::new(descendant.path(), Kind::EntryDelete));
            }
            let mut parent = resource.parent();
            while let Some(ancestor) = parent {
                events.push(Event::new(ancestor.path(), Kind::EntryModify));
                parent = ancestor.parent();
            }
        }
        Kind::EntryCreate => {
            let mut parent = resource.parent();
            while let Some(ancestor) = parent {
                let kind = if ancestor.resource_type() == ResourceType::Undefined {
                    Kind::EntryCreate
                } else {
                    Kind::EntryModify
                };
                events.push(Event::new(ancestor.path(), kind));
                parent = ancestor.parent();
            }
        }
    }
    Ok(events)
}

/// Keep the first event for each path
fn dedup(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    events
        .into_iter()
        .filter(|e| seen.insert(e.path.clone()))
        .collect()
}

/// Get current timestamp in milliseconds
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
