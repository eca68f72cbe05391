//! Change notification for rstore resources
//!
//! This crate provides:
//! - Notification and per-path event types
//! - Expansion of a change into the full set of affected paths
//! - A path keyed listener registry with snapshot dispatch

pub mod dispatcher;
pub mod notification;

pub use dispatcher::{NotificationDispatcher, ResourceListener, SimpleNotificationDispatcher};
pub use notification::{Event, Kind, ResourceNotification};
