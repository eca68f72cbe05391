//! rstore core - path-addressed resources over a filesystem root
//!
//! This crate provides the storage layer:
//! - Store-relative path parsing and validation
//! - Resource handles with lazily queried type
//! - Filesystem backed store with staged writes and case-aware rename
//! - Resource utilities (copy, filtered listing, unique names, `resource:` URLs)
//! - Configuration

pub mod config;
pub mod error;
pub mod paths;
pub mod resource;
pub mod resources;
pub mod store;

// Re-export main types for convenience
pub use config::{LockProviderKind, LockingConfig, StoreConfig};
pub use error::{Result, StoreError};
pub use paths::{ResourcePath, Validation};
pub use resource::{Backend, Resource, ResourceReader, ResourceStore, ResourceType, ResourceWriter};
pub use store::FileSystemResourceStore;
