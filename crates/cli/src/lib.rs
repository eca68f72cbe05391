//! Library side of the `rstore` command
//!
//! Exposed separately so integration tests can drive the guarded operations
//! without spawning the binary.

pub mod ops;
pub mod util;

pub use ops::GuardedStore;
