//! CLI command implementations

pub mod cat;
pub mod lock;
pub mod ls;
pub mod mv;
pub mod put;
pub mod rm;
pub mod stat;
