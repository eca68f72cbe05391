use crate::{Lock, LockProvider, Release, Result};

/// [`LockProvider`] that never blocks and excludes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLockProvider;

struct NoRelease;

impl Release for NoRelease {
    fn release(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl LockProvider for NullLockProvider {
    fn acquire(&self, key: &str) -> Result<Lock> {
        Ok(Lock::new(key, Box::new(NoRelease)))
    }
}
