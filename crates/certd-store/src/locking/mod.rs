//! Write exclusion for the certificate directory.
//!
//! Every write to a store happens while holding its [`LockingMechanism`].
//! Readers never take the lock. Two implementations share the same contract:
//!
//! - [`MonitorLock`]: a flag guarded by a mutex and condition variable, for
//!   stores that only live inside one process.
//! - [`FileLock`]: an OS advisory lock on a lock file in the base directory,
//!   excluding writers in other processes as well.

mod file;
mod monitor;

pub use file::FileLock;
pub use monitor::MonitorLock;

use tracing::warn;

use crate::error::StoreResult;

/// Exclusive write access to a store.
pub trait LockingMechanism: Send + Sync {
    /// Block until exclusive write access is obtained.
    ///
    /// There is no timeout. Fails with [`StoreError::Interrupted`] if
    /// [`LockingMechanism::interrupt`] is called while waiting; the caller
    /// then does not hold the lock.
    ///
    /// [`StoreError::Interrupted`]: crate::error::StoreError::Interrupted
    fn lock(&self) -> StoreResult<()>;

    /// Acquire the lock only if it is immediately available.
    ///
    /// Returns `Ok(false)` without blocking and without side effects
    /// otherwise.
    fn try_lock(&self) -> StoreResult<bool>;

    /// Whether the lock is currently held through this mechanism. For
    /// diagnostics and tests only.
    fn is_locked(&self) -> bool;

    /// Release the lock and wake one blocked [`LockingMechanism::lock`]
    /// caller. Must only be called by the current holder.
    fn release(&self) -> StoreResult<()>;

    /// Abort every thread currently waiting in [`LockingMechanism::lock`].
    fn interrupt(&self);
}

/// A held write lock that is released when the guard goes out of scope.
///
/// Prefer [`WriteGuard::release`] so that release errors surface; dropping
/// the guard releases too, logging any failure.
#[must_use = "the lock is released when the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a dyn LockingMechanism,
    released: bool,
}

impl<'a> WriteGuard<'a> {
    /// Block until `lock` is held.
    pub fn acquire(lock: &'a dyn LockingMechanism) -> StoreResult<Self> {
        lock.lock()?;
        Ok(Self {
            lock,
            released: false,
        })
    }

    /// Take `lock` if it is free; `Ok(None)` if another holder has it.
    pub fn try_acquire(lock: &'a dyn LockingMechanism) -> StoreResult<Option<Self>> {
        if !lock.try_lock()? {
            return Ok(None);
        }
        Ok(Some(Self {
            lock,
            released: false,
        }))
    }

    pub fn release(mut self) -> StoreResult<()> {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.lock.release() {
            warn!(error = %e, "failed to release write lock on drop");
        }
    }
}

impl std::fmt::Debug for WriteGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteGuard")
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let lock = MonitorLock::new();
        {
            let _guard = WriteGuard::acquire(&lock).unwrap();
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn guard_explicit_release() {
        let lock = MonitorLock::new();
        let guard = WriteGuard::acquire(&lock).unwrap();
        guard.release().unwrap();
        assert!(!lock.is_locked());
    }

    #[test]
    fn try_acquire_declines_while_held() {
        let lock = MonitorLock::new();
        let held = WriteGuard::try_acquire(&lock).unwrap();
        assert!(held.is_some());
        assert!(WriteGuard::try_acquire(&lock).unwrap().is_none());
        drop(held);
        assert!(WriteGuard::try_acquire(&lock).unwrap().is_some());
    }
}
