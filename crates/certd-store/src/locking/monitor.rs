use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::{trace, warn};

use crate::error::{StoreError, StoreResult};
use crate::locking::LockingMechanism;

#[derive(Debug, Default)]
struct MonitorState {
    locked: bool,
    /// Bumped by `interrupt()`; waiters that see it change give up.
    epoch: u64,
}

/// In-process write lock: a boolean flag guarded by a mutex and a condition
/// variable.
#[derive(Debug, Default)]
pub struct MonitorLock {
    state: Mutex<MonitorState>,
    available: Condvar,
}

impl MonitorLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> StoreResult<MutexGuard<'_, MonitorState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl LockingMechanism for MonitorLock {
    fn lock(&self) -> StoreResult<()> {
        let mut state = self.state()?;
        let epoch = state.epoch;
        while state.locked {
            state = self
                .available
                .wait(state)
                .map_err(|_| StoreError::LockPoisoned)?;
            if state.epoch != epoch {
                // Hand a concurrent release on to the next waiter.
                if !state.locked {
                    self.available.notify_one();
                }
                return Err(StoreError::Interrupted);
            }
        }
        state.locked = true;
        trace!("monitor lock acquired");
        Ok(())
    }

    fn try_lock(&self) -> StoreResult<bool> {
        let mut state = self.state()?;
        if state.locked {
            return Ok(false);
        }
        state.locked = true;
        Ok(true)
    }

    fn is_locked(&self) -> bool {
        self.state.lock().map(|state| state.locked).unwrap_or(true)
    }

    fn release(&self) -> StoreResult<()> {
        let mut state = self.state()?;
        if !state.locked {
            warn!("release called on an unlocked monitor lock");
            return Ok(());
        }
        state.locked = false;
        self.available.notify_one();
        trace!("monitor lock released");
        Ok(())
    }

    fn interrupt(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.epoch = state.epoch.wrapping_add(1);
        }
        self.available.notify_all();
    }
}
