use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::locking::LockingMechanism;

/// Holder state of a [`FileLock`] within this process.
#[derive(Debug)]
enum LockState {
    Unlocked,
    /// A thread of this process is blocked on the OS-level lock.
    Acquiring,
    /// This process holds the OS-level lock through this handle.
    Held(File),
}

#[derive(Debug)]
struct Inner {
    state: LockState,
    /// Bumped by `interrupt()`; waiters that see it change give up.
    epoch: u64,
}

/// Cross-process write lock backed by an advisory lock on a lock file.
///
/// Threads of this process queue on a condition variable; the OS-level
/// exclusive lock then excludes writers in other processes. The lock file is
/// created on acquisition and deleted on release.
///
/// The lock is advisory: a process that writes to the store without taking
/// this lock is not excluded.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    inner: Mutex<Inner>,
    available: Condvar,
}

impl FileLock {
    /// A lock on the lock file at `path`. Nothing is created until the lock
    /// is first acquired.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(Inner {
                state: LockState::Unlocked,
                epoch: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn inner(&self) -> StoreResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl LockingMechanism for FileLock {
    fn lock(&self) -> StoreResult<()> {
        {
            let mut inner = self.inner()?;
            let epoch = inner.epoch;
            while !matches!(inner.state, LockState::Unlocked) {
                inner = self
                    .available
                    .wait(inner)
                    .map_err(|_| StoreError::LockPoisoned)?;
                if inner.epoch != epoch {
                    if matches!(inner.state, LockState::Unlocked) {
                        self.available.notify_one();
                    }
                    return Err(StoreError::Interrupted);
                }
            }
            inner.state = LockState::Acquiring;
        }

        // Not holding the mutex here: `try_lock` from other threads must not
        // block behind another process.
        let acquired = acquire_blocking(&self.path);

        let mut inner = self.inner()?;
        match acquired {
            Ok(file) => {
                inner.state = LockState::Held(file);
                debug!(path = %self.path.display(), "write lock acquired");
                Ok(())
            }
            Err(e) => {
                inner.state = LockState::Unlocked;
                self.available.notify_one();
                Err(e.into())
            }
        }
    }

    fn try_lock(&self) -> StoreResult<bool> {
        let mut inner = self.inner()?;
        if !matches!(inner.state, LockState::Unlocked) {
            return Ok(false);
        }
        match try_acquire(&self.path)? {
            Some(file) => {
                inner.state = LockState::Held(file);
                debug!(path = %self.path.display(), "write lock acquired");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn is_locked(&self) -> bool {
        self.inner
            .lock()
            .map(|inner| matches!(inner.state, LockState::Held(_)))
            .unwrap_or(true)
    }

    fn release(&self) -> StoreResult<()> {
        let mut inner = self.inner()?;
        let file = match std::mem::replace(&mut inner.state, LockState::Unlocked) {
            LockState::Held(file) => file,
            other => {
                inner.state = other;
                warn!(path = %self.path.display(), "release called without holding the write lock");
                return Ok(());
            }
        };

        // Unlink before unlocking, so that a waiter which then locks the old
        // handle notices it is stale and retries on a fresh lock file.
        let removed = remove_if_present(&self.path);
        let unlocked = FileExt::unlock(&file);
        drop(file);
        self.available.notify_one();
        debug!(path = %self.path.display(), "write lock released");

        removed.and(unlocked).map_err(Into::into)
    }

    fn interrupt(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.epoch = inner.epoch.wrapping_add(1);
        }
        self.available.notify_all();
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let LockState::Held(file) = std::mem::replace(&mut inner.state, LockState::Unlocked) {
            if let Err(e) = remove_if_present(&self.path) {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
            }
            let _ = FileExt::unlock(&file);
        }
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

fn acquire_blocking(path: &Path) -> io::Result<File> {
    loop {
        let file = open_lock_file(path)?;
        file.lock_exclusive()?;
        if is_linked(&file, path)? {
            return Ok(file);
        }
        debug!(path = %path.display(), "lock file was replaced while waiting; retrying");
    }
}

fn try_acquire(path: &Path) -> io::Result<Option<File>> {
    loop {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {}
            // `file` is closed on return; no handle is left behind.
            Err(e) if is_contended(&e) => return Ok(None),
            Err(e) => return Err(e),
        }
        if is_linked(&file, path)? {
            return Ok(Some(file));
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Whether the locked `file` is still the file linked at `path`.
#[cfg(unix)]
fn is_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_linked(_file: &File, _path: &Path) -> io::Result<bool> {
    Ok(true)
}
