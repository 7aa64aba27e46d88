use std::path::PathBuf;

use certd_lookup::LookupError;
use certd_types::TypeError;

/// Errors from certificate directory operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The identifier is neither a fingerprint nor a known special name.
    #[error("bad name: {0}")]
    BadName(#[from] TypeError),

    /// Stored or incoming bytes could not be decoded, or a decoded
    /// certificate does not belong where it was read from.
    #[error("bad data: {0}")]
    BadData(String),

    /// No entry exists for a well-formed identifier.
    #[error("no entry for {0}")]
    NotFound(String),

    /// A tag was requested for an entry that does not exist.
    #[error("entry must exist to compute its tag: {0}")]
    MissingEntry(String),

    /// A thread blocked in `lock()` was interrupted; nothing was written.
    #[error("interrupted while waiting for the write lock")]
    Interrupted,

    /// The base directory cannot be used as a store.
    #[error("not a certificate store: {0}")]
    NotAStore(PathBuf),

    /// Invalid backend configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The subkey index could not be updated. The backend write preceding
    /// the index update has already been committed.
    #[error("subkey index update failed: {0}")]
    Lookup(#[from] LookupError),

    /// An in-process lock was poisoned by a panicking holder.
    #[error("in-process lock poisoned")]
    LockPoisoned,

    /// I/O error from the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
