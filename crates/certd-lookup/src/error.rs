/// Errors from subkey lookup operations.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// A thread panicked while holding the index lock.
    #[error("subkey index lock poisoned")]
    Poisoned,

    /// The backing index reported a failure.
    #[error("subkey index backend error: {0}")]
    Backend(String),

    /// I/O error from a durable index.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for lookup operations.
pub type LookupResult<T> = Result<T, LookupError>;
