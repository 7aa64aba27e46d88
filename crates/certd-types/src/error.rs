use thiserror::Error;

/// Errors produced by identifier parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("not a fingerprint: {0:?}")]
    InvalidFingerprint(String),

    #[error("{0:?} is not a known special name")]
    UnknownSpecialName(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),
}
