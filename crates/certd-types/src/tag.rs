use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque token describing the state of an entry at its last observation.
///
/// Tags are only ever compared for equality. They are not ordered: a file
/// backend derives them from modification time and file identity, which is
/// not monotonic across every filesystem operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(u64);

impl Tag {
    /// Create a tag from its raw value. Backends own the meaning of the value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value of this tag.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:016x})", self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
