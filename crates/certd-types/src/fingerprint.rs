use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Number of hex characters in an OpenPGP v4 fingerprint.
pub const FINGERPRINT_HEX_LEN: usize = 40;

/// Returns `true` if `s` is exactly 40 lowercase hexadecimal characters.
///
/// Uppercase input is rejected: identifiers are case-normalized by callers
/// before they reach the store.
pub fn is_fingerprint(s: &str) -> bool {
    s.len() == FINGERPRINT_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// An OpenPGP v4 public-key fingerprint.
///
/// A `Fingerprint` uniquely addresses a certificate entry in the directory.
/// It is always rendered as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Parse a fingerprint from its lowercase hex form.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if !is_fingerprint(s) {
            return Err(TypeError::InvalidFingerprint(s.to_string()));
        }
        let mut arr = [0u8; 20];
        hex::decode_to_slice(s, &mut arr).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self(arr))
    }

    /// Create a fingerprint from its 20 raw bytes.
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// The raw 20-byte fingerprint.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase hex representation (40 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The 64-bit key id (the low 8 bytes of a v4 fingerprint).
    pub fn key_id(&self) -> SubkeyId {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[12..]);
        SubkeyId(u64::from_be_bytes(low))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_hex()
    }
}

/// 64-bit OpenPGP key id of a primary key or subkey.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubkeyId(pub u64);

impl fmt::Debug for SubkeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubkeyId({:016x})", self.0)
    }
}

impl fmt::Display for SubkeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for SubkeyId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
