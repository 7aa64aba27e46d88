//! Reserved special names.
//!
//! Besides fingerprints, the directory addresses a fixed set of special
//! names. A special name is stored flat in the base directory instead of in
//! the two-level fingerprint fan-out. Because every special name contains a
//! character outside `[a-f0-9]`, no special name can ever be mistaken for a
//! fingerprint.

use std::fmt;
use std::str::FromStr;

use crate::error::TypeError;

/// A reserved, implementation-known identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecialName {
    /// The distinguished trust-root key or certificate.
    TrustRoot,
}

impl SpecialName {
    /// Every special name known to this implementation.
    pub const ALL: &'static [SpecialName] = &[SpecialName::TrustRoot];

    /// The on-disk spelling of this name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TrustRoot => "trust-root",
        }
    }

    /// Look up a special name by its exact spelling.
    pub fn lookup(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|n| n.as_str() == name)
    }

    /// Like [`SpecialName::lookup`], but failing with a [`TypeError`].
    pub fn parse(name: &str) -> Result<Self, TypeError> {
        Self::lookup(name).ok_or_else(|| TypeError::UnknownSpecialName(name.to_string()))
    }
}

impl fmt::Display for SpecialName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpecialName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::is_fingerprint;

    #[test]
    fn trust_root_is_known() {
        assert_eq!(SpecialName::parse("trust-root").unwrap(), SpecialName::TrustRoot);
        assert_eq!(SpecialName::TrustRoot.to_string(), "trust-root");
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(
            SpecialName::parse("invalid").unwrap_err(),
            TypeError::UnknownSpecialName("invalid".into())
        );
        assert!(SpecialName::lookup("").is_none());
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(SpecialName::lookup("TRUST-ROOT").is_none());
    }

    #[test]
    fn special_names_never_look_like_fingerprints() {
        for name in SpecialName::ALL {
            assert!(!is_fingerprint(name.as_str()));
        }
    }
}
