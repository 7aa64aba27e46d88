//! Foundation types for the shared PGP certificate directory.
//!
//! This crate provides the identifier, change-detection and key material
//! types used throughout the store. Every other certd crate depends on
//! `certd-types`. It performs no OpenPGP parsing: key material is carried as
//! opaque bytes together with the metadata an injected reader extracted.
//!
//! # Key Types
//!
//! - [`Fingerprint`]: 40-hex-character OpenPGP v4 fingerprint
//! - [`SpecialName`]: reserved non-fingerprint identifier (`trust-root`)
//! - [`SubkeyId`]: 64-bit key id of a (sub)key contained in a certificate
//! - [`Tag`]: opaque token describing an entry's last observed state
//! - [`KeyMaterial`]: either a [`Certificate`] or a secret [`Key`]

pub mod error;
pub mod fingerprint;
pub mod material;
pub mod names;
pub mod tag;

pub use error::TypeError;
pub use fingerprint::{is_fingerprint, Fingerprint, SubkeyId, FINGERPRINT_HEX_LEN};
pub use material::{Certificate, Key, KeyMaterial};
pub use names::SpecialName;
pub use tag::Tag;
