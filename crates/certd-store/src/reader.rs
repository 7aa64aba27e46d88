//! Seams for decoding and merging key material.
//!
//! The store performs no OpenPGP parsing of its own. The embedding
//! application injects a [`KeyMaterialReader`] once per backend and passes a
//! [`KeyMaterialMerger`] with every write.

use std::io::Read;

use certd_types::{KeyMaterial, Tag};

use crate::error::StoreResult;

/// Decodes raw bytes into key material.
pub trait KeyMaterialReader: Send + Sync {
    /// Decode a certificate or key from `data`.
    ///
    /// `tag` is the backend's tag for the location the bytes came from, or
    /// `None` for incoming data; implementations attach it to the result.
    /// Fails with [`StoreError::BadData`] if the bytes do not decode.
    ///
    /// [`StoreError::BadData`]: crate::error::StoreError::BadData
    fn read(&self, data: &mut dyn Read, tag: Option<Tag>) -> StoreResult<KeyMaterial>;
}

/// Reconciles an incoming write with the entry already stored at the same
/// location.
///
/// Called under the write lock. When `existing` is `None` the merger must
/// return `incoming` unchanged. May fail with `BadData` if either input is
/// unusable for merging; nothing is written in that case.
pub trait KeyMaterialMerger {
    fn merge(&self, incoming: KeyMaterial, existing: Option<KeyMaterial>) -> StoreResult<KeyMaterial>;
}

impl<F> KeyMaterialMerger for F
where
    F: Fn(KeyMaterial, Option<KeyMaterial>) -> StoreResult<KeyMaterial>,
{
    fn merge(&self, incoming: KeyMaterial, existing: Option<KeyMaterial>) -> StoreResult<KeyMaterial> {
        self(incoming, existing)
    }
}

/// Merger that keeps the incoming entry and discards the existing one.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReplaceMerger;

impl KeyMaterialMerger for ReplaceMerger {
    fn merge(&self, incoming: KeyMaterial, _existing: Option<KeyMaterial>) -> StoreResult<KeyMaterial> {
        Ok(incoming)
    }
}
