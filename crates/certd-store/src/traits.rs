use std::io::Read;

use certd_types::{Certificate, Fingerprint, KeyMaterial, SpecialName, Tag};

use crate::error::{StoreError, StoreResult};
use crate::locking::LockingMechanism;
use crate::reader::KeyMaterialMerger;

/// Lazy sequence of the certificates stored under fingerprints.
///
/// Each element is decoded when the iterator advances. An element that
/// fails to decode yields `Err` without ending the sequence.
pub type Items<'a> = Box<dyn Iterator<Item = StoreResult<Certificate>> + Send + 'a>;

/// Storage strategy for a certificate directory.
///
/// All implementations must satisfy these invariants:
/// - Reads never take the write lock and never observe a partially written
///   entry.
/// - Every `do_insert*` method assumes the caller holds [`Backend::lock`];
///   none of them lock on their own.
/// - A certificate read by fingerprint whose decoded fingerprint disagrees
///   with the requested one is reported as `BadData`.
/// - Every successful write refreshes the tag of the written location.
/// - All I/O errors are propagated, never silently ignored.
pub trait Backend: Send + Sync {
    /// The write lock guarding this backend.
    fn lock(&self) -> &dyn LockingMechanism;

    /// Read the certificate stored under `fingerprint`.
    ///
    /// Returns `Ok(None)` if there is no entry. Fails with `BadName` if
    /// `fingerprint` is malformed and with `BadData` if the entry does not
    /// decode or belongs to another fingerprint.
    fn read_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Certificate>>;

    /// Read the key material stored under the special name `name`.
    ///
    /// Returns `Ok(None)` if there is no entry; fails with `BadName` for an
    /// unknown name.
    fn read_by_special_name(&self, name: &str) -> StoreResult<Option<KeyMaterial>>;

    /// Enumerate all fingerprint-addressed certificates. Special-name
    /// entries are never included.
    ///
    /// Calling again starts a fresh enumeration. Entries written or removed
    /// while iterating may or may not be observed.
    fn read_items(&self) -> StoreResult<Items<'_>>;

    /// Decode `data`, merge it with the certificate stored under its
    /// fingerprint and persist the result.
    ///
    /// A key is stored by its certificate only. The merge must preserve the
    /// fingerprint; otherwise nothing is written and `BadData` is returned.
    fn do_insert(
        &self,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Certificate>;

    /// Decode `data`, merge it with the entry stored under `name` and
    /// persist the result, which may be a key or a certificate.
    fn do_insert_special(
        &self,
        name: SpecialName,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<KeyMaterial>;

    fn do_insert_trust_root(
        &self,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<KeyMaterial> {
        self.do_insert_special(SpecialName::TrustRoot, data, merge)
    }

    /// Insert under a special name given as a string, returning the
    /// certificate view of the persisted entry.
    fn do_insert_with_special_name(
        &self,
        name: &str,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Certificate> {
        let name = SpecialName::parse(name)?;
        self.do_insert_special(name, data, merge)
            .map(KeyMaterial::into_certificate)
    }

    /// Current tag of the entry stored under `fingerprint`.
    ///
    /// Fails with `MissingEntry` if there is no entry.
    fn tag_for_fingerprint(&self, fingerprint: &str) -> StoreResult<Tag>;

    /// Current tag of the certificate form of the special name `name`.
    ///
    /// Fails with `MissingEntry` if there is no entry.
    fn tag_for_special_name(&self, name: &str) -> StoreResult<Tag>;
}

/// Merge `incoming` into `existing` for a fingerprint-addressed entry.
pub(crate) fn merge_certificate(
    incoming: KeyMaterial,
    existing: Option<Certificate>,
    merge: &dyn KeyMaterialMerger,
) -> StoreResult<Certificate> {
    let fingerprint = *incoming.fingerprint();
    let merged = merge
        .merge(incoming, existing.map(KeyMaterial::from))?
        .into_certificate();
    check_fingerprint(&fingerprint, merged.fingerprint())?;
    Ok(merged)
}

/// Fail with `BadData` unless `found` is the `expected` fingerprint.
pub(crate) fn check_fingerprint(expected: &Fingerprint, found: &Fingerprint) -> StoreResult<()> {
    if expected != found {
        return Err(StoreError::BadData(format!(
            "fingerprint mismatch: expected {expected}, found {found}"
        )));
    }
    Ok(())
}
