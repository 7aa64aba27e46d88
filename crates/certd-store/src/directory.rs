use std::collections::BTreeSet;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use certd_lookup::{InMemorySubkeyLookup, SubkeyLookup};
use certd_types::{Certificate, Fingerprint, KeyMaterial, SpecialName, SubkeyId, Tag};
use tracing::debug;

use crate::config::FileBackendConfig;
use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::locking::{LockingMechanism, WriteGuard};
use crate::memory::InMemoryBackend;
use crate::reader::{KeyMaterialMerger, KeyMaterialReader};
use crate::traits::{Backend, Items};

/// Lazy sequence of stored fingerprints; see [`CertificateDirectory::fingerprints`].
pub type Fingerprints<'a> = Box<dyn Iterator<Item = StoreResult<Fingerprint>> + Send + 'a>;

/// A certificate directory: a storage backend paired with a subkey index.
///
/// Reads go straight to the backend and never take the write lock. Every
/// write runs the same protocol: take the lock, let the backend merge and
/// persist, record the written certificate's subkey ids in the index, then
/// release the lock. The lock is released on every exit path; if indexing
/// fails the backend write has already been committed and the error is
/// reported as [`StoreError::Lookup`].
pub struct CertificateDirectory {
    backend: Arc<dyn Backend>,
    lookup: Arc<dyn SubkeyLookup>,
}

impl CertificateDirectory {
    pub fn new(backend: Arc<dyn Backend>, lookup: Arc<dyn SubkeyLookup>) -> Self {
        Self { backend, lookup }
    }

    /// A non-durable directory with an in-memory subkey index.
    pub fn in_memory(reader: Arc<dyn KeyMaterialReader>) -> Self {
        Self::new(
            Arc::new(InMemoryBackend::new(reader)),
            Arc::new(InMemorySubkeyLookup::new()),
        )
    }

    /// A durable directory rooted at `base_dir`.
    pub fn file_based(
        base_dir: impl Into<PathBuf>,
        reader: Arc<dyn KeyMaterialReader>,
        lookup: Arc<dyn SubkeyLookup>,
    ) -> StoreResult<Self> {
        Self::file_based_with_config(base_dir, reader, lookup, FileBackendConfig::default())
    }

    pub fn file_based_with_config(
        base_dir: impl Into<PathBuf>,
        reader: Arc<dyn KeyMaterialReader>,
        lookup: Arc<dyn SubkeyLookup>,
        config: FileBackendConfig,
    ) -> StoreResult<Self> {
        let backend = FileBackend::open(base_dir, reader, config)?;
        Ok(Self::new(Arc::new(backend), lookup))
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn subkey_lookup(&self) -> &dyn SubkeyLookup {
        self.lookup.as_ref()
    }

    /// The write lock shared by every writer of this store.
    ///
    /// Holding it directly blocks all inserts until it is released.
    pub fn lock(&self) -> &dyn LockingMechanism {
        self.backend.lock()
    }

    /// Abort every insert currently blocked waiting for the write lock.
    pub fn interrupt(&self) {
        self.backend.lock().interrupt();
    }

    // ---- Reads ----

    /// The certificate stored under `fingerprint`.
    ///
    /// Fails with `NotFound` if there is none, `BadName` if `fingerprint` is
    /// malformed and `BadData` if the entry is unreadable.
    pub fn get_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Certificate> {
        self.backend
            .read_by_fingerprint(fingerprint)?
            .ok_or_else(|| StoreError::NotFound(fingerprint.to_string()))
    }

    /// Like [`get_by_fingerprint`](Self::get_by_fingerprint), but returns
    /// `Ok(None)` without reading the entry if its tag still equals `tag`.
    pub fn get_by_fingerprint_if_changed(
        &self,
        fingerprint: &str,
        tag: Tag,
    ) -> StoreResult<Option<Certificate>> {
        if unchanged(self.backend.tag_for_fingerprint(fingerprint), tag, fingerprint)? {
            return Ok(None);
        }
        self.get_by_fingerprint(fingerprint).map(Some)
    }

    /// The key material stored under the special name `name`.
    pub fn get_by_special_name(&self, name: &str) -> StoreResult<KeyMaterial> {
        self.backend
            .read_by_special_name(name)?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    /// Returns `Ok(None)` if the entry under `name` still has `tag`.
    ///
    /// The tag of a special name is the tag of its certificate form: compare
    /// against `material.as_certificate().tag()`, which for a key differs
    /// from the key's own tag.
    pub fn get_by_special_name_if_changed(
        &self,
        name: &str,
        tag: Tag,
    ) -> StoreResult<Option<KeyMaterial>> {
        if unchanged(self.backend.tag_for_special_name(name), tag, name)? {
            return Ok(None);
        }
        self.get_by_special_name(name).map(Some)
    }

    pub fn get_trust_root(&self) -> StoreResult<KeyMaterial> {
        self.get_by_special_name(SpecialName::TrustRoot.as_str())
    }

    /// The certificate of the trust root, whether a key or a certificate is
    /// stored.
    pub fn get_trust_root_certificate(&self) -> StoreResult<Certificate> {
        self.get_trust_root().map(KeyMaterial::into_certificate)
    }

    pub fn get_trust_root_certificate_if_changed(
        &self,
        tag: Tag,
    ) -> StoreResult<Option<Certificate>> {
        Ok(self
            .get_by_special_name_if_changed(SpecialName::TrustRoot.as_str(), tag)?
            .map(KeyMaterial::into_certificate))
    }

    /// All certificates stored under fingerprints, decoded lazily.
    pub fn items(&self) -> StoreResult<Items<'_>> {
        self.backend.read_items()
    }

    /// The fingerprints of [`items`](Self::items), one per item.
    pub fn fingerprints(&self) -> StoreResult<Fingerprints<'_>> {
        Ok(Box::new(
            self.items()?
                .map(|item| item.map(|certificate| *certificate.fingerprint())),
        ))
    }

    // ---- Writes ----

    /// Insert the certificate read from `data` under its fingerprint,
    /// blocking until the write lock is available.
    pub fn insert(
        &self,
        mut data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Certificate> {
        let guard = WriteGuard::acquire(self.backend.lock())?;
        self.write_locked(guard, |backend| backend.do_insert(&mut data, merge), |c| c)
    }

    /// Like [`insert`](Self::insert), but returns `Ok(None)` without
    /// touching the store if another writer holds the lock.
    pub fn try_insert(
        &self,
        mut data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Option<Certificate>> {
        let Some(guard) = self.try_lock()? else {
            return Ok(None);
        };
        self.write_locked(guard, |backend| backend.do_insert(&mut data, merge), |c| c)
            .map(Some)
    }

    /// Store a key or certificate as the trust root.
    pub fn insert_trust_root(
        &self,
        mut data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<KeyMaterial> {
        let guard = WriteGuard::acquire(self.backend.lock())?;
        self.write_locked(
            guard,
            |backend| backend.do_insert_trust_root(&mut data, merge),
            KeyMaterial::as_certificate,
        )
    }

    pub fn try_insert_trust_root(
        &self,
        mut data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Option<KeyMaterial>> {
        let Some(guard) = self.try_lock()? else {
            return Ok(None);
        };
        self.write_locked(
            guard,
            |backend| backend.do_insert_trust_root(&mut data, merge),
            KeyMaterial::as_certificate,
        )
        .map(Some)
    }

    /// Store key material under the special name `name` and return its
    /// certificate.
    ///
    /// Fails with `BadName` before taking the lock if `name` is unknown.
    pub fn insert_with_special_name(
        &self,
        name: &str,
        mut data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Certificate> {
        SpecialName::parse(name)?;
        let guard = WriteGuard::acquire(self.backend.lock())?;
        self.write_locked(
            guard,
            |backend| backend.do_insert_with_special_name(name, &mut data, merge),
            |c| c,
        )
    }

    pub fn try_insert_with_special_name(
        &self,
        name: &str,
        mut data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Option<Certificate>> {
        SpecialName::parse(name)?;
        let Some(guard) = self.try_lock()? else {
            return Ok(None);
        };
        self.write_locked(
            guard,
            |backend| backend.do_insert_with_special_name(name, &mut data, merge),
            |c| c,
        )
        .map(Some)
    }

    fn try_lock(&self) -> StoreResult<Option<WriteGuard<'_>>> {
        let guard = WriteGuard::try_acquire(self.backend.lock())?;
        if guard.is_none() {
            debug!("write lock unavailable; insert declined");
        }
        Ok(guard)
    }

    /// Run `write` under `guard`, then index the written certificate.
    fn write_locked<T>(
        &self,
        guard: WriteGuard<'_>,
        write: impl FnOnce(&dyn Backend) -> StoreResult<T>,
        certificate: impl Fn(&T) -> &Certificate,
    ) -> StoreResult<T> {
        let written = write(self.backend.as_ref())?;
        let indexed = certificate(&written);
        self.lookup
            .store_certificate_subkey_ids(indexed.fingerprint(), indexed.subkey_ids())?;
        guard.release()?;
        Ok(written)
    }

    // ---- Subkey lookup ----

    pub fn certificate_fingerprints_for_subkey_id(
        &self,
        subkey_id: SubkeyId,
    ) -> StoreResult<BTreeSet<Fingerprint>> {
        Ok(self.lookup.certificate_fingerprints_for_subkey_id(subkey_id)?)
    }

    pub fn store_certificate_subkey_ids(
        &self,
        fingerprint: &Fingerprint,
        subkey_ids: &[SubkeyId],
    ) -> StoreResult<()> {
        Ok(self
            .lookup
            .store_certificate_subkey_ids(fingerprint, subkey_ids)?)
    }

    /// Every stored certificate containing `subkey_id`, ordered by
    /// fingerprint.
    ///
    /// Index entries whose certificate is no longer stored are skipped.
    pub fn get_by_subkey_id(&self, subkey_id: SubkeyId) -> StoreResult<Vec<Certificate>> {
        let mut certificates = Vec::new();
        for fingerprint in self.certificate_fingerprints_for_subkey_id(subkey_id)? {
            match self.get_by_fingerprint(&fingerprint.to_hex()) {
                Ok(certificate) => certificates.push(certificate),
                Err(StoreError::NotFound(_)) => {
                    debug!(%fingerprint, %subkey_id, "indexed certificate is not stored");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(certificates)
    }
}

/// Whether the `current` tag of `id` equals the caller's `known` tag.
fn unchanged(current: StoreResult<Tag>, known: Tag, id: &str) -> StoreResult<bool> {
    match current {
        Ok(current) => Ok(current == known),
        Err(StoreError::MissingEntry(_)) => Err(StoreError::NotFound(id.to_string())),
        Err(e) => Err(e),
    }
}

impl std::fmt::Debug for CertificateDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateDirectory")
            .field("locked", &self.backend.lock().is_locked())
            .finish_non_exhaustive()
    }
}
