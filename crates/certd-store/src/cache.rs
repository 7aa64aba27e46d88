use std::collections::HashMap;
use std::io::Read;
use std::sync::RwLock;

use certd_types::{Certificate, KeyMaterial, SpecialName, Tag};
use tracing::trace;

use crate::directory::{CertificateDirectory, Fingerprints};
use crate::error::{StoreError, StoreResult};
use crate::reader::KeyMaterialMerger;
use crate::traits::Items;

/// A [`CertificateDirectory`] that keeps decoded entries in memory.
///
/// Every cached read still asks the backend whether the entry's tag changed,
/// so writes by other directories or processes sharing the store are seen.
/// An unchanged entry is served without decoding it again. The cache belongs
/// to this instance only.
pub struct CachingDirectory {
    inner: CertificateDirectory,
    certificates: RwLock<HashMap<String, Certificate>>,
    special: RwLock<HashMap<String, KeyMaterial>>,
}

impl CachingDirectory {
    pub fn new(inner: CertificateDirectory) -> Self {
        Self {
            inner,
            certificates: RwLock::new(HashMap::new()),
            special: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &CertificateDirectory {
        &self.inner
    }

    pub fn into_inner(self) -> CertificateDirectory {
        self.inner
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        let certificates = self.certificates.read().map(|c| c.len()).unwrap_or_default();
        let special = self.special.read().map(|s| s.len()).unwrap_or_default();
        certificates + special
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) -> StoreResult<()> {
        self.certificates
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        self.special
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .clear();
        Ok(())
    }

    // ---- Reads ----

    pub fn get_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Certificate> {
        get_cached(
            &self.certificates,
            fingerprint,
            Certificate::tag,
            |tag| self.inner.get_by_fingerprint_if_changed(fingerprint, tag),
            || self.inner.get_by_fingerprint(fingerprint),
        )
    }

    pub fn get_by_special_name(&self, name: &str) -> StoreResult<KeyMaterial> {
        get_cached(
            &self.special,
            name,
            |material: &KeyMaterial| material.as_certificate().tag(),
            |tag| self.inner.get_by_special_name_if_changed(name, tag),
            || self.inner.get_by_special_name(name),
        )
    }

    pub fn get_trust_root(&self) -> StoreResult<KeyMaterial> {
        self.get_by_special_name(SpecialName::TrustRoot.as_str())
    }

    pub fn get_trust_root_certificate(&self) -> StoreResult<Certificate> {
        self.get_trust_root().map(KeyMaterial::into_certificate)
    }

    pub fn items(&self) -> StoreResult<Items<'_>> {
        self.inner.items()
    }

    pub fn fingerprints(&self) -> StoreResult<Fingerprints<'_>> {
        self.inner.fingerprints()
    }

    // ---- Writes ----

    pub fn insert(&self, data: impl Read, merge: &dyn KeyMaterialMerger) -> StoreResult<Certificate> {
        let certificate = self.inner.insert(data, merge)?;
        self.remember_certificate(&certificate)?;
        Ok(certificate)
    }

    pub fn try_insert(
        &self,
        data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Option<Certificate>> {
        let inserted = self.inner.try_insert(data, merge)?;
        if let Some(certificate) = &inserted {
            self.remember_certificate(certificate)?;
        }
        Ok(inserted)
    }

    pub fn insert_trust_root(
        &self,
        data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<KeyMaterial> {
        let material = self.inner.insert_trust_root(data, merge)?;
        self.remember_special(SpecialName::TrustRoot.as_str(), &material)?;
        Ok(material)
    }

    pub fn try_insert_trust_root(
        &self,
        data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Option<KeyMaterial>> {
        let inserted = self.inner.try_insert_trust_root(data, merge)?;
        if let Some(material) = &inserted {
            self.remember_special(SpecialName::TrustRoot.as_str(), material)?;
        }
        Ok(inserted)
    }

    pub fn insert_with_special_name(
        &self,
        name: &str,
        data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Certificate> {
        let certificate = self.inner.insert_with_special_name(name, data, merge)?;
        self.forget_special(name)?;
        Ok(certificate)
    }

    pub fn try_insert_with_special_name(
        &self,
        name: &str,
        data: impl Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Option<Certificate>> {
        let inserted = self.inner.try_insert_with_special_name(name, data, merge)?;
        if inserted.is_some() {
            self.forget_special(name)?;
        }
        Ok(inserted)
    }

    fn remember_certificate(&self, certificate: &Certificate) -> StoreResult<()> {
        self.certificates
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(certificate.fingerprint().to_hex(), certificate.clone());
        Ok(())
    }

    fn remember_special(&self, name: &str, material: &KeyMaterial) -> StoreResult<()> {
        self.special
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(name.to_string(), material.clone());
        Ok(())
    }

    // The write only returns the certificate view, which cannot stand in for
    // a stored key.
    fn forget_special(&self, name: &str) -> StoreResult<()> {
        self.special
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .remove(name);
        Ok(())
    }
}

/// Serve `id` from `cache` if its tag is unchanged, otherwise read it and
/// refresh the cache. Failed reads evict the entry.
fn get_cached<T: Clone>(
    cache: &RwLock<HashMap<String, T>>,
    id: &str,
    tag_of: impl Fn(&T) -> Option<Tag>,
    if_changed: impl FnOnce(Tag) -> StoreResult<Option<T>>,
    read: impl FnOnce() -> StoreResult<T>,
) -> StoreResult<T> {
    let cached = cache
        .read()
        .map_err(|_| StoreError::LockPoisoned)?
        .get(id)
        .cloned();

    let fetched = match cached.and_then(|entry| tag_of(&entry).map(|tag| (entry, tag))) {
        Some((entry, tag)) => match if_changed(tag) {
            Ok(None) => {
                trace!(id, "cache hit");
                return Ok(entry);
            }
            Ok(Some(fresh)) => Ok(fresh),
            Err(e) => Err(e),
        },
        None => read(),
    };

    let mut cache = cache.write().map_err(|_| StoreError::LockPoisoned)?;
    match fetched {
        Ok(fresh) => {
            cache.insert(id.to_string(), fresh.clone());
            Ok(fresh)
        }
        Err(e) => {
            cache.remove(id);
            Err(e)
        }
    }
}

impl std::fmt::Debug for CachingDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingDirectory")
            .field("inner", &self.inner)
            .field("cached", &self.len())
            .finish()
    }
}
