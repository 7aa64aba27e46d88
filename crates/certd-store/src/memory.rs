use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use certd_types::{Certificate, Fingerprint, KeyMaterial, SpecialName, Tag};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::locking::{LockingMechanism, MonitorLock};
use crate::reader::{KeyMaterialMerger, KeyMaterialReader};
use crate::traits::{merge_certificate, Backend, Items};

/// Issues strictly increasing tags: wall-clock milliseconds, bumped past the
/// previous tag when two writes land in the same millisecond.
#[derive(Debug, Default)]
struct TagClock {
    last: AtomicU64,
}

impl TagClock {
    fn next(&self) -> Tag {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        let prev = match self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        Tag::from_raw(now.max(prev + 1))
    }
}

/// Non-durable backend holding decoded entries in two maps.
///
/// Intended for tests and for single-process use. Writers are serialized by
/// a [`MonitorLock`]; the maps themselves sit behind `RwLock`s so readers
/// only ever wait for the map update of a write, never for the writer.
pub struct InMemoryBackend {
    certificates: RwLock<HashMap<Fingerprint, Certificate>>,
    special: RwLock<HashMap<SpecialName, KeyMaterial>>,
    lock: MonitorLock,
    reader: Arc<dyn KeyMaterialReader>,
    clock: TagClock,
}

impl InMemoryBackend {
    pub fn new(reader: Arc<dyn KeyMaterialReader>) -> Self {
        Self {
            certificates: RwLock::new(HashMap::new()),
            special: RwLock::new(HashMap::new()),
            lock: MonitorLock::new(),
            reader,
            clock: TagClock::default(),
        }
    }

    /// Number of fingerprint-addressed entries.
    pub fn len(&self) -> usize {
        self.certificates.read().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn certificates(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<Fingerprint, Certificate>>> {
        self.certificates.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn certificates_mut(
        &self,
    ) -> StoreResult<RwLockWriteGuard<'_, HashMap<Fingerprint, Certificate>>> {
        self.certificates.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn special(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<SpecialName, KeyMaterial>>> {
        self.special.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn special_mut(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<SpecialName, KeyMaterial>>> {
        self.special.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Backend for InMemoryBackend {
    fn lock(&self) -> &dyn LockingMechanism {
        &self.lock
    }

    fn read_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Certificate>> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        Ok(self.certificates()?.get(&fingerprint).cloned())
    }

    fn read_by_special_name(&self, name: &str) -> StoreResult<Option<KeyMaterial>> {
        let name = SpecialName::parse(name)?;
        Ok(self.special()?.get(&name).cloned())
    }

    fn read_items(&self) -> StoreResult<Items<'_>> {
        let mut fingerprints: Vec<Fingerprint> = self.certificates()?.keys().copied().collect();
        fingerprints.sort();
        debug!(count = fingerprints.len(), "enumerating in-memory certificates");

        Ok(Box::new(fingerprints.into_iter().filter_map(move |fingerprint| {
            match self.certificates() {
                Ok(map) => map.get(&fingerprint).cloned().map(Ok),
                Err(e) => Some(Err(e)),
            }
        })))
    }

    fn do_insert(
        &self,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Certificate> {
        let incoming = self.reader.read(data, None)?;
        let existing = self.certificates()?.get(incoming.fingerprint()).cloned();
        let certificate = merge_certificate(incoming, existing, merge)?.with_tag(self.clock.next());

        self.certificates_mut()?
            .insert(*certificate.fingerprint(), certificate.clone());
        debug!(
            fingerprint = %certificate.fingerprint(),
            subkeys = certificate.subkey_ids().len(),
            "certificate inserted"
        );
        Ok(certificate)
    }

    fn do_insert_special(
        &self,
        name: SpecialName,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<KeyMaterial> {
        let incoming = self.reader.read(data, None)?;
        let existing = self.special()?.get(&name).cloned();
        let material = merge.merge(incoming, existing)?.with_tag(self.clock.next());

        self.special_mut()?.insert(name, material.clone());
        debug!(
            name = %name,
            fingerprint = %material.fingerprint(),
            key = material.is_key(),
            "special entry inserted"
        );
        Ok(material)
    }

    fn tag_for_fingerprint(&self, fingerprint: &str) -> StoreResult<Tag> {
        let parsed = Fingerprint::parse(fingerprint)?;
        self.certificates()?
            .get(&parsed)
            .and_then(Certificate::tag)
            .ok_or_else(|| StoreError::MissingEntry(fingerprint.to_string()))
    }

    fn tag_for_special_name(&self, name: &str) -> StoreResult<Tag> {
        let parsed = SpecialName::parse(name)?;
        self.special()?
            .get(&parsed)
            .and_then(|material| material.as_certificate().tag())
            .ok_or_else(|| StoreError::MissingEntry(name.to_string()))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryBackend")
            .field("certificate_count", &self.len())
            .field("lock", &self.lock)
            .finish()
    }
}
