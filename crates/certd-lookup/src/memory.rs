use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use certd_types::{Fingerprint, SubkeyId};
use tracing::trace;

use crate::error::{LookupError, LookupResult};
use crate::traits::SubkeyLookup;

/// In-memory, `HashMap`-based subkey index.
///
/// Intended for tests and for in-memory directories. Contents are lost when
/// the index is dropped.
#[derive(Debug, Default)]
pub struct InMemorySubkeyLookup {
    index: RwLock<HashMap<SubkeyId, BTreeSet<Fingerprint>>>,
}

impl InMemorySubkeyLookup {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct subkey ids in the index.
    pub fn len(&self) -> usize {
        self.index.read().map(|index| index.len()).unwrap_or_default()
    }

    /// Returns `true` if no subkey id has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every association.
    pub fn clear(&self) -> LookupResult<()> {
        self.index
            .write()
            .map_err(|_| LookupError::Poisoned)?
            .clear();
        Ok(())
    }
}

impl SubkeyLookup for InMemorySubkeyLookup {
    fn certificate_fingerprints_for_subkey_id(
        &self,
        subkey_id: SubkeyId,
    ) -> LookupResult<BTreeSet<Fingerprint>> {
        let index = self.index.read().map_err(|_| LookupError::Poisoned)?;
        Ok(index.get(&subkey_id).cloned().unwrap_or_default())
    }

    fn store_certificate_subkey_ids(
        &self,
        fingerprint: &Fingerprint,
        subkey_ids: &[SubkeyId],
    ) -> LookupResult<()> {
        let mut index = self.index.write().map_err(|_| LookupError::Poisoned)?;
        for id in subkey_ids {
            index.entry(*id).or_default().insert(*fingerprint);
        }
        trace!(%fingerprint, count = subkey_ids.len(), "stored subkey ids");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(last: u8) -> Fingerprint {
        let mut bytes = [0u8; 20];
        bytes[19] = last;
        Fingerprint::from_bytes(bytes)
    }

    #[test]
    fn unknown_subkey_yields_empty_set() {
        let lookup = InMemorySubkeyLookup::new();
        assert!(lookup
            .certificate_fingerprints_for_subkey_id(SubkeyId(1))
            .unwrap()
            .is_empty());
        assert!(lookup.is_empty());
    }

    #[test]
    fn store_and_lookup() {
        let lookup = InMemorySubkeyLookup::new();
        lookup
            .store_certificate_subkey_ids(&fp(1), &[SubkeyId(10), SubkeyId(11)])
            .unwrap();

        let found = lookup.certificate_fingerprints_for_subkey_id(SubkeyId(11)).unwrap();
        assert_eq!(found, BTreeSet::from([fp(1)]));
        assert_eq!(lookup.len(), 2);
    }

    #[test]
    fn shared_subkey_maps_to_both_certificates() {
        let lookup = InMemorySubkeyLookup::new();
        lookup.store_certificate_subkey_ids(&fp(1), &[SubkeyId(7)]).unwrap();
        lookup.store_certificate_subkey_ids(&fp(2), &[SubkeyId(7)]).unwrap();

        let found = lookup.certificate_fingerprints_for_subkey_id(SubkeyId(7)).unwrap();
        assert_eq!(found, BTreeSet::from([fp(1), fp(2)]));
    }

    #[test]
    fn storing_twice_is_idempotent() {
        let lookup = InMemorySubkeyLookup::new();
        lookup.store_certificate_subkey_ids(&fp(3), &[SubkeyId(5)]).unwrap();
        lookup.store_certificate_subkey_ids(&fp(3), &[SubkeyId(5)]).unwrap();

        let found = lookup.certificate_fingerprints_for_subkey_id(SubkeyId(5)).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn clear_removes_all() {
        let lookup = InMemorySubkeyLookup::new();
        lookup.store_certificate_subkey_ids(&fp(1), &[SubkeyId(1)]).unwrap();
        lookup.clear().unwrap();
        assert!(lookup.is_empty());
    }

    #[test]
    fn concurrent_stores_are_all_visible() {
        use std::sync::Arc;
        use std::thread;

        let lookup = Arc::new(InMemorySubkeyLookup::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let lookup = Arc::clone(&lookup);
                thread::spawn(move || {
                    lookup
                        .store_certificate_subkey_ids(&fp(i), &[SubkeyId(99)])
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }

        let found = lookup.certificate_fingerprints_for_subkey_id(SubkeyId(99)).unwrap();
        assert_eq!(found.len(), 8);
    }
}
