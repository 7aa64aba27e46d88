use std::collections::BTreeSet;

use certd_types::{Fingerprint, SubkeyId};

use crate::error::LookupResult;

/// Index from subkey id to the fingerprints of certificates containing it.
///
/// Implementations must be thread-safe. Associations are only ever added:
/// storing the subkey ids of a certificate again is idempotent, and nothing
/// is removed when a certificate is updated.
pub trait SubkeyLookup: Send + Sync {
    /// Fingerprints of all certificates known to contain `subkey_id`.
    ///
    /// Returns an empty set if the id is unknown.
    fn certificate_fingerprints_for_subkey_id(
        &self,
        subkey_id: SubkeyId,
    ) -> LookupResult<BTreeSet<Fingerprint>>;

    /// Record that the certificate `fingerprint` contains `subkey_ids`.
    fn store_certificate_subkey_ids(
        &self,
        fingerprint: &Fingerprint,
        subkey_ids: &[SubkeyId],
    ) -> LookupResult<()>;
}
