//! Key material: certificates (public keys) and secret keys.
//!
//! The store never interprets key material. An injected reader decodes the
//! raw bytes once and reports the fingerprint and subkey ids; the store keeps
//! those next to the untouched encoding.

use bytes::Bytes;

use crate::fingerprint::{Fingerprint, SubkeyId};
use crate::tag::Tag;

/// An OpenPGP certificate (public key).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    fingerprint: Fingerprint,
    data: Bytes,
    subkey_ids: Vec<SubkeyId>,
    tag: Option<Tag>,
}

impl Certificate {
    /// Create an untagged certificate from its encoding and decoded metadata.
    pub fn new(fingerprint: Fingerprint, data: impl Into<Bytes>, subkey_ids: Vec<SubkeyId>) -> Self {
        Self {
            fingerprint,
            data: data.into(),
            subkey_ids,
            tag: None,
        }
    }

    /// Return a copy of this certificate annotated with `tag`.
    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The encoded certificate, exactly as stored.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Key ids of all keys in the certificate, in reader order.
    pub fn subkey_ids(&self) -> &[SubkeyId] {
        &self.subkey_ids
    }

    /// The tag assigned by the backend, if this value was read or written
    /// through one.
    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }
}

/// An OpenPGP secret key together with the certificate derived from it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key {
    data: Bytes,
    certificate: Certificate,
    tag: Option<Tag>,
}

impl Key {
    /// Create an untagged key from its encoding and the embedded certificate.
    pub fn new(data: impl Into<Bytes>, certificate: Certificate) -> Self {
        Self {
            data: data.into(),
            certificate,
            tag: None,
        }
    }

    /// Tag both the key and its embedded certificate with `tag`.
    pub fn with_tag(self, tag: Tag) -> Self {
        self.with_tags(tag, tag)
    }

    /// Tag the key and its embedded certificate independently.
    ///
    /// Backends that persist the two parts separately use this so that each
    /// part carries the tag of its own storage location.
    pub fn with_tags(mut self, key_tag: Tag, certificate_tag: Tag) -> Self {
        self.tag = Some(key_tag);
        self.certificate = self.certificate.with_tag(certificate_tag);
        self
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        self.certificate.fingerprint()
    }

    /// The encoded secret key, exactly as stored.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn subkey_ids(&self) -> &[SubkeyId] {
        self.certificate.subkey_ids()
    }

    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    /// The public certificate embedded in this key.
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn into_certificate(self) -> Certificate {
        self.certificate
    }
}

/// Either a [`Certificate`] or a [`Key`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyMaterial {
    Certificate(Certificate),
    Key(Key),
}

impl KeyMaterial {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            Self::Certificate(cert) => cert.fingerprint(),
            Self::Key(key) => key.fingerprint(),
        }
    }

    /// The stored encoding: certificate bytes or secret key bytes.
    pub fn data(&self) -> &Bytes {
        match self {
            Self::Certificate(cert) => cert.data(),
            Self::Key(key) => key.data(),
        }
    }

    pub fn subkey_ids(&self) -> &[SubkeyId] {
        match self {
            Self::Certificate(cert) => cert.subkey_ids(),
            Self::Key(key) => key.subkey_ids(),
        }
    }

    pub fn tag(&self) -> Option<Tag> {
        match self {
            Self::Certificate(cert) => cert.tag(),
            Self::Key(key) => key.tag(),
        }
    }

    /// Returns `true` if this is secret key material.
    pub fn is_key(&self) -> bool {
        matches!(self, Self::Key(_))
    }

    /// The certificate view of this material. Total: a key yields its
    /// embedded certificate, a certificate yields itself.
    pub fn as_certificate(&self) -> &Certificate {
        match self {
            Self::Certificate(cert) => cert,
            Self::Key(key) => key.certificate(),
        }
    }

    pub fn into_certificate(self) -> Certificate {
        match self {
            Self::Certificate(cert) => cert,
            Self::Key(key) => key.into_certificate(),
        }
    }

    /// Tag this material; for a key, the embedded certificate too.
    pub fn with_tag(self, tag: Tag) -> Self {
        match self {
            Self::Certificate(cert) => Self::Certificate(cert.with_tag(tag)),
            Self::Key(key) => Self::Key(key.with_tag(tag)),
        }
    }
}

impl From<Certificate> for KeyMaterial {
    fn from(cert: Certificate) -> Self {
        Self::Certificate(cert)
    }
}

impl From<Key> for KeyMaterial {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> Fingerprint {
        Fingerprint::parse("23578fd17f207fdf62f7976c4e9d98917ad84522").unwrap()
    }

    fn certificate() -> Certificate {
        Certificate::new(fingerprint(), b"cert".to_vec(), vec![SubkeyId(1), SubkeyId(2)])
    }

    #[test]
    fn certificate_is_its_own_certificate() {
        let material = KeyMaterial::from(certificate());
        assert!(!material.is_key());
        assert_eq!(material.as_certificate(), &certificate());
        assert_eq!(material.into_certificate(), certificate());
    }

    #[test]
    fn key_yields_embedded_certificate() {
        let material = KeyMaterial::from(Key::new(b"secret".to_vec(), certificate()));
        assert!(material.is_key());
        assert_eq!(material.fingerprint(), &fingerprint());
        assert_eq!(material.data().as_ref(), b"secret");
        assert_eq!(material.as_certificate().data().as_ref(), b"cert");
        assert_eq!(material.subkey_ids(), &[SubkeyId(1), SubkeyId(2)]);
    }

    #[test]
    fn new_material_is_untagged() {
        assert!(certificate().tag().is_none());
        assert!(Key::new(b"k".to_vec(), certificate()).tag().is_none());
    }

    #[test]
    fn key_with_tag_tags_both_parts() {
        let key = Key::new(b"k".to_vec(), certificate()).with_tag(Tag::from_raw(7));
        assert_eq!(key.tag(), Some(Tag::from_raw(7)));
        assert_eq!(key.certificate().tag(), Some(Tag::from_raw(7)));
    }

    #[test]
    fn key_tags_can_differ() {
        let key = Key::new(b"k".to_vec(), certificate())
            .with_tags(Tag::from_raw(1), Tag::from_raw(2));
        let material = KeyMaterial::from(key);
        assert_eq!(material.tag(), Some(Tag::from_raw(1)));
        assert_eq!(material.as_certificate().tag(), Some(Tag::from_raw(2)));
    }
}
