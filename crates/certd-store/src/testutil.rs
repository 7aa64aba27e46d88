//! Fixtures shared by the store's unit tests.
//!
//! Real OpenPGP parsing is out of scope for this crate, so tests encode key
//! material as small JSON documents and decode them with [`FixtureReader`].

use std::io::Read;
use std::sync::Arc;

use certd_types::{Certificate, Fingerprint, Key, KeyMaterial, SubkeyId, Tag};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::reader::KeyMaterialReader;

/// Secret key fixture.
pub const HARRY_FP: &str = "23578fd17f207fdf62f7976c4e9d98917ad84522";
pub const RON_FP: &str = "b798af186bfe4c19902d49505647f00137ef4c41";
pub const CEDRIC_FP: &str = "5e75bf20646bc1a98d3b1bc2fe9cd472987c4021";

pub const HARRY_SUBKEYS: &[u64] = &[0x62f7_976c_4e9d_9891, 0x1b7a_8ea9_de8a_8f6c];
pub const RON_SUBKEYS: &[u64] = &[0x5056_4700_137e_f4c4, 0x2e51_7f0b_1c6d_9a02];
pub const CEDRIC_SUBKEYS: &[u64] = &[0xfe9c_d472_987c_4021, 0x2e51_7f0b_1c6d_9a02];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum FixtureKind {
    Cert,
    Key,
}

#[derive(Debug, Serialize, Deserialize)]
struct Fixture {
    kind: FixtureKind,
    fingerprint: String,
    #[serde(default)]
    subkeys: Vec<u64>,
    body: String,
}

fn encode(kind: FixtureKind, fingerprint: &str, subkeys: &[u64], body: &str) -> Vec<u8> {
    let fixture = Fixture {
        kind,
        fingerprint: fingerprint.to_string(),
        subkeys: subkeys.to_vec(),
        body: body.to_string(),
    };
    serde_json::to_vec(&fixture).expect("fixture serializes")
}

pub fn cert_bytes(fingerprint: &str, subkeys: &[u64], body: &str) -> Vec<u8> {
    encode(FixtureKind::Cert, fingerprint, subkeys, body)
}

/// A key fixture. Its embedded certificate is the [`cert_bytes`] fixture
/// with the same fields.
pub fn key_bytes(fingerprint: &str, subkeys: &[u64], body: &str) -> Vec<u8> {
    encode(FixtureKind::Key, fingerprint, subkeys, body)
}

pub fn harry_key() -> Vec<u8> {
    key_bytes(HARRY_FP, HARRY_SUBKEYS, "harry")
}

pub fn harry_cert() -> Vec<u8> {
    cert_bytes(HARRY_FP, HARRY_SUBKEYS, "harry")
}

pub fn ron_cert() -> Vec<u8> {
    cert_bytes(RON_FP, RON_SUBKEYS, "ron")
}

pub fn cedric_cert() -> Vec<u8> {
    cert_bytes(CEDRIC_FP, CEDRIC_SUBKEYS, "cedric")
}

/// Fingerprint of the `n`th generated certificate.
pub fn numbered_fp(n: u32) -> String {
    format!("{:040x}", u64::from(n) + 1)
}

/// A generated certificate with one subkey whose id is `n`.
pub fn numbered_cert(n: u32) -> Vec<u8> {
    cert_bytes(&numbered_fp(n), &[u64::from(n)], &format!("cert {n}"))
}

/// Decodes JSON fixtures.
#[derive(Clone, Copy, Debug, Default)]
pub struct FixtureReader;

impl KeyMaterialReader for FixtureReader {
    fn read(&self, data: &mut dyn Read, tag: Option<Tag>) -> StoreResult<KeyMaterial> {
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;
        let fixture: Fixture =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::BadData(e.to_string()))?;
        let fingerprint = Fingerprint::parse(&fixture.fingerprint)
            .map_err(|e| StoreError::BadData(e.to_string()))?;
        let subkey_ids = fixture.subkeys.iter().copied().map(SubkeyId).collect();

        let material: KeyMaterial = match fixture.kind {
            FixtureKind::Cert => Certificate::new(fingerprint, bytes, subkey_ids).into(),
            FixtureKind::Key => {
                let embedded = cert_bytes(&fixture.fingerprint, &fixture.subkeys, &fixture.body);
                Key::new(bytes, Certificate::new(fingerprint, embedded, subkey_ids)).into()
            }
        };
        Ok(match tag {
            Some(tag) => material.with_tag(tag),
            None => material,
        })
    }
}

pub fn reader() -> Arc<dyn KeyMaterialReader> {
    Arc::new(FixtureReader)
}

/// Route `tracing` output through the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
