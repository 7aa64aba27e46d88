//! Mapping from identifiers to storage locations.
//!
//! Layout rules:
//! - A fingerprint `ffff…` (40 lowercase hex characters) lives at
//!   `<base>/<first 2 hex chars>/<remaining 38 hex chars>`.
//! - A special name `name` lives at `<base>/<name>` (certificate form) or
//!   `<base>/<name>.key` (secret key form).
//!
//! Resolution is pure: no I/O, no side effects.

use std::path::{Path, PathBuf};

use certd_types::{is_fingerprint, Fingerprint, SpecialName, TypeError};

/// Length of the fan-out directory name.
const SHARD_LEN: usize = 2;

/// Suffix of the secret key form of a special name.
const KEY_SUFFIX: &str = ".key";

/// Resolves fingerprints and special names to paths below a base directory.
#[derive(Clone, Debug)]
pub struct FilenameResolver {
    base_dir: PathBuf,
}

impl FilenameResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Location of the certificate addressed by the lowercase hex
    /// `fingerprint`.
    pub fn cert_file_by_fingerprint(&self, fingerprint: &str) -> Result<PathBuf, TypeError> {
        if !is_fingerprint(fingerprint) {
            return Err(TypeError::InvalidFingerprint(fingerprint.to_string()));
        }
        let (shard, rest) = fingerprint.split_at(SHARD_LEN);
        Ok(self.base_dir.join(shard).join(rest))
    }

    /// Location of the certificate form of a special name.
    pub fn cert_file_by_special_name(&self, name: &str) -> Result<PathBuf, TypeError> {
        SpecialName::parse(name).map(|name| self.special_cert_file(name))
    }

    /// Location of the secret key form of a special name.
    pub fn key_file_by_special_name(&self, name: &str) -> Result<PathBuf, TypeError> {
        SpecialName::parse(name).map(|name| self.special_key_file(name))
    }

    pub fn fingerprint_file(&self, fingerprint: &Fingerprint) -> PathBuf {
        let hex = fingerprint.to_hex();
        let (shard, rest) = hex.split_at(SHARD_LEN);
        self.base_dir.join(shard).join(rest)
    }

    pub fn special_cert_file(&self, name: SpecialName) -> PathBuf {
        self.base_dir.join(name.as_str())
    }

    pub fn special_key_file(&self, name: SpecialName) -> PathBuf {
        self.base_dir.join(format!("{}{KEY_SUFFIX}", name.as_str()))
    }

    /// Inverse of [`FilenameResolver::fingerprint_file`]: the fingerprint
    /// stored at `path`, if `path` is a fan-out location of this base
    /// directory.
    pub fn fingerprint_for_file(&self, path: &Path) -> Option<Fingerprint> {
        let rest = path.file_name()?.to_str()?;
        let shard_dir = path.parent()?;
        if shard_dir.parent()? != self.base_dir.as_path() {
            return None;
        }
        let shard = shard_dir.file_name()?.to_str()?;
        if !is_shard_name(shard) {
            return None;
        }
        Fingerprint::parse(&format!("{shard}{rest}")).ok()
    }
}

/// Returns `true` if `name` is a valid fan-out directory name.
pub fn is_shard_name(name: &str) -> bool {
    name.len() == SHARD_LEN && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HARRY: &str = "23578fd17f207fdf62f7976c4e9d98917ad84522";

    fn resolver() -> FilenameResolver {
        FilenameResolver::new("/var/certd")
    }

    #[test]
    fn fingerprint_fans_out_by_first_two_chars() {
        let path = resolver().cert_file_by_fingerprint(HARRY).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/var/certd/23/578fd17f207fdf62f7976c4e9d98917ad84522")
        );
    }

    #[test]
    fn typed_and_string_resolution_agree() {
        let fp = Fingerprint::parse(HARRY).unwrap();
        assert_eq!(
            resolver().fingerprint_file(&fp),
            resolver().cert_file_by_fingerprint(HARRY).unwrap()
        );
    }

    #[test]
    fn rejects_short_fingerprint() {
        let err = resolver()
            .cert_file_by_fingerprint("23578fd17f207fdf62f7976c4e9d98917ad")
            .unwrap_err();
        assert!(matches!(err, TypeError::InvalidFingerprint(_)));
    }

    #[test]
    fn rejects_non_hex_fingerprint() {
        let bad = format!("XYZ{}", &HARRY[3..]);
        assert!(resolver().cert_file_by_fingerprint(&bad).is_err());
    }

    #[test]
    fn special_name_is_flat() {
        assert_eq!(
            resolver().cert_file_by_special_name("trust-root").unwrap(),
            PathBuf::from("/var/certd/trust-root")
        );
        assert_eq!(
            resolver().key_file_by_special_name("trust-root").unwrap(),
            PathBuf::from("/var/certd/trust-root.key")
        );
    }

    #[test]
    fn unknown_special_name_is_rejected() {
        assert!(resolver().cert_file_by_special_name("invalid").is_err());
        assert!(resolver().key_file_by_special_name("invalid").is_err());
    }

    #[test]
    fn resolution_is_idempotent() {
        let r = resolver();
        assert_eq!(
            r.cert_file_by_fingerprint(HARRY).unwrap(),
            r.cert_file_by_fingerprint(HARRY).unwrap()
        );
    }

    #[test]
    fn fingerprint_for_file_inverts_layout() {
        let r = resolver();
        let fp = Fingerprint::parse(HARRY).unwrap();
        assert_eq!(r.fingerprint_for_file(&r.fingerprint_file(&fp)), Some(fp));
    }

    #[test]
    fn fingerprint_for_file_ignores_other_files() {
        let r = resolver();
        assert_eq!(r.fingerprint_for_file(Path::new("/var/certd/trust-root")), None);
        assert_eq!(r.fingerprint_for_file(Path::new("/var/certd/writelock")), None);
        assert_eq!(r.fingerprint_for_file(Path::new("/var/certd/23/.tmpAbC123")), None);
        assert_eq!(
            r.fingerprint_for_file(Path::new("/other/23/578fd17f207fdf62f7976c4e9d98917ad84522")),
            None
        );
        assert_eq!(
            r.fingerprint_for_file(Path::new("/var/certd/ZZ/578fd17f207fdf62f7976c4e9d98917ad84522")),
            None
        );
    }

    #[test]
    fn shard_names() {
        assert!(is_shard_name("5e"));
        assert!(!is_shard_name("5E"));
        assert!(!is_shard_name("5e7"));
        assert!(!is_shard_name("trust-root"));
    }
}
