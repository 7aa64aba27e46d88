//! Durable, file-based backend.
//!
//! Entries live in the `pgp.cert.d` layout under a base directory (see
//! [`FilenameResolver`]). Several processes may share one base directory;
//! writers exclude each other through a [`FileLock`] on a lock file in the
//! base directory, readers take no lock at all.
//!
//! Tags are derived from an entry's modification time and its file identity
//! (device and inode on Unix). Change detection is therefore bounded by the
//! filesystem's timestamp resolution, except that replacing an entry by
//! rename always changes its identity.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use certd_types::{Certificate, Fingerprint, KeyMaterial, SpecialName, Tag};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{FileBackendConfig, SyncMode, WriteMode};
use crate::error::{StoreError, StoreResult};
use crate::locking::{FileLock, LockingMechanism};
use crate::reader::{KeyMaterialMerger, KeyMaterialReader};
use crate::resolver::{is_shard_name, FilenameResolver};
use crate::traits::{check_fingerprint, merge_certificate, Backend, Items};

/// Spreads file identities over the whole tag range before mixing them with
/// the modification time.
const IDENTITY_MIX: u64 = 0x9e37_79b9_7f4a_7c15;

/// Backend storing every entry as one file below a base directory.
pub struct FileBackend {
    resolver: FilenameResolver,
    lock: FileLock,
    reader: Arc<dyn KeyMaterialReader>,
    config: FileBackendConfig,
}

impl FileBackend {
    /// Open the store at `base_dir`, creating the directory if needed.
    ///
    /// Fails with `NotAStore` if `base_dir` exists but is not a directory,
    /// and with `InvalidConfig` if the lock file name could collide with an
    /// entry.
    pub fn open(
        base_dir: impl Into<PathBuf>,
        reader: Arc<dyn KeyMaterialReader>,
        config: FileBackendConfig,
    ) -> StoreResult<Self> {
        let base_dir = base_dir.into();
        validate_lock_file_name(&config.lock_file_name)?;

        match fs::metadata(&base_dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(StoreError::NotAStore(base_dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&base_dir)?;
                debug!(base = %base_dir.display(), "created certificate directory");
            }
            Err(e) => return Err(e.into()),
        }

        let lock = FileLock::new(base_dir.join(&config.lock_file_name));
        Ok(Self {
            resolver: FilenameResolver::new(base_dir),
            lock,
            reader,
            config,
        })
    }

    /// Open the store at `base_dir` with the default configuration.
    pub fn with_defaults(
        base_dir: impl Into<PathBuf>,
        reader: Arc<dyn KeyMaterialReader>,
    ) -> StoreResult<Self> {
        Self::open(base_dir, reader, FileBackendConfig::default())
    }

    pub fn base_dir(&self) -> &Path {
        self.resolver.base_dir()
    }

    pub fn resolver(&self) -> &FilenameResolver {
        &self.resolver
    }

    pub fn config(&self) -> &FileBackendConfig {
        &self.config
    }

    fn decode(&self, file: File, tag: Tag) -> StoreResult<KeyMaterial> {
        let mut data = BufReader::new(file);
        self.reader.read(&mut data, Some(tag))
    }

    fn read_fingerprint(&self, fingerprint: &Fingerprint) -> StoreResult<Option<Certificate>> {
        self.read_certificate_at(&self.resolver.fingerprint_file(fingerprint), fingerprint)
    }

    fn read_certificate_at(
        &self,
        path: &Path,
        expected: &Fingerprint,
    ) -> StoreResult<Option<Certificate>> {
        let Some((file, tag)) = open_tagged(path)? else {
            return Ok(None);
        };
        let certificate = match self.decode(file, tag)? {
            KeyMaterial::Certificate(certificate) => certificate,
            KeyMaterial::Key(_) => {
                return Err(StoreError::BadData(format!(
                    "{} holds secret key material",
                    path.display()
                )))
            }
        };
        check_fingerprint(expected, certificate.fingerprint())?;
        Ok(Some(certificate))
    }

    fn read_special(&self, name: SpecialName) -> StoreResult<Option<KeyMaterial>> {
        let key_path = self.resolver.special_key_file(name);
        let cert_path = self.resolver.special_cert_file(name);

        if let Some((file, key_tag)) = open_tagged(&key_path)? {
            let key = match self.decode(file, key_tag)? {
                KeyMaterial::Key(key) => key,
                KeyMaterial::Certificate(_) => {
                    return Err(StoreError::BadData(format!(
                        "{} holds a certificate, not a secret key",
                        key_path.display()
                    )))
                }
            };
            let cert_tag = tag_at(&cert_path)?.unwrap_or(key_tag);
            return Ok(Some(key.with_tags(key_tag, cert_tag).into()));
        }

        // Older stores keep a key in the certificate-form file itself; the
        // next write splits it into `<name>.key` and `<name>`.
        let Some((file, tag)) = open_tagged(&cert_path)? else {
            return Ok(None);
        };
        match self.decode(file, tag)? {
            KeyMaterial::Key(key) => {
                debug!(path = %cert_path.display(), "secret key stored without key file");
                Ok(Some(key.with_tags(tag, tag).into()))
            }
            certificate => Ok(Some(certificate)),
        }
    }

    /// Replace the file at `path` with `data` and return its new tag.
    fn write_entry(&self, path: &Path, data: &[u8]) -> StoreResult<Tag> {
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::NotAStore(path.to_path_buf()))?;
        fs::create_dir_all(parent)?;
        let sync = self.config.sync_mode == SyncMode::EveryWrite;

        let file = match self.config.write_mode {
            WriteMode::Atomic => {
                let mut temp = NamedTempFile::new_in(parent)?;
                temp.write_all(data)?;
                if sync {
                    temp.as_file().sync_all()?;
                }
                temp.persist(path).map_err(|e| StoreError::Io(e.error))?
            }
            WriteMode::InPlace => {
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)?;
                file.write_all(data)?;
                if sync {
                    file.sync_all()?;
                }
                file
            }
        };
        Ok(tag_of(&file.metadata()?))
    }
}

impl Backend for FileBackend {
    fn lock(&self) -> &dyn LockingMechanism {
        &self.lock
    }

    fn read_by_fingerprint(&self, fingerprint: &str) -> StoreResult<Option<Certificate>> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        self.read_fingerprint(&fingerprint)
    }

    fn read_by_special_name(&self, name: &str) -> StoreResult<Option<KeyMaterial>> {
        self.read_special(SpecialName::parse(name)?)
    }

    fn read_items(&self) -> StoreResult<Items<'_>> {
        let mut pending = Vec::new();
        for entry in shard_walker(self.base_dir()) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.io_error().is_some_and(|err| err.kind() == io::ErrorKind::NotFound) => {
                    warn!(error = %e, "directory vanished during enumeration; skipping");
                    continue;
                }
                Err(e) => return Err(io::Error::from(e).into()),
            };
            if entry.depth() != 2 || !entry.file_type().is_file() {
                continue;
            }
            if let Some(fingerprint) = self.resolver.fingerprint_for_file(entry.path()) {
                pending.push((fingerprint, entry.into_path()));
            }
        }
        debug!(
            base = %self.base_dir().display(),
            count = pending.len(),
            "enumerating stored certificates"
        );

        Ok(Box::new(pending.into_iter().filter_map(
            move |(fingerprint, path)| match self.read_certificate_at(&path, &fingerprint) {
                Ok(Some(certificate)) => Some(Ok(certificate)),
                Ok(None) => {
                    warn!(path = %path.display(), "entry vanished during enumeration; skipping");
                    None
                }
                Err(e) => Some(Err(e)),
            },
        )))
    }

    fn do_insert(
        &self,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<Certificate> {
        let incoming = self.reader.read(data, None)?;
        let existing = self.read_fingerprint(incoming.fingerprint())?;
        let certificate = merge_certificate(incoming, existing, merge)?;

        let path = self.resolver.fingerprint_file(certificate.fingerprint());
        let tag = self.write_entry(&path, certificate.data())?;
        debug!(
            fingerprint = %certificate.fingerprint(),
            tag = %tag,
            subkeys = certificate.subkey_ids().len(),
            "certificate written"
        );
        Ok(certificate.with_tag(tag))
    }

    fn do_insert_special(
        &self,
        name: SpecialName,
        data: &mut dyn Read,
        merge: &dyn KeyMaterialMerger,
    ) -> StoreResult<KeyMaterial> {
        let incoming = self.reader.read(data, None)?;
        let existing = self.read_special(name)?;
        let merged = merge.merge(incoming, existing)?;

        let key_path = self.resolver.special_key_file(name);
        let cert_path = self.resolver.special_cert_file(name);
        let material: KeyMaterial = match merged {
            KeyMaterial::Key(key) => {
                let key_tag = self.write_entry(&key_path, key.data())?;
                let cert_tag = self.write_entry(&cert_path, key.certificate().data())?;
                key.with_tags(key_tag, cert_tag).into()
            }
            KeyMaterial::Certificate(certificate) => {
                let tag = self.write_entry(&cert_path, certificate.data())?;
                remove_if_present(&key_path)?;
                certificate.with_tag(tag).into()
            }
        };
        debug!(
            name = %name,
            fingerprint = %material.fingerprint(),
            key = material.is_key(),
            "special entry written"
        );
        Ok(material)
    }

    fn tag_for_fingerprint(&self, fingerprint: &str) -> StoreResult<Tag> {
        let path = self.resolver.cert_file_by_fingerprint(fingerprint)?;
        tag_at(&path)?.ok_or_else(|| StoreError::MissingEntry(fingerprint.to_string()))
    }

    fn tag_for_special_name(&self, name: &str) -> StoreResult<Tag> {
        if let Some(tag) = tag_at(&self.resolver.cert_file_by_special_name(name)?)? {
            return Ok(tag);
        }
        tag_at(&self.resolver.key_file_by_special_name(name)?)?
            .ok_or_else(|| StoreError::MissingEntry(name.to_string()))
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("base_dir", &self.base_dir())
            .field("lock", &self.lock)
            .field("config", &self.config)
            .finish()
    }
}

fn validate_lock_file_name(name: &str) -> StoreResult<()> {
    let collides = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || is_shard_name(name)
        || SpecialName::lookup(name.strip_suffix(".key").unwrap_or(name)).is_some();
    if collides {
        return Err(StoreError::InvalidConfig(format!(
            "unusable lock file name {name:?}"
        )));
    }
    Ok(())
}

/// Walks the base directory and its fan-out directories only.
///
/// Yields the base directory and the shard directories themselves besides
/// the depth 2 entries; other directories below the base are never entered.
fn shard_walker(base_dir: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    WalkDir::new(base_dir)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() != 1
                || (entry.file_type().is_dir()
                    && entry.file_name().to_str().is_some_and(is_shard_name))
        })
}

/// Open `path` for reading together with the tag of the opened file.
fn open_tagged(path: &Path) -> StoreResult<Option<(File, Tag)>> {
    match File::open(path) {
        Ok(file) => {
            let tag = tag_of(&file.metadata()?);
            Ok(Some((file, tag)))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn tag_at(path: &Path) -> StoreResult<Option<Tag>> {
    match fs::metadata(path) {
        Ok(meta) => Ok(Some(tag_of(&meta))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn tag_of(meta: &fs::Metadata) -> Tag {
    let modified = meta
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|since| since.as_nanos() as u64)
        .unwrap_or_default();
    Tag::from_raw(modified ^ file_identity(meta).wrapping_mul(IDENTITY_MIX))
}

#[cfg(unix)]
fn file_identity(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino() ^ meta.dev().rotate_left(32)
}

#[cfg(not(unix))]
fn file_identity(meta: &fs::Metadata) -> u64 {
    meta.len()
}

fn remove_if_present(path: &Path) -> StoreResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
