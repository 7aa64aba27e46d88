//! Shared PGP certificate directory.
//!
//! This crate implements a local store for OpenPGP certificates and one
//! distinguished trust-root key, following the shared `pgp.cert.d` layout.
//! Certificates are addressed by fingerprint and fanned out into
//! two-hex-character subdirectories; special names such as `trust-root` are
//! stored flat in the base directory.
//!
//! # Layout
//!
//! ```text
//! <base>/5e/75bf20646bc1a98d3b1bc2fe9cd472987c4021   certificate by fingerprint
//! <base>/trust-root                                  trust-root certificate
//! <base>/trust-root.key                              trust-root secret key
//! <base>/writelock                                   present only during a write
//! ```
//!
//! # Storage Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`FileBackend`]: durable, shareable between processes
//! - [`InMemoryBackend`]: `HashMap`-based, single process
//!
//! # Design Rules
//!
//! 1. Readers never take the write lock and never block on a writer.
//! 2. At most one writer at a time, across threads and processes.
//! 3. Every entry is replaced as a whole; a reader sees the old or the new
//!    entry, never a mix. [`WriteMode::InPlace`] gives this up for
//!    compatibility with the truncate-and-copy layout writers.
//! 4. The subkey index is updated after the backend write commits and before
//!    the lock is released.
//! 5. A fingerprint that disagrees with its storage location is reported as
//!    bad data, never repaired.
//! 6. All I/O errors are propagated, never silently ignored.

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod file;
pub mod locking;
pub mod memory;
pub mod reader;
pub mod resolver;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::CachingDirectory;
pub use config::{FileBackendConfig, SyncMode, WriteMode};
pub use directory::{CertificateDirectory, Fingerprints};
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use locking::{FileLock, LockingMechanism, MonitorLock, WriteGuard};
pub use memory::InMemoryBackend;
pub use reader::{KeyMaterialMerger, KeyMaterialReader, ReplaceMerger};
pub use resolver::FilenameResolver;
pub use traits::{Backend, Items};
