//! Subkey lookup for the shared PGP certificate directory.
//!
//! A certificate is addressed by the fingerprint of its primary key, but
//! messages and signatures usually name a *subkey* by its 64-bit key id.
//! The subkey lookup is a secondary index mapping each key id to the set of
//! certificates containing it. The directory updates it after every
//! successful insert, inside the write lock.
//!
//! # Backends
//!
//! - [`InMemorySubkeyLookup`]: `HashMap`-based index for tests and embedding
//!
//! Durable implementations (for example a database keyed by integer subkey
//! id) live outside this workspace and only need to implement
//! [`SubkeyLookup`].

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{LookupError, LookupResult};
pub use memory::InMemorySubkeyLookup;
pub use traits::SubkeyLookup;
