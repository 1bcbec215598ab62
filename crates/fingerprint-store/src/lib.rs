//! Typed fingerprint store.
//!
//! Sits on top of [`fp_kv`]'s raw column families and gives callers the
//! entry-family operations from the fingerprint store's data model: pip
//! fingerprint keys, weak/strong/path-set input blobs, content-hash-keyed
//! directory-membership JSON, the pip-unique-output-hash lookup table, and
//! the single ordered cache-miss list. Every fallible operation wraps the
//! blocking `fp-kv` call in [`tokio::task::spawn_blocking`] so async callers
//! never block their executor on RocksDB I/O.

mod cache_miss;
mod entry;
mod error;
mod families;
mod format;
mod gc;
mod hash;
mod ids;
mod store;

pub use cache_miss::{CacheMissKind, CacheMissRecord};
pub use entry::{FingerprintStoreEntry, PipFingerprintKeys};
pub use error::{Result, StoreError};
pub use format::{FormatHeader, CURRENT_FORMAT_VERSION, CURRENT_LOOKUP_VERSION};
pub use hash::{CanonicalHasher, ContentHash};
pub use ids::{NodeId, PipId};
pub use store::{Store, StoreMode};
