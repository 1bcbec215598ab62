//! Store publish/retrieve (C6): uploads a built fingerprint store to a
//! content-addressed artifact cache and downloads a previous one by
//! branch/commit key inference. Grounded on `aivcs_core::cas::fs::FsCasStore`
//! for the cache side and `aivcs_core::deploy`'s bounded-concurrency
//! upload/download loops, generalized from a single-artifact deploy to a
//! whole-directory store with a descriptor manifest.

mod cache;
mod candidates;
mod descriptor;
pub mod fakes;
mod lookup;
mod publish;
mod retrieve;
mod walk;

pub mod error;

pub use cache::{ArtifactCache, CacheEntry, FsArtifactCache};
pub use candidates::{sanitize, AdoCandidateKeys, CandidateKeys, GitHashesCandidateKeys, GitLog, KeyCandidate};
pub use descriptor::{DescriptorFileEntry, StoreDescriptor};
pub use error::{Result, SyncError};
pub use lookup::lookup_fingerprint;
pub use publish::{publish_store, PublishOutcome, PublishRequest};
pub use retrieve::{retrieve_by_candidates, retrieve_by_key, RetrieveOutcome};
pub use walk::{walk_files, WalkedFile};
