//! Canonical JSON tree model for fingerprint inputs, structural diffing, and
//! the path-set/strong-fingerprint merge that the cache-miss analyzer (C4)
//! runs its comparisons over.
//!
//! Hand-written rather than built on a generic JSON-diff crate: the merge in
//! [`merge`] needs a strict 1:1 relation between a path and its observed
//! input that a general-purpose diff library has no notion of.

mod diff;
mod error;
mod merge;
mod node;
mod observed;

pub use diff::{diff_path_sets, diff_strong_fingerprints, diff_weak_fingerprints, print_tree_diff, FingerprintAspectDiff};
pub use error::{Result, TreeError};
pub use merge::{merge_strong_fingerprint_and_path_set_trees, MISSING_DIR_MEMBERS_MARKER};
pub use node::{deserialize, from_value, JsonNode};
pub use observed::{ObservedInput, OBSERVED_NODE};
