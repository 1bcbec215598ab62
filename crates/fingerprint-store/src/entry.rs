use serde::{Deserialize, Serialize};

use crate::hash::ContentHash;

/// The `pipToFingerprintKeys` value: the three hashes that key the other
/// entry families for one pip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipFingerprintKeys {
    pub weak_fingerprint: ContentHash,
    pub strong_fingerprint: ContentHash,
    pub path_set_hash: ContentHash,
}

/// A pip's full fingerprint record, assembled from the families it spans
/// (logically one entry, physically spread across `pipToFingerprintKeys`,
/// `weakFingerprintToInputs`, `strongFingerprintToInputs`, and
/// `pathSetHashToInputs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintStoreEntry {
    pub formatted_semi_stable_hash: String,
    pub keys: PipFingerprintKeys,
    pub weak_fingerprint_inputs: serde_json::Value,
    pub strong_fingerprint_inputs: serde_json::Value,
    /// `None` if no blob is currently stored under `keys.path_set_hash` —
    /// possible when an earlier put chose `store_path_set = false` and no
    /// other pip has since written that hash (see
    /// [`super::Store::put_fingerprint_store_entry`]).
    pub path_set_inputs: Option<serde_json::Value>,
}
