//! The `StoreDescriptor`: a manifest of the store's files
//! keyed by relative path, plus enough trace info to tell a human which
//! build produced it.

use serde::{Deserialize, Serialize};

use fingerprint_store::ContentHash;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptorFileEntry {
    pub key: String,
    pub content_hash: ContentHash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreDescriptor {
    pub trace_info: serde_json::Value,
    pub friendly_name: String,
    pub contents: Vec<DescriptorFileEntry>,
}
