use serde::{Deserialize, Serialize};

use fingerprint_store::ContentHash;

use crate::node::JsonNode;

/// Node name used for the per-path observed-input detail inside a merged
/// strong-fp/path-set tree. `values` holds `[kind_name, hash_hex?]`.
pub const OBSERVED_NODE: &str = "Observed";

/// Outcome of observing one path during a pip's execution (glossary:
/// "Observed input"). Only `FileContentRead` and `DirectoryEnumeration`
/// carry a hash; only `DirectoryEnumeration` expands into a `Members`
/// subtree when merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservedInput {
    AbsentPathProbe,
    ExistingFileProbe,
    ExistingDirectoryProbe,
    FileContentRead { hash: ContentHash },
    DirectoryEnumeration { members_fingerprint: ContentHash },
}

impl ObservedInput {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObservedInput::AbsentPathProbe => "AbsentPathProbe",
            ObservedInput::ExistingFileProbe => "ExistingFileProbe",
            ObservedInput::ExistingDirectoryProbe => "ExistingDirectoryProbe",
            ObservedInput::FileContentRead { .. } => "FileContentRead",
            ObservedInput::DirectoryEnumeration { .. } => "DirectoryEnumeration",
        }
    }

    pub fn hash(&self) -> Option<ContentHash> {
        match self {
            ObservedInput::FileContentRead { hash } => Some(*hash),
            ObservedInput::DirectoryEnumeration { members_fingerprint } => Some(*members_fingerprint),
            _ => None,
        }
    }

    /// Render as the `Observed` leaf consumed by
    /// [`crate::merge::merge_strong_fingerprint_and_path_set_trees`].
    pub fn to_node(&self) -> JsonNode {
        let mut values = vec![self.kind_name().to_string()];
        if let Some(hash) = self.hash() {
            values.push(hash.to_hex());
        }
        JsonNode::leaf(OBSERVED_NODE, values)
    }
}
