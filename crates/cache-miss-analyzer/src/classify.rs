use fingerprint_store::{CacheMissKind, ContentHash, FingerprintStoreEntry};
use fp_tree::JsonNode;

use crate::model::{
    Classification, DiffFormat, DiffRendering, MismatchInfo, MismatchInfoEnvelope, MissInfo,
    SemiStableHashChange,
};

pub const DISALLOWED_FILE_ACCESSES_MARKER: &str =
    "DisallowedFileAccessesOrPipFailuresPreventCaching";

/// Non-descriptor miss kinds classify directly from a fixed table,
/// without touching either session. Returns `None` only for the three
/// descriptor kinds, which fall through to the fingerprint-diff
/// subroutine instead; the configured-uncacheable kind classifies
/// directly to `UncacheablePip` right here.
pub fn classify_plain(kind: &CacheMissKind) -> Option<(Classification, String)> {
    match kind {
        CacheMissKind::MissForCacheEntry => Some((
            Classification::DataMiss,
            "Cache entry missing from the cache.".to_string(),
        )),
        CacheMissKind::MissForProcessMetadata => Some((
            Classification::DataMiss,
            "MetaData missing from the cache.".to_string(),
        )),
        CacheMissKind::InvalidDescriptors => Some((
            Classification::InvalidDescriptors,
            "Cache returned invalid data.".to_string(),
        )),
        CacheMissKind::ArtificialMiss => Some((
            Classification::ArtificialMiss,
            "Cache miss artificially forced by user.".to_string(),
        )),
        CacheMissKind::Hit => Some((Classification::NoMiss, "Pip was a cache hit.".to_string())),
        CacheMissKind::Invalid => Some((
            Classification::Invalid,
            "Cache returned invalid data.".to_string(),
        )),
        CacheMissKind::MissForProcessOutputContent { .. } => Some((
            Classification::OutputMiss,
            "Outputs missing from the cache.".to_string(),
        )),
        // Configured-uncacheable isn't a fingerprint-diff question: the pip
        // was never eligible, regardless of whether its inputs match.
        // exempts it from marking downstream as changed, which the runtime
        // analyzer does by inspecting `miss_info.cache_miss_kind` directly
        // rather than this classification.
        CacheMissKind::MissForProcessConfiguredUncacheable => Some((
            Classification::UncacheablePip,
            "Pip is not cacheable due to its configuration.".to_string(),
        )),
        CacheMissKind::MissForDescriptorsDueToWeakFingerprints
        | CacheMissKind::MissForDescriptorsDueToStrongFingerprints
        | CacheMissKind::MissForDescriptorsDueToAugmentedWeakFingerprints => None,
    }
}

pub(crate) fn missing_outputs(kind: &CacheMissKind) -> Option<MismatchInfo> {
    match kind {
        CacheMissKind::MissForProcessOutputContent { missed_outputs } => {
            Some(MismatchInfo::MissingOutputs {
                missed_outputs: missed_outputs.clone(),
            })
        }
        _ => None,
    }
}

/// A resolved fingerprint-diff comparison, ready to be folded into a
/// [`crate::model::CacheMissAnalysisDetail`] by the caller.
pub struct DiffOutcome {
    pub result: Classification,
    pub reason: String,
    pub info: Option<MismatchInfoEnvelope>,
}

/// The five-step ordered comparison from the fingerprint-diff
/// subroutine, given the two sides' already-resolved entries and their
/// already-parsed input trees plus a directory-membership resolver for
/// each side.
#[allow(clippy::too_many_arguments)]
pub fn diff_entries(
    miss_info: &MissInfo,
    old: &FingerprintStoreEntry,
    new: &FingerprintStoreEntry,
    old_weak_tree: &JsonNode,
    new_weak_tree: &JsonNode,
    old_path_set_tree: &JsonNode,
    new_path_set_tree: &JsonNode,
    old_strong_tree: &JsonNode,
    new_strong_tree: &JsonNode,
    dir_members_old: impl Fn(ContentHash) -> Option<Vec<String>>,
    dir_members_new: impl Fn(ContentHash) -> Option<Vec<String>>,
    diff_format: DiffFormat,
) -> DiffOutcome {
    let semi_stable_hash_changed = if old.formatted_semi_stable_hash != new.formatted_semi_stable_hash
    {
        Some(SemiStableHashChange {
            old: old.formatted_semi_stable_hash.clone(),
            new: new.formatted_semi_stable_hash.clone(),
        })
    } else {
        None
    };

    let envelope = |mismatch: MismatchInfo| MismatchInfoEnvelope {
        mismatch,
        semi_stable_hash: semi_stable_hash_changed.clone(),
    };

    if old.keys.weak_fingerprint != new.keys.weak_fingerprint {
        let diff = fp_tree::diff_weak_fingerprints(
            old.keys.weak_fingerprint,
            old_weak_tree,
            new.keys.weak_fingerprint,
            new_weak_tree,
        );
        return DiffOutcome {
            result: Classification::WeakFingerprintMismatch,
            reason: "WeakFingerprints of the builds are different.".to_string(),
            info: Some(envelope(MismatchInfo::WeakFingerprintMismatch {
                diff: render(&diff.tree_diff, old_weak_tree, new_weak_tree, diff_format),
            })),
        };
    }

    if old.keys.path_set_hash != new.keys.path_set_hash {
        let diff = fp_tree::diff_path_sets(
            old.keys.path_set_hash,
            old_path_set_tree,
            new.keys.path_set_hash,
            new_path_set_tree,
        );
        return DiffOutcome {
            result: Classification::PathSetHashMismatch,
            reason: "PathSets of the builds are different.".to_string(),
            info: Some(envelope(MismatchInfo::PathSetHashMismatch {
                diff: render(&diff.tree_diff, old_path_set_tree, new_path_set_tree, diff_format),
            })),
        };
    }

    if old.keys.strong_fingerprint != new.keys.strong_fingerprint {
        let old_merged = fp_tree::merge_strong_fingerprint_and_path_set_trees(
            old_strong_tree,
            old_path_set_tree,
            dir_members_old,
        );
        let new_merged = fp_tree::merge_strong_fingerprint_and_path_set_trees(
            new_strong_tree,
            new_path_set_tree,
            dir_members_new,
        );
        let diff = fp_tree::diff_strong_fingerprints(
            old.keys.strong_fingerprint,
            &old_merged,
            new.keys.strong_fingerprint,
            &new_merged,
        );
        return DiffOutcome {
            result: Classification::StrongFingerprintMismatch,
            reason: "StrongFingerprints of the builds are different.".to_string(),
            info: Some(envelope(MismatchInfo::StrongFingerprintMismatch {
                diff: render(&diff.tree_diff, &old_merged, &new_merged, diff_format),
            })),
        };
    }

    let _ = miss_info;
    DiffOutcome {
        result: Classification::UncacheablePip,
        reason: format!(
            "Fingerprints are identical between builds. {DISALLOWED_FILE_ACCESSES_MARKER}: pip was not cacheable."
        ),
        info: Some(envelope(MismatchInfo::UncacheablePip {
            explanation: DISALLOWED_FILE_ACCESSES_MARKER.to_string(),
        })),
    }
}

fn render(tree_diff: &str, old: &JsonNode, new: &JsonNode, format: DiffFormat) -> DiffRendering {
    match format {
        DiffFormat::TreeDiff => DiffRendering::Text(tree_diff.to_string()),
        DiffFormat::CustomJson => DiffRendering::Json(serde_json::json!({
            "old": old.to_value(),
            "new": new.to_value(),
            "diffLines": tree_diff.lines().collect::<Vec<_>>(),
        })),
    }
}
