//! Cache-miss classification and the fingerprint-diff subroutine (C4).
//!
//! [`analyze`] is the crate's one entry point: given a [`MissInfo`] and the
//! old/new [`FingerprintSession`]s, it classifies the miss and, for the
//! descriptor-driven kinds, runs the five-step ordered comparison from
//! the fingerprint-diff algorithm over [`fp_tree`]. It is exception-safe by construction —
//! [`analyze`] never returns `Err`; any internal failure is logged as
//! "cache miss analysis exception" and folded into an
//! [`Classification::AnalyzerInternalFailure`] result instead, grounded on
//! `aivcs_ci::pipeline::CiPipeline::run`'s catch-and-record-as-event
//! pattern for stage execution errors.

mod classify;
mod error;
mod model;
mod session;

pub use classify::DISALLOWED_FILE_ACCESSES_MARKER;
pub use error::{AnalyzerError, Result};
pub use model::{
    CacheMissAnalysisDetail, CacheMissAnalysisDetailAndResult, Classification, DiffFormat,
    DiffRendering, MismatchInfo, MismatchInfoEnvelope, MissInfo, SemiStableHashChange,
};
pub use session::{FingerprintSession, StoreSession};

use fingerprint_store::{ContentHash, FingerprintStoreEntry};
use fp_tree::JsonNode;

/// Classify `miss_info` and, when the miss kind requires it, diff the old
/// and new sessions' fingerprint entries. Never fails: any error is logged
/// and reported as [`Classification::AnalyzerInternalFailure`].
pub async fn analyze(
    miss_info: &MissInfo,
    old_session: &dyn FingerprintSession,
    new_session: &dyn FingerprintSession,
    diff_format: DiffFormat,
) -> CacheMissAnalysisDetailAndResult {
    match analyze_inner(miss_info, old_session, new_session, diff_format).await {
        Ok(detail_and_result) => detail_and_result,
        Err(err) => {
            tracing::error!(
                pip_id = %miss_info.pip_id,
                formatted_semi_stable_hash = %miss_info.formatted_semi_stable_hash,
                error = %err,
                "cache miss analysis exception"
            );
            CacheMissAnalysisDetailAndResult {
                result: Classification::AnalyzerInternalFailure,
                detail: CacheMissAnalysisDetail::plain(
                    miss_info.cache_miss_kind.clone(),
                    format!("cache miss analysis exception: {err}"),
                ),
            }
        }
    }
}

async fn analyze_inner(
    miss_info: &MissInfo,
    old_session: &dyn FingerprintSession,
    new_session: &dyn FingerprintSession,
    diff_format: DiffFormat,
) -> Result<CacheMissAnalysisDetailAndResult> {
    if let Some((result, reason)) = classify::classify_plain(&miss_info.cache_miss_kind) {
        let mut detail = CacheMissAnalysisDetail::plain(miss_info.cache_miss_kind.clone(), reason);
        detail.info = classify::missing_outputs(&miss_info.cache_miss_kind).map(|mismatch| MismatchInfoEnvelope {
            mismatch,
            semi_stable_hash: None,
        });
        return Ok(CacheMissAnalysisDetailAndResult { result, detail });
    }

    let old_entry = old_session
        .try_get_entry(
            miss_info.pip_unique_output_hash,
            &miss_info.formatted_semi_stable_hash,
        )
        .await?;
    let Some(old_entry) = old_entry else {
        let reason = format!(
            "Pip was not found in the previous build's fingerprint store. {}",
            classify::DISALLOWED_FILE_ACCESSES_MARKER
        );
        old_session.write_pip_line(miss_info.pip_id, &reason).await;
        return Ok(CacheMissAnalysisDetailAndResult {
            result: Classification::MissingFromOldBuild,
            detail: CacheMissAnalysisDetail::plain(miss_info.cache_miss_kind.clone(), reason),
        });
    };

    let new_entry = new_session
        .try_get_entry(
            miss_info.pip_unique_output_hash,
            &miss_info.formatted_semi_stable_hash,
        )
        .await?;
    let Some(new_entry) = new_entry else {
        let reason = "Pip was not found in the current build's fingerprint store.".to_string();
        new_session.write_pip_line(miss_info.pip_id, &reason).await;
        return Ok(CacheMissAnalysisDetailAndResult {
            result: Classification::MissingFromNewBuild,
            detail: CacheMissAnalysisDetail::plain(miss_info.cache_miss_kind.clone(), reason),
        });
    };

    let old_weak_tree = fp_tree::from_value("WeakFingerprint", &old_entry.weak_fingerprint_inputs);
    let new_weak_tree = fp_tree::from_value("WeakFingerprint", &new_entry.weak_fingerprint_inputs);
    let old_path_set_tree = path_set_tree(&old_entry);
    let new_path_set_tree = path_set_tree(&new_entry);
    let old_strong_tree = fp_tree::from_value("StrongFingerprint", &old_entry.strong_fingerprint_inputs);
    let new_strong_tree = fp_tree::from_value("StrongFingerprint", &new_entry.strong_fingerprint_inputs);

    let old_dir_members = resolve_dir_members(old_session, &old_strong_tree).await?;
    let new_dir_members = resolve_dir_members(new_session, &new_strong_tree).await?;

    let outcome = classify::diff_entries(
        miss_info,
        &old_entry,
        &new_entry,
        &old_weak_tree,
        &new_weak_tree,
        &old_path_set_tree,
        &new_path_set_tree,
        &old_strong_tree,
        &new_strong_tree,
        |h| old_dir_members.get(&h).cloned(),
        |h| new_dir_members.get(&h).cloned(),
        diff_format,
    );

    if let Some(change) = outcome.info.as_ref().and_then(|envelope| envelope.semi_stable_hash.as_ref()) {
        tracing::trace!(old = %change.old, new = %change.new, "semi-stable hash changed between builds");
    }

    Ok(CacheMissAnalysisDetailAndResult {
        result: outcome.result,
        detail: CacheMissAnalysisDetail {
            actual_miss_type: miss_info.cache_miss_kind.clone(),
            reason_from_analysis: outcome.reason,
            info: outcome.info,
        },
    })
}

fn path_set_tree(entry: &FingerprintStoreEntry) -> JsonNode {
    match &entry.path_set_inputs {
        Some(value) => fp_tree::from_value("PathSet", value),
        None => JsonNode::branch("PathSet", Vec::new()),
    }
}

/// Walk a strong-fingerprint tree's `Observed` leaves, find the ones
/// tagged `DirectoryEnumeration`, and resolve each referenced
/// members-fingerprint through the session's content-hash family.
async fn resolve_dir_members(
    session: &dyn FingerprintSession,
    strong_tree: &JsonNode,
) -> Result<std::collections::HashMap<ContentHash, Vec<String>>> {
    let mut hashes = Vec::new();
    collect_dir_member_hashes(strong_tree, &mut hashes);

    let mut resolved = std::collections::HashMap::new();
    for hash in hashes {
        if resolved.contains_key(&hash) {
            continue;
        }
        if let Some(value) = session.try_get_content_hash_value(&hash.to_hex()).await? {
            if let Some(list) = value.as_array() {
                let members = list
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                resolved.insert(hash, members);
            }
        }
    }
    Ok(resolved)
}

fn collect_dir_member_hashes(node: &JsonNode, out: &mut Vec<ContentHash>) {
    if node.name == fp_tree::OBSERVED_NODE {
        if let [kind, hash_hex] = node.values.as_slice() {
            if kind == "DirectoryEnumeration" {
                if let Ok(hash) = hash_hex.parse::<ContentHash>() {
                    out.push(hash);
                }
            }
        }
    }
    for child in &node.children {
        collect_dir_member_hashes(child, out);
    }
}
