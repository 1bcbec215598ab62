use fingerprint_store::ContentHash;

use crate::node::JsonNode;
use crate::observed::OBSERVED_NODE;

pub const MISSING_DIR_MEMBERS_MARKER: &str = "MissingDirectoryMembership";

const PATH_SET_NODE: &str = "PathSet";
const MEMBERS_FIELD: &str = "Members";

/// Merges `path_set`'s per-path flags, enumerate-pattern, and observed-input
/// detail into `strong_fp`'s thinner `PathSet` subtree, so every path
/// appears exactly once carrying its full detail (the trickiest piece of
/// this algorithm). `dir_members` resolves a
/// directory-enumeration's members-fingerprint to its member name list;
/// when it returns `None`, a placeholder `Members` leaf carrying
/// [`MISSING_DIR_MEMBERS_MARKER`] is emitted rather than guessing.
pub fn merge_strong_fingerprint_and_path_set_trees(
    strong_fp: &JsonNode,
    path_set: &JsonNode,
    dir_members: impl Fn(ContentHash) -> Option<Vec<String>>,
) -> JsonNode {
    let mut merged = strong_fp.clone();

    let empty: Vec<JsonNode> = Vec::new();
    let path_set_entries: &[JsonNode] = if path_set.name == PATH_SET_NODE {
        &path_set.children
    } else {
        path_set
            .child(PATH_SET_NODE)
            .map(|n| n.children.as_slice())
            .unwrap_or(empty.as_slice())
    };

    let Some(merged_path_set) = merged.child_mut(PATH_SET_NODE) else {
        return merged;
    };

    let strong_count = merged_path_set.children.len();
    let shared = strong_count.min(path_set_entries.len());

    for i in 0..shared {
        merge_path_entry(&mut merged_path_set.children[i], &path_set_entries[i], &dir_members);
    }

    // Tie-break: pathSet has more entries than strong-fp's tree (a truncated
    // tree) — reparent the remainder under strong-fp's PathSet node instead
    // of dropping them, so downstream diff still compares them.
    for extra in &path_set_entries[shared..] {
        let mut reparented = extra.clone();
        expand_directory_members(&mut reparented, &dir_members);
        merged_path_set.children.push(reparented);
    }

    merged
}

fn merge_path_entry(
    target: &mut JsonNode,
    detail: &JsonNode,
    dir_members: &impl Fn(ContentHash) -> Option<Vec<String>>,
) {
    for field in &detail.children {
        if let Some(existing) = target.child_mut(&field.name) {
            *existing = field.clone();
        } else {
            target.children.push(field.clone());
        }
    }
    expand_directory_members(target, dir_members);
}

fn expand_directory_members(
    path_entry: &mut JsonNode,
    dir_members: &impl Fn(ContentHash) -> Option<Vec<String>>,
) {
    let Some(observed) = path_entry.child_mut(OBSERVED_NODE) else {
        return;
    };
    let Some(kind) = observed.values.first() else {
        return;
    };
    if kind != "DirectoryEnumeration" {
        return;
    }
    let Some(hash_hex) = observed.values.get(1) else {
        return;
    };
    let Ok(hash) = hash_hex.parse::<ContentHash>() else {
        return;
    };

    let members_node = match dir_members(hash) {
        Some(list) => JsonNode::leaf(MEMBERS_FIELD, list),
        None => JsonNode::leaf(MEMBERS_FIELD, vec![MISSING_DIR_MEMBERS_MARKER.to_string()]),
    };
    observed.children.push(members_node);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observed::ObservedInput;

    fn path_entry(path: &str, observed: ObservedInput) -> JsonNode {
        JsonNode::branch(
            "Path",
            vec![
                JsonNode::leaf("AbsolutePath", vec![path.to_string()]),
                observed.to_node(),
            ],
        )
    }

    #[test]
    fn merges_observed_detail_into_thin_strong_fp_paths() {
        let strong_fp = JsonNode::branch(
            "StrongFingerprint",
            vec![JsonNode::branch(
                "PathSet",
                vec![JsonNode::branch(
                    "Path",
                    vec![JsonNode::leaf("AbsolutePath", vec!["/a".to_string()])],
                )],
            )],
        );
        let path_set = JsonNode::branch(
            "PathSet",
            vec![path_entry("/a", ObservedInput::ExistingFileProbe)],
        );

        let merged = merge_strong_fingerprint_and_path_set_trees(&strong_fp, &path_set, |_| None);
        let merged_path = &merged.child("PathSet").unwrap().children[0];
        assert_eq!(
            merged_path.child("Observed").unwrap().values[0],
            "ExistingFileProbe"
        );
    }

    #[test]
    fn directory_enumeration_expands_members_when_resolvable() {
        let hash = ContentHash::compute(&[b"dir-members"]);
        let strong_fp = JsonNode::branch(
            "StrongFingerprint",
            vec![JsonNode::branch(
                "PathSet",
                vec![JsonNode::branch(
                    "Path",
                    vec![JsonNode::leaf("AbsolutePath", vec!["/d".to_string()])],
                )],
            )],
        );
        let path_set = JsonNode::branch(
            "PathSet",
            vec![path_entry(
                "/d",
                ObservedInput::DirectoryEnumeration {
                    members_fingerprint: hash,
                },
            )],
        );

        let merged = merge_strong_fingerprint_and_path_set_trees(&strong_fp, &path_set, |h| {
            if h == hash {
                Some(vec!["a".to_string(), "b".to_string()])
            } else {
                None
            }
        });

        let observed = merged.child("PathSet").unwrap().children[0]
            .child("Observed")
            .unwrap();
        let members = observed.child("Members").unwrap();
        assert_eq!(members.values, vec!["a", "b"]);
    }

    #[test]
    fn missing_dir_members_lookup_gets_placeholder_marker() {
        let hash = ContentHash::compute(&[b"unresolvable"]);
        let strong_fp = JsonNode::branch(
            "StrongFingerprint",
            vec![JsonNode::branch(
                "PathSet",
                vec![JsonNode::branch(
                    "Path",
                    vec![JsonNode::leaf("AbsolutePath", vec!["/d".to_string()])],
                )],
            )],
        );
        let path_set = JsonNode::branch(
            "PathSet",
            vec![path_entry(
                "/d",
                ObservedInput::DirectoryEnumeration {
                    members_fingerprint: hash,
                },
            )],
        );

        let merged = merge_strong_fingerprint_and_path_set_trees(&strong_fp, &path_set, |_| None);

        let observed = merged.child("PathSet").unwrap().children[0]
            .child("Observed")
            .unwrap();
        let members = observed.child("Members").unwrap();
        assert_eq!(members.values, vec![MISSING_DIR_MEMBERS_MARKER]);
    }

    #[test]
    fn truncated_pathset_reparents_extra_entries() {
        let strong_fp = JsonNode::branch(
            "StrongFingerprint",
            vec![JsonNode::branch("PathSet", vec![])],
        );
        let path_set = JsonNode::branch(
            "PathSet",
            vec![path_entry("/only-in-pathset", ObservedInput::AbsentPathProbe)],
        );

        let merged = merge_strong_fingerprint_and_path_set_trees(&strong_fp, &path_set, |_| None);
        let entries = &merged.child("PathSet").unwrap().children;
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].child("AbsolutePath").unwrap().values,
            vec!["/only-in-pathset"]
        );
    }
}
