use fingerprint_store::ContentHash;

use crate::node::JsonNode;

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

fn diff_children(old: &[JsonNode], new: &[JsonNode], path: &str, depth: usize, out: &mut Vec<String>) {
    let positional = old.len() == new.len()
        && old.iter().zip(new.iter()).all(|(a, b)| a.name == b.name);

    if positional {
        for (a, b) in old.iter().zip(new.iter()) {
            diff_node(a, b, path, depth, out);
        }
        return;
    }

    // Not positionally comparable (different lengths, or reordered/renamed
    // siblings): fall back to comparing as a set keyed by name.
    let mut seen_names: Vec<&str> = Vec::new();
    for c in old.iter().chain(new.iter()) {
        if !seen_names.contains(&c.name.as_str()) {
            seen_names.push(&c.name);
        }
    }

    for name in seen_names {
        let olds: Vec<&JsonNode> = old.iter().filter(|c| c.name == name).collect();
        let news: Vec<&JsonNode> = new.iter().filter(|c| c.name == name).collect();
        let paired = olds.len().min(news.len());

        for i in 0..paired {
            diff_node(olds[i], news[i], path, depth, out);
        }
        for extra in &olds[paired..] {
            out.push(format!("{}- {}/{} {:?}", indent(depth), path, extra.name, extra.values));
        }
        for extra in &news[paired..] {
            out.push(format!("{}+ {}/{} {:?}", indent(depth), path, extra.name, extra.values));
        }
    }
}

fn diff_node(old: &JsonNode, new: &JsonNode, parent_path: &str, depth: usize, out: &mut Vec<String>) {
    let path = format!("{parent_path}/{}", new.name);

    if old.values != new.values {
        out.push(format!(
            "{}~ {} values: {:?} -> {:?}",
            indent(depth),
            path,
            old.values,
            new.values
        ));
    }
    diff_children(&old.children, &new.children, &path, depth + 1, out);
}

/// Structural diff between `old` and `new`, rendered as a stable, indented
/// text report. Children are compared positionally when named identically
/// in sequence, otherwise as a set keyed by name.
pub fn print_tree_diff(old: &JsonNode, new: &JsonNode) -> String {
    let mut out = Vec::new();
    diff_node(old, new, "", 0, &mut out);
    out.join("\n")
}

/// Diff result for one of the three fingerprint aspects (weak, path-set,
/// strong). `hash_changed` is the cheap short-circuit the cache-miss
/// analyzer checks before paying for `tree_diff`'s full render.
#[derive(Debug, Clone)]
pub struct FingerprintAspectDiff {
    pub hash_changed: bool,
    pub old_hash: ContentHash,
    pub new_hash: ContentHash,
    pub tree_diff: String,
}

impl FingerprintAspectDiff {
    fn compute(old_hash: ContentHash, old_tree: &JsonNode, new_hash: ContentHash, new_tree: &JsonNode) -> Self {
        Self {
            hash_changed: old_hash != new_hash,
            old_hash,
            new_hash,
            tree_diff: print_tree_diff(old_tree, new_tree),
        }
    }
}

pub fn diff_weak_fingerprints(
    old_hash: ContentHash,
    old_tree: &JsonNode,
    new_hash: ContentHash,
    new_tree: &JsonNode,
) -> FingerprintAspectDiff {
    FingerprintAspectDiff::compute(old_hash, old_tree, new_hash, new_tree)
}

pub fn diff_path_sets(
    old_hash: ContentHash,
    old_tree: &JsonNode,
    new_hash: ContentHash,
    new_tree: &JsonNode,
) -> FingerprintAspectDiff {
    FingerprintAspectDiff::compute(old_hash, old_tree, new_hash, new_tree)
}

pub fn diff_strong_fingerprints(
    old_hash: ContentHash,
    old_tree: &JsonNode,
    new_hash: ContentHash,
    new_tree: &JsonNode,
) -> FingerprintAspectDiff {
    FingerprintAspectDiff::compute(old_hash, old_tree, new_hash, new_tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::deserialize;

    #[test]
    fn identical_trees_produce_empty_diff() {
        let a = deserialize(r#"{"cmd":"gcc"}"#).unwrap();
        let b = deserialize(r#"{"cmd":"gcc"}"#).unwrap();
        assert_eq!(print_tree_diff(&a, &b), "");
    }

    #[test]
    fn changed_leaf_value_is_reported() {
        let a = deserialize(r#"{"cmd":"gcc"}"#).unwrap();
        let b = deserialize(r#"{"cmd":"clang"}"#).unwrap();
        let diff = print_tree_diff(&a, &b);
        assert!(diff.contains("cmd"));
        assert!(diff.contains("gcc"));
        assert!(diff.contains("clang"));
    }

    #[test]
    fn added_member_in_scalar_array_is_reported() {
        let a = deserialize(r#"{"members":["a","b"]}"#).unwrap();
        let b = deserialize(r#"{"members":["a","b","c"]}"#).unwrap();
        let diff = print_tree_diff(&a, &b);
        assert!(diff.contains("members"));
        assert!(diff.contains("\"c\""));
    }

    #[test]
    fn added_sibling_with_new_name_is_reported_as_plus() {
        let a = deserialize(r#"{"x": 1}"#).unwrap();
        let b = deserialize(r#"{"x": 1, "y": 2}"#).unwrap();
        let diff = print_tree_diff(&a, &b);
        assert!(diff.contains("+ /y"));
    }

    #[test]
    fn hash_changed_flag_tracks_hash_equality_independent_of_tree() {
        let tree = deserialize(r#"{"cmd":"gcc"}"#).unwrap();
        let h1 = ContentHash::compute(&[b"h1"]);
        let h2 = ContentHash::compute(&[b"h2"]);
        let diff = diff_weak_fingerprints(h1, &tree, h2, &tree);
        assert!(diff.hash_changed);
        assert_eq!(diff.tree_diff, "");
    }
}
