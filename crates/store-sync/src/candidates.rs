//! Key inference heuristics: `CandidateKeys` is exposed as its own
//! trait so that `runtime-analyzer`'s tests (and anything else that needs
//! to pick a prior-store key) can exercise the ADO and git-hashes
//! strategies without a real CI environment or git checkout.
//!
//! Open question resolved here: the source material lists four preferences
//! ("PR-merge branch, then PR source branch, then PR target branch, then
//! the build source branch") but only three environment
//! variables. In Azure DevOps, `BUILD_SOURCEBRANCH` *is* the PR-merge ref
//! (`refs/pull/<id>/merge`) for pull-request builds and the plain source
//! branch otherwise, so it already plays the "PR-merge branch" role.
//! `AdoCandidateKeys` therefore reads exactly the three env vars, in the
//! order required by P10: `BUILD_SOURCEBRANCH`, then
//! `SYSTEM_PULLREQUEST_SOURCEBRANCH`, then `SYSTEM_PULLREQUEST_TARGETBRANCH`.

use std::collections::HashSet;
use std::env;

/// One inferred key, with a human-readable note on where it came from
/// (surfaced in telemetry, not used for comparison).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCandidate {
    pub key: String,
    pub provenance: String,
}

pub trait CandidateKeys: Send + Sync {
    fn candidates(&self) -> Vec<KeyCandidate>;
}

/// Filesystem-safe atom: keep ASCII alphanumerics, `-` and `_`; everything
/// else (notably `/` in branch names) becomes `_`.
pub fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub struct AdoCandidateKeys {
    pub build_source_branch: Option<String>,
    pub pr_source_branch: Option<String>,
    pub pr_target_branch: Option<String>,
}

impl AdoCandidateKeys {
    pub fn from_env() -> Self {
        Self {
            build_source_branch: env::var("BUILD_SOURCEBRANCH").ok(),
            pr_source_branch: env::var("SYSTEM_PULLREQUEST_SOURCEBRANCH").ok(),
            pr_target_branch: env::var("SYSTEM_PULLREQUEST_TARGETBRANCH").ok(),
        }
    }
}

impl CandidateKeys for AdoCandidateKeys {
    fn candidates(&self) -> Vec<KeyCandidate> {
        let mut out = Vec::new();
        if let Some(b) = &self.build_source_branch {
            out.push(KeyCandidate {
                key: sanitize(b),
                provenance: "BUILD_SOURCEBRANCH".to_string(),
            });
        }
        if let Some(b) = &self.pr_source_branch {
            out.push(KeyCandidate {
                key: sanitize(b),
                provenance: "SYSTEM_PULLREQUEST_SOURCEBRANCH".to_string(),
            });
        }
        if let Some(b) = &self.pr_target_branch {
            out.push(KeyCandidate {
                key: sanitize(b),
                provenance: "SYSTEM_PULLREQUEST_TARGETBRANCH".to_string(),
            });
        }
        out
    }
}

/// Abstraction over the commit history a git-hashes strategy needs, so
/// tests can supply a fixed commit graph instead of shelling out to a
/// real checkout.
pub trait GitLog: Send + Sync {
    fn last_n_commits_from_head(&self, n: usize) -> Vec<String>;
    fn merge_base(&self, branch: &str) -> Option<String>;
    fn commits_from(&self, start: &str, n: usize) -> Vec<String>;
    fn latest_n_commits_of_branch(&self, branch: &str, n: usize) -> Vec<String>;
}

pub struct GitHashesCandidateKeys<'a> {
    pub prefix: String,
    pub extra_branches: Vec<String>,
    pub git: &'a dyn GitLog,
}

impl<'a> CandidateKeys for GitHashesCandidateKeys<'a> {
    fn candidates(&self) -> Vec<KeyCandidate> {
        let mut raw: Vec<KeyCandidate> = Vec::new();

        for commit in self.git.last_n_commits_from_head(5) {
            raw.push(KeyCandidate {
                key: commit,
                provenance: "head".to_string(),
            });
        }

        for branch in &self.extra_branches {
            if let Some(base) = self.git.merge_base(branch) {
                for commit in self.git.commits_from(&base, 3) {
                    raw.push(KeyCandidate {
                        key: commit,
                        provenance: format!("merge-base:{branch}"),
                    });
                }
            }
            for commit in self.git.latest_n_commits_of_branch(branch, 3) {
                raw.push(KeyCandidate {
                    key: commit,
                    provenance: format!("branch-latest:{branch}"),
                });
            }
        }

        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(raw.len());
        for candidate in raw {
            if seen.insert(candidate.key.clone()) {
                out.push(KeyCandidate {
                    key: format!("{}{}", self.prefix, candidate.key),
                    provenance: candidate.provenance,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn sanitize_replaces_non_atom_chars() {
        assert_eq!(sanitize("refs/heads/feature/x"), "refs_heads_feature_x");
    }

    #[test]
    fn ado_order_is_build_then_pr_source_then_pr_target() {
        let keys = AdoCandidateKeys {
            build_source_branch: Some("refs/pull/5/merge".to_string()),
            pr_source_branch: Some("feature/x".to_string()),
            pr_target_branch: Some("main".to_string()),
        };
        let candidates = keys.candidates();
        assert_eq!(candidates[0].provenance, "BUILD_SOURCEBRANCH");
        assert_eq!(candidates[1].provenance, "SYSTEM_PULLREQUEST_SOURCEBRANCH");
        assert_eq!(candidates[2].provenance, "SYSTEM_PULLREQUEST_TARGETBRANCH");
        assert_eq!(candidates[0].key, "refs_pull_5_merge");
    }

    #[test]
    fn ado_missing_vars_are_skipped_not_empty_strings() {
        let keys = AdoCandidateKeys {
            build_source_branch: Some("main".to_string()),
            pr_source_branch: None,
            pr_target_branch: None,
        };
        assert_eq!(keys.candidates().len(), 1);
    }

    struct FakeGitLog {
        head: Vec<String>,
        merge_bases: HashMap<String, String>,
        from: HashMap<String, Vec<String>>,
        branch_latest: HashMap<String, Vec<String>>,
    }

    impl GitLog for FakeGitLog {
        fn last_n_commits_from_head(&self, n: usize) -> Vec<String> {
            self.head.iter().take(n).cloned().collect()
        }
        fn merge_base(&self, branch: &str) -> Option<String> {
            self.merge_bases.get(branch).cloned()
        }
        fn commits_from(&self, start: &str, n: usize) -> Vec<String> {
            self.from
                .get(start)
                .map(|v| v.iter().take(n).cloned().collect())
                .unwrap_or_default()
        }
        fn latest_n_commits_of_branch(&self, branch: &str, n: usize) -> Vec<String> {
            self.branch_latest
                .get(branch)
                .map(|v| v.iter().take(n).cloned().collect())
                .unwrap_or_default()
        }
    }

    #[test]
    fn git_hashes_mode_dedupes_preserving_first_seen_order() {
        let git = FakeGitLog {
            head: vec!["c1".to_string(), "c2".to_string()],
            merge_bases: [("release".to_string(), "base1".to_string())].into(),
            from: [(
                "base1".to_string(),
                vec!["base1".to_string(), "c2".to_string(), "b3".to_string()],
            )]
            .into(),
            branch_latest: [("release".to_string(), vec!["r1".to_string(), "c1".to_string()])]
                .into(),
        };
        let keys = GitHashesCandidateKeys {
            prefix: "prior-".to_string(),
            extra_branches: vec!["release".to_string()],
            git: &git,
        };
        let candidates = keys.candidates();
        let raw_keys: Vec<&str> = candidates.iter().map(|c| c.key.as_str()).collect();

        assert_eq!(
            raw_keys,
            vec![
                "prior-c1",
                "prior-c2",
                "prior-base1",
                "prior-b3",
                "prior-r1",
            ]
        );
        assert_eq!(candidates[2].provenance, "merge-base:release");
        assert_eq!(candidates[4].provenance, "branch-latest:release");
    }

    #[test]
    fn git_hashes_mode_with_no_extra_branches_is_just_head() {
        let git = FakeGitLog {
            head: vec!["c1".to_string(), "c2".to_string(), "c3".to_string()],
            merge_bases: HashMap::new(),
            from: HashMap::new(),
            branch_latest: HashMap::new(),
        };
        let keys = GitHashesCandidateKeys {
            prefix: String::new(),
            extra_branches: vec![],
            git: &git,
        };
        assert_eq!(keys.candidates().len(), 3);
    }
}
