//! `fpcore-daemon`: the runtime host binary for one build. Reads an
//! execution-log event stream (the binary frame format) from a file or
//! stdin, feeds it to [`fpcore_daemon::FpCoreHost`], and on EOF (or
//! Ctrl-C) shuts the host down: drains the batching queue, publishes the
//! built store, and prints a one-line JSON summary.
//!
//! No subcommands (an explicit non-goal: this is not the
//! end-user build CLI) — just bootstrap flags, mirroring `aivcsd`'s
//! stub shape generalized to an actual runtime host.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use fpcore_daemon::{CacheMissMode, FingerprintCoreConfig, FpCoreHost, TracingSink};
use store_sync::{
    AdoCandidateKeys, ArtifactCache, CandidateKeys, FsArtifactCache, GitHashesCandidateKeys, GitLog, KeyCandidate,
};

/// `Remote` mode ("try listed keys") has no environment or git
/// source to derive from — the caller supplies the list directly.
struct StaticCandidateKeys(Vec<String>);

impl CandidateKeys for StaticCandidateKeys {
    fn candidates(&self) -> Vec<KeyCandidate> {
        self.0
            .iter()
            .map(|key| KeyCandidate {
                key: key.clone(),
                provenance: "--remote-key".to_string(),
            })
            .collect()
    }
}

#[derive(Parser)]
#[command(name = "fpcore-daemon")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fingerprint store + cache-miss analysis runtime host", long_about = None)]
struct Cli {
    /// Path to a `FingerprintCoreConfig` TOML file. Omit to run with
    /// every field at its default (cache-miss analysis disabled).
    #[arg(long, env = "FPCORE_CONFIG")]
    config: Option<PathBuf>,

    /// Event-stream source. Omit to read from stdin.
    #[arg(long)]
    events_file: Option<PathBuf>,

    /// Directory backing the artifact cache `store-sync` publishes into
    /// and retrieves remote/git-hashes prior stores from.
    #[arg(long, default_value = "artifact-cache")]
    artifact_cache_dir: PathBuf,

    /// Key this build's store is published under. Falls back to the git
    /// HEAD sha when omitted and the working directory is a git repo.
    #[arg(long)]
    publish_key: Option<String>,

    /// Salt folded into every lookup fingerprint, separating this
    /// host's cache entries from unrelated ones sharing the same cache.
    #[arg(long, default_value = "fpcore")]
    fingerprint_salt: String,

    /// Prefix for git-hashes mode candidate keys.
    #[arg(long, default_value = "")]
    git_hashes_prefix: String,

    /// Extra branches to widen git-hashes mode's candidate search to.
    #[arg(long = "git-hashes-branch")]
    git_hashes_branches: Vec<String>,

    /// Candidate keys for `Remote` mode, tried in the given order.
    #[arg(long = "remote-key")]
    remote_keys: Vec<String>,

    /// Skip the store's age-based GC on shutdown.
    #[arg(long)]
    no_gc: bool,

    /// Emit newline-delimited JSON log lines instead of human-readable ones.
    #[arg(long, global = true)]
    json_logs: bool,
}

/// Shells out to `git` the way `aivcs_core::git` does, so `GitHashesCandidateKeys`
/// can walk real commit history without this crate depending on a git
/// library (git plumbing beyond this is this core's explicit non-goal).
struct ShellGitLog {
    repo_dir: PathBuf,
}

impl ShellGitLog {
    fn run(&self, args: &[&str]) -> Vec<String> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .ok()
            .filter(|o| o.status.success())
            .map(|o| {
                String::from_utf8_lossy(&o.stdout)
                    .lines()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl GitLog for ShellGitLog {
    fn last_n_commits_from_head(&self, n: usize) -> Vec<String> {
        self.run(&["log", "--format=%H", "-n", &n.to_string()])
    }

    fn merge_base(&self, branch: &str) -> Option<String> {
        self.run(&["merge-base", "HEAD", branch]).into_iter().next()
    }

    fn commits_from(&self, start: &str, n: usize) -> Vec<String> {
        self.run(&["log", "--format=%H", "-n", &n.to_string(), start])
    }

    fn latest_n_commits_of_branch(&self, branch: &str, n: usize) -> Vec<String> {
        self.run(&["log", "--format=%H", "-n", &n.to_string(), branch])
    }
}

fn init_tracing(json: bool) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()));
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match &cli.config {
        Some(path) => FingerprintCoreConfig::load(path).context("loading fpcore-daemon config")?,
        None => FingerprintCoreConfig::default(),
    };

    let cache = FsArtifactCache::new(&cli.artifact_cache_dir).context("opening artifact cache directory")?;
    let git_log = ShellGitLog {
        repo_dir: std::env::current_dir()?,
    };

    let ado_keys;
    let git_keys;
    let remote_keys;
    let candidates: Option<&dyn CandidateKeys> = match config.cache_miss_mode {
        CacheMissMode::AzureDevOps => {
            ado_keys = AdoCandidateKeys::from_env();
            Some(&ado_keys as &dyn CandidateKeys)
        }
        CacheMissMode::GitHashes => {
            git_keys = GitHashesCandidateKeys {
                prefix: cli.git_hashes_prefix.clone(),
                extra_branches: cli.git_hashes_branches.clone(),
                git: &git_log,
            };
            Some(&git_keys as &dyn CandidateKeys)
        }
        CacheMissMode::Remote => {
            remote_keys = StaticCandidateKeys(cli.remote_keys.clone());
            Some(&remote_keys as &dyn CandidateKeys)
        }
        _ => None,
    };
    let cache_ref: Option<&dyn ArtifactCache> = Some(&cache);

    let host = FpCoreHost::bootstrap(
        config,
        &cli.fingerprint_salt,
        Arc::new(TracingSink),
        None,
        cache_ref,
        candidates,
    )
    .await
    .context("bootstrapping fpcore-daemon host")?;

    let dispatched = match cli.events_file {
        Some(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("opening event stream {}", path.display()))?;
            host.ingest_reader(file).await?
        }
        None => host.ingest_reader(tokio::io::stdin()).await?,
    };
    tracing::info!(dispatched, "event stream ingested");

    let publish_key = match cli.publish_key {
        Some(key) => key,
        None => {
            Command::new("git")
                .args(["rev-parse", "HEAD"])
                .output()
                .ok()
                .filter(|o| o.status.success())
                .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown".to_string())
        }
    };

    let outcome = host
        .shutdown(&cache, &publish_key, &cli.fingerprint_salt, !cli.no_gc)
        .await
        .context("shutting down fpcore-daemon host")?;

    println!(
        "{}",
        serde_json::json!({
            "dispatched": dispatched,
            "published": outcome.publish.published,
            "fileCount": outcome.publish.file_count,
            "totalBytes": outcome.publish.total_bytes,
        })
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn main_compiles() {
        let _: fn() -> anyhow::Result<()> = || Ok(());
    }
}
