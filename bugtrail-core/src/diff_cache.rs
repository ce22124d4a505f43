//! On-disk cache of per-commit diffs.
//!
//! Cache key: the commit hash. Value: the commit's [`CommitDiff`] against its
//! first parent. A commit's diff never changes, so entries never go stale;
//! after a run the cache is narrowed to the commits of that run.
//!
//! Stored as zstd-compressed JSON in `<repo>/.bugtrail/diff-cache.json.zst`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::diff::CommitDiff;

/// In-memory diff cache keyed by commit hash.
pub type DiffCache = HashMap<String, CommitDiff>;

/// Directory holding bugtrail's per-repository state.
pub fn bugtrail_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".bugtrail")
}

fn cache_path(repo_root: &Path) -> PathBuf {
    bugtrail_dir(repo_root).join("diff-cache.json.zst")
}

/// Load the diff cache from disk.
///
/// Returns `None` on cold start (file absent) or on read/decompress error (non-fatal).
/// The caller should treat `None` as an empty cache and proceed normally.
pub fn read_diff_cache(repo_root: &Path) -> Option<DiffCache> {
    let path = cache_path(repo_root);
    if !path.exists() {
        return None;
    }
    match load_compressed_json(&path) {
        Ok(cache) => Some(cache),
        Err(e) => {
            tracing::warn!("failed to load diff cache (proceeding cold): {e:#}");
            None
        }
    }
}

fn load_compressed_json(path: &Path) -> Result<DiffCache> {
    let compressed = std::fs::read(path)
        .with_context(|| format!("failed to read diff cache: {}", path.display()))?;
    let bytes = zstd::decode_all(compressed.as_slice())
        .with_context(|| format!("failed to decompress diff cache: {}", path.display()))?;
    let json = std::str::from_utf8(&bytes).context("diff cache is not valid UTF-8")?;
    serde_json::from_str(json).context("failed to parse diff cache JSON")
}

/// Write the diff cache to disk (zstd level 3).
pub fn write_diff_cache(repo_root: &Path, cache: &DiffCache) -> Result<()> {
    let path = cache_path(repo_root);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    let json = serde_json::to_string(cache).context("failed to serialize diff cache")?;
    let compressed =
        zstd::encode_all(json.as_bytes(), 3).context("failed to compress diff cache")?;
    std::fs::write(&path, &compressed)
        .with_context(|| format!("failed to write diff cache: {}", path.display()))
}

/// Drop entries for commits outside `commits`.
pub fn retain_commits<'a>(cache: &mut DiffCache, commits: impl IntoIterator<Item = &'a str>) {
    let keep: HashSet<&str> = commits.into_iter().collect();
    cache.retain(|sha, _| keep.contains(sha.as_str()));
}
