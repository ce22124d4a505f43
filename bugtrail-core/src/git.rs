//! Version-control collaborator
//!
//! Reads tags, the bounded commit log, per-commit diffs and release trees.
//!
//! Global invariants enforced:
//! - Commit hash is the sole identity
//! - Tags are peeled to the commit they name; tags of non-commits are skipped
//! - Diffs are taken against the first parent with rename detection
//! - Release trees list tracked source files only, with measured size
//!
//! Uses git CLI directly (no libgit2) for portability.

use crate::commit::RawCommit;
use crate::config::SourceFilter;
use crate::diff::{ChangeKind, CommitDiff, DiffEntry, LineChanges};
use crate::metrics::count_code_lines;
use crate::release::{Release, VcsTag};
use crate::snapshot::{ReleaseTree, SourceFile};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const UNIT_SEP: char = '\x1f';
const RECORD_SEP: char = '\x1e';

/// Source of repository history consumed by the pipeline
///
/// `Sync` so release trees can be built in parallel.
pub trait VcsSource: Sync {
    /// All tags, peeled to commits
    fn tags(&self) -> Result<Vec<VcsTag>>;

    /// Commits reachable from `newest` and not from the parents of `oldest`
    fn commits_between(&self, oldest: &str, newest: &str) -> Result<Vec<RawCommit>>;

    /// Changes of `commit` against `parent` (the empty tree when `None`)
    fn commit_diff(&self, commit: &str, parent: Option<&str>) -> Result<CommitDiff>;

    /// Tracked source files at the release commit
    fn release_tree(&self, release: &Release, filter: &SourceFilter) -> Result<ReleaseTree>;
}

/// [`VcsSource`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    repo: PathBuf,
}

impl GitCli {
    /// Open a repository, failing if `repo` is not inside a git work tree
    pub fn open(repo: &Path) -> Result<Self> {
        if git_at(repo, &["rev-parse", "--git-dir"]).is_err() {
            anyhow::bail!("not in a git repository at {}", repo.display());
        }
        Ok(GitCli {
            repo: repo.to_path_buf(),
        })
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }
}

impl VcsSource for GitCli {
    fn tags(&self) -> Result<Vec<VcsTag>> {
        let raw = git_raw_at(
            &self.repo,
            &[
                "for-each-ref",
                "--format=%(refname:short)%1f%(objectname)%1f%(*objectname)%1f%(committerdate:unix)%1f%(*committerdate:unix)",
                "refs/tags",
            ],
        )
        .context("failed to list tags")?;
        parse_tag_refs(&raw)
    }

    fn commits_between(&self, oldest: &str, newest: &str) -> Result<Vec<RawCommit>> {
        let parents = git_at(&self.repo, &["rev-list", "--parents", "-n", "1", oldest])
            .with_context(|| format!("failed to resolve parents of {}", oldest))?;
        let excluded: Vec<String> = parents
            .split_whitespace()
            .skip(1)
            .map(|p| format!("^{}", p))
            .collect();

        let mut args = vec![
            "log",
            "--reverse",
            "--format=%H%x1f%P%x1f%an%x1f%ct%x1f%B%x1e",
            newest,
        ];
        args.extend(excluded.iter().map(String::as_str));
        let raw = git_raw_at(&self.repo, &args)
            .with_context(|| format!("failed to read log {}..{}", oldest, newest))?;
        parse_log(&raw)
    }

    fn commit_diff(&self, commit: &str, parent: Option<&str>) -> Result<CommitDiff> {
        let mut range: Vec<&str> = Vec::with_capacity(2);
        match parent {
            Some(parent) => range.extend([parent, commit]),
            None => range.extend(["--root", commit]),
        }
        let mut status_args = vec!["diff-tree", "-r", "-M", "-z", "--no-commit-id", "--name-status"];
        status_args.extend(&range);
        let status = git_raw_at(&self.repo, &status_args)
            .with_context(|| format!("failed to diff {}", commit))?;

        let mut numstat_args = vec!["diff-tree", "-r", "-M", "-z", "--no-commit-id", "--numstat"];
        numstat_args.extend(&range);
        let numstat = git_raw_at(&self.repo, &numstat_args)
            .with_context(|| format!("failed to count lines of {}", commit))?;

        let mut entries = parse_name_status(&status)?;
        let lines = parse_numstat(&numstat)?;
        for entry in &mut entries {
            if let Some(changes) = lines.get(&entry.path) {
                entry.lines = *changes;
            }
        }
        Ok(CommitDiff { entries })
    }

    fn release_tree(&self, release: &Release, filter: &SourceFilter) -> Result<ReleaseTree> {
        let listing = git_raw_at(&self.repo, &["ls-tree", "-r", "-z", &release.commit_id])
            .with_context(|| format!("failed to list tree of release {}", release.name))?;
        let blobs: Vec<(String, String)> = parse_ls_tree(&listing)
            .into_iter()
            .filter(|(_, path)| filter.is_tracked(path))
            .collect();

        let input: String = blobs.iter().map(|(oid, _)| format!("{}\n", oid)).collect();
        let output = git_batch_at(&self.repo, &["cat-file", "--batch"], input.into_bytes())
            .with_context(|| format!("failed to read blobs of release {}", release.name))?;
        let contents = parse_cat_file_batch(&output)?;

        let files = blobs
            .into_iter()
            .map(|(oid, path)| SourceFile {
                size: contents.get(&oid).map_or(0, |c| count_code_lines(c)),
                path,
            })
            .collect();
        Ok(ReleaseTree {
            release: release.id,
            files,
        })
    }
}

/// Execute a git command in a specific directory and return the trimmed stdout
fn git_at(repo_path: &Path, args: &[&str]) -> Result<String> {
    git_raw_at(repo_path, args).map(|out| out.trim().to_string())
}

/// Execute a git command in a specific directory and return stdout untouched
fn git_raw_at(repo_path: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .context("failed to invoke git")?;

    if !output.status.success() {
        anyhow::bail!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Execute a git command fed from stdin and return the raw stdout bytes
fn git_batch_at(repo_path: &Path, args: &[&str], input: Vec<u8>) -> Result<Vec<u8>> {
    let mut child = Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to invoke git")?;

    let mut stdin = child.stdin.take().context("git stdin unavailable")?;
    // Written from another thread so a full stdout pipe cannot deadlock us
    let writer = std::thread::spawn(move || stdin.write_all(&input));
    let output = child.wait_with_output().context("failed to wait for git")?;

    if !output.status.success() {
        anyhow::bail!(
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    writer
        .join()
        .map_err(|_| anyhow::anyhow!("git stdin writer panicked"))?
        .context("failed to write to git stdin")?;
    Ok(output.stdout)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let secs: i64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid timestamp: {:?}", raw))?;
    DateTime::from_timestamp(secs, 0).with_context(|| format!("timestamp out of range: {}", secs))
}

/// Parse `for-each-ref` output (name, object, peeled object, date, peeled date)
///
/// Annotated tags use the peeled fields. Tags without a commit date (tags of
/// trees or blobs) are skipped.
pub fn parse_tag_refs(raw: &str) -> Result<Vec<VcsTag>> {
    let mut tags = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let fields: Vec<&str> = line.split(UNIT_SEP).collect();
        let [name, object, peeled, date, peeled_date] = fields[..] else {
            anyhow::bail!("malformed tag line: {:?}", line);
        };
        let (commit_id, date) = if peeled.is_empty() {
            (object, date)
        } else {
            (peeled, peeled_date)
        };
        if date.is_empty() {
            tracing::debug!(tag = name, "tag does not point to a commit, skipped");
            continue;
        }
        tags.push(VcsTag {
            name: name.to_string(),
            commit_id: commit_id.to_string(),
            date: parse_timestamp(date)?,
        });
    }
    Ok(tags)
}

/// Parse `log` output written with unit/record separators
pub fn parse_log(raw: &str) -> Result<Vec<RawCommit>> {
    let mut commits = Vec::new();
    for record in raw.split(RECORD_SEP) {
        let record = record.trim_start_matches('\n');
        if record.trim().is_empty() {
            continue;
        }
        let mut fields = record.splitn(5, UNIT_SEP);
        let (Some(id), Some(parents), Some(author), Some(date), Some(message)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            anyhow::bail!("malformed log record: {:?}", record);
        };
        commits.push(RawCommit {
            id: id.to_string(),
            parent_id: parents.split_whitespace().next().map(str::to_string),
            author: author.to_string(),
            date: parse_timestamp(date)?,
            message: message.trim_end().to_string(),
        });
    }
    Ok(commits)
}

/// Parse `diff-tree -z --name-status` output
pub fn parse_name_status(raw: &str) -> Result<Vec<DiffEntry>> {
    let mut tokens = raw.split('\0').filter(|t| !t.is_empty());
    let mut entries = Vec::new();
    while let Some(status) = tokens.next() {
        let mut path = || {
            tokens
                .next()
                .map(str::to_string)
                .with_context(|| format!("missing path after status {:?}", status))
        };
        let entry = match status.chars().next() {
            Some('A') => DiffEntry {
                kind: ChangeKind::Add,
                path: path()?,
                lines: LineChanges::default(),
            },
            Some('D') => DiffEntry {
                kind: ChangeKind::Delete,
                path: path()?,
                lines: LineChanges::default(),
            },
            Some('R') => {
                let from = path()?;
                DiffEntry {
                    kind: ChangeKind::Rename { from },
                    path: path()?,
                    lines: LineChanges::default(),
                }
            }
            // Copies add the destination file
            Some('C') => {
                let _source = path()?;
                DiffEntry {
                    kind: ChangeKind::Add,
                    path: path()?,
                    lines: LineChanges::default(),
                }
            }
            Some('M' | 'T') => DiffEntry {
                kind: ChangeKind::Modify,
                path: path()?,
                lines: LineChanges::default(),
            },
            _ => anyhow::bail!("unknown diff status: {:?}", status),
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Parse `diff-tree -z --numstat` output into line counts keyed by new path
///
/// Binary files (`-\t-`) count as zero lines.
pub fn parse_numstat(raw: &str) -> Result<HashMap<String, LineChanges>> {
    let mut tokens = raw.split('\0');
    let mut lines = HashMap::new();
    while let Some(token) = tokens.next() {
        if token.trim().is_empty() {
            continue;
        }
        let mut parts = token.trim_start_matches('\n').splitn(3, '\t');
        let (Some(added), Some(removed), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            anyhow::bail!("malformed numstat entry: {:?}", token);
        };
        // Renames leave the path empty and append old and new paths as tokens
        let path = if path.is_empty() {
            let _old = tokens.next();
            tokens
                .next()
                .context("missing rename destination in numstat")?
        } else {
            path
        };
        let count = |n: &str| n.parse::<usize>().unwrap_or(0);
        lines.insert(
            path.to_string(),
            LineChanges {
                added: count(added),
                removed: count(removed),
            },
        );
    }
    Ok(lines)
}

/// Parse `ls-tree -r -z` output into `(blob id, path)` pairs
pub fn parse_ls_tree(raw: &str) -> Vec<(String, String)> {
    raw.split('\0')
        .filter_map(|entry| {
            let (meta, path) = entry.split_once('\t')?;
            let mut meta = meta.split_whitespace();
            let (_mode, kind, oid) = (meta.next()?, meta.next()?, meta.next()?);
            (kind == "blob").then(|| (oid.to_string(), path.to_string()))
        })
        .collect()
}

/// Parse `cat-file --batch` output into contents keyed by object id
pub fn parse_cat_file_batch(raw: &[u8]) -> Result<HashMap<String, String>> {
    let mut contents = HashMap::new();
    let mut rest = raw;
    while !rest.is_empty() {
        let header_end = rest
            .iter()
            .position(|b| *b == b'\n')
            .context("truncated cat-file header")?;
        let header = String::from_utf8_lossy(&rest[..header_end]).into_owned();
        rest = &rest[header_end + 1..];

        let fields: Vec<&str> = header.split_whitespace().collect();
        match fields[..] {
            [oid, "missing"] => {
                tracing::warn!(object = oid, "object missing from repository");
            }
            [oid, _kind, size] => {
                let size: usize = size
                    .parse()
                    .with_context(|| format!("invalid object size in {:?}", header))?;
                if rest.len() < size {
                    anyhow::bail!("truncated content for object {}", oid);
                }
                let body = String::from_utf8_lossy(&rest[..size]).into_owned();
                contents.insert(oid.to_string(), body);
                // Content is followed by a single newline
                rest = rest.get(size + 1..).unwrap_or_default();
            }
            _ => anyhow::bail!("malformed cat-file header: {:?}", header),
        }
    }
    Ok(contents)
}
