//! In-memory collaborators shared by the pipeline-level tests

#![allow(dead_code)]

use anyhow::Result;
use bugtrail_core::commit::RawCommit;
use bugtrail_core::config::{ResolvedConfig, SourceFilter};
use bugtrail_core::diff::{ChangeKind, CommitDiff, DiffEntry, LineChanges};
use bugtrail_core::release::{Release, TrackerRelease, VcsTag};
use bugtrail_core::snapshot::{ReleaseTree, SourceFile};
use bugtrail_core::ticket::TrackerTicket;
use bugtrail_core::{TrackerSource, VcsSource};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn at(month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, month, day, 12, 0, 0).unwrap()
}

pub fn day(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, month, day).unwrap()
}

pub fn entry(kind: ChangeKind, path: &str, added: usize, removed: usize) -> DiffEntry {
    DiffEntry {
        kind,
        path: path.to_string(),
        lines: LineChanges { added, removed },
    }
}

/// A repository whose history, tags and trees are given up front
#[derive(Default)]
pub struct FakeVcs {
    pub tags: Vec<VcsTag>,
    pub commits: Vec<RawCommit>,
    pub diffs: HashMap<String, CommitDiff>,
    /// Paths (with line counts) present at each tag
    pub trees: HashMap<String, Vec<(String, usize)>>,
    pub diff_calls: AtomicUsize,
    pub fail_diffs: bool,
}

impl FakeVcs {
    pub fn tag(&mut self, name: &str, date: DateTime<Utc>, files: &[&str]) {
        self.tags.push(VcsTag {
            name: name.to_string(),
            commit_id: format!("tag-{}", name),
            date,
        });
        self.trees.insert(
            format!("tag-{}", name),
            files.iter().map(|f| (f.to_string(), 10)).collect(),
        );
    }

    pub fn commit(&mut self, id: &str, date: DateTime<Utc>, message: &str, entries: Vec<DiffEntry>) {
        self.commits.push(RawCommit {
            id: id.to_string(),
            parent_id: None,
            author: format!("author-of-{}", id),
            date,
            message: message.to_string(),
        });
        self.diffs.insert(id.to_string(), CommitDiff { entries });
    }

    pub fn diff_calls(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }
}

impl VcsSource for FakeVcs {
    fn tags(&self) -> Result<Vec<VcsTag>> {
        Ok(self.tags.clone())
    }

    fn commits_between(&self, _oldest: &str, _newest: &str) -> Result<Vec<RawCommit>> {
        Ok(self.commits.clone())
    }

    fn commit_diff(&self, commit: &str, _parent: Option<&str>) -> Result<CommitDiff> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_diffs {
            anyhow::bail!("diff-tree exited with status 128");
        }
        Ok(self.diffs.get(commit).cloned().unwrap_or_default())
    }

    fn release_tree(&self, release: &Release, filter: &SourceFilter) -> Result<ReleaseTree> {
        let files = self
            .trees
            .get(&release.commit_id)
            .map(|files| {
                files
                    .iter()
                    .filter(|(path, _)| filter.is_tracked(path))
                    .map(|(path, size)| SourceFile {
                        path: path.clone(),
                        size: *size,
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(ReleaseTree {
            release: release.id,
            files,
        })
    }
}

#[derive(Default)]
pub struct FakeTracker {
    pub releases: Vec<TrackerRelease>,
    pub tickets: Vec<TrackerTicket>,
}

impl FakeTracker {
    pub fn release(&mut self, name: &str, date: NaiveDate) {
        self.releases.push(TrackerRelease {
            name: name.to_string(),
            date: Some(date),
            released: true,
        });
    }

    pub fn ticket(
        &mut self,
        key: &str,
        created: NaiveDate,
        resolved: NaiveDate,
        fix_versions: &[&str],
        affected_versions: &[&str],
    ) {
        self.tickets.push(TrackerTicket {
            id: format!("id-{}", key),
            key: key.to_string(),
            created,
            resolved,
            fix_versions: fix_versions.iter().map(|s| s.to_string()).collect(),
            affected_versions: affected_versions.iter().map(|s| s.to_string()).collect(),
        });
    }
}

impl TrackerSource for FakeTracker {
    fn releases(&self) -> Result<Vec<TrackerRelease>> {
        Ok(self.releases.clone())
    }

    fn tickets(&self) -> Result<Vec<TrackerTicket>> {
        Ok(self.tickets.clone())
    }
}

pub fn config() -> ResolvedConfig {
    ResolvedConfig::defaults().unwrap()
}

/// Three releases, three tickets, five commits
///
/// - R1 (Jan 10): A, B, Other
/// - R2 (Feb 10): A, B, C, Other (C added on Jan 20)
/// - R3 (Mar 10): A, B, C, Other
///
/// PROJ-1 has no affected versions, OV = R1 and FV = R3; its fix touches A.
/// PROJ-2 has OV = FV = R2 and no affected versions; its fix touches Other.
/// PROJ-3 reports R1 as affected with OV = R2 and FV = R3, so p = 1; its fix touches B.
pub fn three_release_project() -> (FakeVcs, FakeTracker) {
    let mut vcs = FakeVcs::default();
    let all = ["src/A.java", "src/B.java", "src/Other.java"];
    let with_c = ["src/A.java", "src/B.java", "src/C.java", "src/Other.java"];
    vcs.tag("R1", at(1, 10), &all);
    vcs.tag("R2", at(2, 10), &with_c);
    vcs.tag("R3", at(3, 10), &with_c);

    vcs.commit(
        "c1",
        at(1, 1),
        "initial import",
        vec![
            entry(ChangeKind::Add, "src/A.java", 10, 0),
            entry(ChangeKind::Add, "src/B.java", 10, 0),
            entry(ChangeKind::Add, "src/Other.java", 10, 0),
            entry(ChangeKind::Add, "README.md", 3, 0),
        ],
    );
    vcs.commit(
        "c2",
        at(1, 20),
        "add C",
        vec![entry(ChangeKind::Add, "src/C.java", 10, 0)],
    );
    vcs.commit(
        "c3",
        at(2, 5),
        "PROJ-2 fix other",
        vec![entry(ChangeKind::Modify, "src/Other.java", 2, 1)],
    );
    vcs.commit(
        "c4",
        at(2, 20),
        "PROJ-1 fix A",
        vec![entry(ChangeKind::Modify, "src/A.java", 3, 2)],
    );
    vcs.commit(
        "c5",
        at(3, 1),
        "PROJ-3: fix B",
        vec![entry(ChangeKind::Modify, "src/B.java", 1, 1)],
    );

    let mut tracker = FakeTracker::default();
    tracker.release("R1", day(1, 10));
    tracker.release("R2", day(2, 10));
    tracker.release("R3", day(3, 10));
    tracker.ticket("PROJ-1", day(1, 5), day(2, 21), &["R3"], &[]);
    tracker.ticket("PROJ-2", day(2, 1), day(2, 6), &["R2"], &[]);
    tracker.ticket("PROJ-3", day(1, 25), day(3, 2), &["R3"], &["R1"]);

    (vcs, tracker)
}
