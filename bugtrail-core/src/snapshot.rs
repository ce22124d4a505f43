//! Per-release class inventories
//!
//! One `ProjectClass` per tracked source file in each release tree, built once
//! before labeling and mutated only by the history replay.
//!
//! Global invariants enforced:
//! - Each class snapshot belongs to exactly one release
//! - Snapshots are stored in release order (index = release position)
//! - Classes within a snapshot are sorted by path (ASCII lexical ordering)
//! - Cross-release identity is a `ClassIdentity`, seeded with the path and
//!   carried forward across renames
//! - Identities are unique within a snapshot; a path reused after being
//!   renamed away gets a fresh identity
//! - `date_added` defaults to the oldest release date

use crate::interval::ReleaseId;
use crate::metrics::ClassMetrics;
use crate::release::ReleaseTimeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a class across releases
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassIdentity(String);

impl ClassIdentity {
    pub fn from_path(path: &str) -> Self {
        ClassIdentity(path.to_string())
    }

    /// Identity for a class that reappears at `path` after the class first
    /// seen there was renamed away in `release`
    pub fn reintroduced(path: &str, release: ReleaseId) -> Self {
        ClassIdentity(format!("{}@{}", path, release))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A tracked source file as listed in a release tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    /// Lines of code at the release commit
    pub size: usize,
}

/// Source files of one release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTree {
    pub release: ReleaseId,
    pub files: Vec<SourceFile>,
}

/// A class as it exists in one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProjectClass {
    pub path: String,
    pub name: String,
    pub release: ReleaseId,
    pub identity: ClassIdentity,
    pub date_added: DateTime<Utc>,
    pub buggy: bool,
    pub metrics: ClassMetrics,
}

/// File name without directories or extension
pub fn class_name(path: &str) -> String {
    let file = path.rsplit('/').next().unwrap_or(path);
    match file.rfind('.') {
        Some(dot) if dot > 0 => file[..dot].to_string(),
        _ => file.to_string(),
    }
}

/// All classes of one release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSnapshot {
    pub release: ReleaseId,
    pub date: DateTime<Utc>,
    classes: Vec<ProjectClass>,
}

impl ReleaseSnapshot {
    pub fn classes(&self) -> &[ProjectClass] {
        &self.classes
    }

    pub fn class(&self, path: &str) -> Option<&ProjectClass> {
        self.classes.iter().find(|c| c.path == path)
    }

    fn class_mut(&mut self, path: &str) -> Option<&mut ProjectClass> {
        self.classes.iter_mut().find(|c| c.path == path)
    }

    pub fn by_identity(&self, identity: &ClassIdentity) -> Option<&ProjectClass> {
        self.classes.iter().find(|c| c.identity == *identity)
    }

    fn by_identity_mut(&mut self, identity: &ClassIdentity) -> Option<&mut ProjectClass> {
        self.classes.iter_mut().find(|c| c.identity == *identity)
    }

    /// Give `identity` to the class at `path`; any other class already holding
    /// it is a newer class at a reused path and gets a fresh identity
    fn assign_identity(
        &mut self,
        path: &str,
        identity: &ClassIdentity,
        renamed_in: ReleaseId,
    ) -> bool {
        if self.class(path).is_none() {
            return false;
        }
        for class in self.classes.iter_mut() {
            if class.path == path {
                class.identity = identity.clone();
            } else if class.identity == *identity {
                class.identity = ClassIdentity::reintroduced(&class.path, renamed_in);
            }
        }
        true
    }
}

/// Class inventories for every aligned release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSnapshotStore {
    snapshots: Vec<ReleaseSnapshot>,
}

impl ClassSnapshotStore {
    /// Build one snapshot per release from its source tree
    ///
    /// Trees may arrive in any order; releases without a tree get an empty
    /// snapshot. Every class starts non-buggy, added at the oldest release date.
    pub fn build(timeline: &ReleaseTimeline, trees: Vec<ReleaseTree>) -> Self {
        let default_added = timeline.first().date;
        let mut snapshots: Vec<ReleaseSnapshot> = timeline
            .releases()
            .iter()
            .map(|r| ReleaseSnapshot {
                release: r.id,
                date: r.date,
                classes: Vec::new(),
            })
            .collect();

        for tree in trees {
            let Some(snapshot) = snapshots.get_mut(tree.release.position()) else {
                continue;
            };
            let mut classes: Vec<ProjectClass> = tree
                .files
                .into_iter()
                .map(|file| ProjectClass {
                    name: class_name(&file.path),
                    identity: ClassIdentity::from_path(&file.path),
                    path: file.path,
                    release: tree.release,
                    date_added: default_added,
                    buggy: false,
                    metrics: ClassMetrics::with_size(file.size),
                })
                .collect();
            classes.sort_by(|a, b| a.path.cmp(&b.path));
            classes.dedup_by(|a, b| a.path == b.path);
            snapshot.classes = classes;
        }

        ClassSnapshotStore { snapshots }
    }

    pub fn snapshots(&self) -> &[ReleaseSnapshot] {
        &self.snapshots
    }

    pub fn snapshot(&self, release: ReleaseId) -> Option<&ReleaseSnapshot> {
        self.snapshots.get(release.position())
    }

    /// Look up a class by path in one release
    pub fn class(&self, release: ReleaseId, path: &str) -> Option<&ProjectClass> {
        self.snapshot(release)?.class(path)
    }

    pub fn class_mut(&mut self, release: ReleaseId, path: &str) -> Option<&mut ProjectClass> {
        self.snapshots.get_mut(release.position())?.class_mut(path)
    }

    /// Identity of the class at `path` in `release`
    ///
    /// When the path is absent from that release (e.g. deleted before the
    /// tag), the newest earlier class at the same path is used, then the path
    /// itself.
    pub fn identity_of(&self, release: ReleaseId, path: &str) -> ClassIdentity {
        self.snapshots
            .iter()
            .take(release.position() + 1)
            .rev()
            .find_map(|s| s.class(path))
            .map(|c| c.identity.clone())
            .unwrap_or_else(|| ClassIdentity::from_path(path))
    }

    /// Mark the class with `identity` buggy in `release`
    ///
    /// Returns false when the class does not exist in that snapshot (deleted,
    /// not yet added, or lost across an undetected rename).
    pub fn mark_buggy(&mut self, release: ReleaseId, identity: &ClassIdentity) -> bool {
        match self
            .snapshots
            .get_mut(release.position())
            .and_then(|s| s.by_identity_mut(identity))
        {
            Some(class) => {
                class.buggy = true;
                true
            }
            None => false,
        }
    }

    /// Record that `path` was added at `date` by a commit bound to `release`
    ///
    /// Sets `date_added` in that snapshot and every later one holding the
    /// same identity.
    pub fn propagate_date_added(&mut self, release: ReleaseId, path: &str, date: DateTime<Utc>) {
        // An add that did not survive to the tag only reaches later classes
        // still sitting at the same path
        let identity = self.class(release, path).map(|c| c.identity.clone());
        for snapshot in self.snapshots.iter_mut().skip(release.position()) {
            let class = match &identity {
                Some(identity) => snapshot.by_identity_mut(identity),
                None => snapshot
                    .class_mut(path)
                    .filter(|c| c.identity.as_str() == path),
            };
            if let Some(class) = class {
                class.date_added = date;
            }
        }
    }

    /// Carry identity and addition date across a rename `from -> to` seen in `release`
    ///
    /// The predecessor is looked up in the previous release snapshot (the old
    /// path is normally gone from the rename's own release). When it cannot be
    /// found, the old path itself becomes the identity so older snapshots still
    /// match by path. A class later created again at `from` keeps its own
    /// identity, distinct from the renamed one.
    pub fn propagate_rename(&mut self, release: ReleaseId, from: &str, to: &str) {
        let predecessor = release
            .position()
            .checked_sub(1)
            .and_then(|prev| self.snapshots.get(prev)?.class(from))
            .or_else(|| self.snapshots.get(release.position())?.class(from))
            .map(|c| (c.identity.clone(), Some(c.date_added)));
        let (identity, date_added) =
            predecessor.unwrap_or_else(|| (ClassIdentity::from_path(from), None));

        for snapshot in self.snapshots.iter_mut().skip(release.position()) {
            if !snapshot.assign_identity(to, &identity, release) {
                continue;
            }
            if let (Some(date), Some(class)) = (date_added, snapshot.class_mut(to)) {
                class.date_added = date;
            }
        }
    }

    /// All classes, release by release
    pub fn classes(&self) -> impl Iterator<Item = &ProjectClass> {
        self.snapshots.iter().flat_map(|s| s.classes.iter())
    }

    pub fn class_count(&self) -> usize {
        self.snapshots.iter().map(|s| s.classes.len()).sum()
    }

    pub fn buggy_count(&self) -> usize {
        self.classes().filter(|c| c.buggy).count()
    }
}
