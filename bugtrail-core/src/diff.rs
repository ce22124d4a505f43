//! Per-commit change model
//!
//! A commit's diff against its first parent, reduced to what the labeling
//! replay needs: change kind, path(s) and line counts.

use serde::{Deserialize, Serialize};

/// Kind of change a diff entry records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
    Rename { from: String },
}

/// Lines added and removed by one entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChanges {
    pub added: usize,
    pub removed: usize,
}

impl LineChanges {
    pub fn touched(&self) -> usize {
        self.added + self.removed
    }

    /// Net growth of the file (negative when it shrank)
    pub fn churn(&self) -> i64 {
        self.added as i64 - self.removed as i64
    }
}

/// One file-level change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: ChangeKind,
    /// Path after the change (the new path for renames, the old one for deletes)
    pub path: String,
    #[serde(default)]
    pub lines: LineChanges,
}

impl DiffEntry {
    pub fn is_add(&self) -> bool {
        matches!(self.kind, ChangeKind::Add)
    }

    pub fn is_modify(&self) -> bool {
        matches!(self.kind, ChangeKind::Modify)
    }

    pub fn renamed_from(&self) -> Option<&str> {
        match &self.kind {
            ChangeKind::Rename { from } => Some(from),
            _ => None,
        }
    }
}

/// All changes of one commit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDiff {
    pub entries: Vec<DiffEntry>,
}

impl CommitDiff {
    /// Number of files committed together, tracked or not
    pub fn change_set_size(&self) -> usize {
        self.entries.len()
    }
}
