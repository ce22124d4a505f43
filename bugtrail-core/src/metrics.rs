//! Per-class, per-release metric accumulation
//!
//! Global invariants enforced:
//! - Metrics belong to exactly one class snapshot
//! - Averages use integer division over the events seen so far
//! - Size counts non-blank, non-comment lines only
//! - Age is not stored here; it is derived at export time

use crate::diff::LineChanges;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metrics of one class in one release
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClassMetrics {
    pub size: usize,
    pub loc_touched: usize,
    pub loc_added: usize,
    pub max_loc_added: usize,
    pub avg_loc_added: usize,
    pub churn: i64,
    pub max_churn: i64,
    pub avg_churn: i64,
    pub chg_set_size: usize,
    pub max_chg_set_size: usize,
    pub avg_chg_set_size: usize,
    pub revisions: usize,
    pub bug_fixes: usize,
    #[serde(skip)]
    authors: BTreeSet<String>,
    #[serde(skip)]
    additions_seen: usize,
    #[serde(skip)]
    churn_events: usize,
    #[serde(skip)]
    change_sets_seen: usize,
}

impl ClassMetrics {
    pub fn with_size(size: usize) -> Self {
        ClassMetrics {
            size,
            ..Default::default()
        }
    }

    /// Record the line counts of a MODIFY entry touching this class
    pub fn record_line_changes(&mut self, lines: LineChanges) {
        let added = lines.added;
        self.loc_touched += lines.touched();
        self.loc_added += added;

        self.max_loc_added = self.max_loc_added.max(added);
        if added != 0 {
            self.additions_seen += 1;
            self.avg_loc_added = self.loc_added / self.additions_seen;
        }

        self.churn += lines.churn();
        self.churn_events += 1;
        self.max_churn = self.max_churn.max(self.churn);
        self.avg_churn = self.churn / self.churn_events as i64;
    }

    /// Record how many files were committed together with this class
    pub fn record_change_set(&mut self, size: usize) {
        self.chg_set_size += size;
        self.change_sets_seen += 1;
        self.max_chg_set_size = self.max_chg_set_size.max(size);
        self.avg_chg_set_size = self.chg_set_size / self.change_sets_seen;
    }

    /// Record one commit touching this class
    pub fn record_revision(&mut self, author: &str) {
        self.revisions += 1;
        if !self.authors.contains(author) {
            self.authors.insert(author.to_string());
        }
    }

    pub fn record_bug_fix(&mut self) {
        self.bug_fixes += 1;
    }

    /// Number of distinct authors that touched the class in this release
    pub fn author_count(&self) -> usize {
        self.authors.len()
    }
}

/// Count lines of code, skipping blank lines and comment lines
///
/// A line counts as a comment when, after trimming, it starts with `/` or `*`
/// (line comments, block comment openers, continuations and closers).
pub fn count_code_lines(content: &str) -> usize {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('/') && !line.starts_with('*'))
        .count()
}
