//! History replay: bug labeling and metric accumulation
//!
//! Every bounded commit is replayed oldest first against the class snapshots.
//! Fix commits of selected tickets additionally mark the touched classes
//! buggy in every release of the ticket's affected range.
//!
//! Global invariants enforced:
//! - Labels are only ever set, never cleared (idempotent under replay)
//! - Only MODIFY entries of a fix commit label classes
//! - A class is labeled by identity, so renamed classes are found in older releases
//! - Metrics are written only to the snapshot of the commit's own release
//! - Lookups that miss are skipped, never fatal

use crate::commit::Commit;
use crate::config::SourceFilter;
use crate::diff::{ChangeKind, CommitDiff, DiffEntry};
use crate::snapshot::ClassSnapshotStore;
use crate::ticket::ResolvedTicket;
use serde::Serialize;
use std::collections::HashMap;

/// Counters of one replay, reported in the run summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelOutcome {
    pub commits_replayed: usize,
    pub fix_commits: usize,
    /// Class snapshots newly set buggy
    pub labels_applied: usize,
    /// Affected-release lookups that found no class with the identity
    pub missed_lookups: usize,
    /// Tracked entries whose class is absent from the commit's release
    pub untracked_entries: usize,
}

/// Replay `commits` in order, labeling classes touched by fix commits
///
/// `diff_of` supplies a commit's changes; `progress` is called with
/// `(done, total)` after each commit.
pub fn replay_history<D, P>(
    commits: &[Commit],
    tickets: &[ResolvedTicket],
    store: &mut ClassSnapshotStore,
    filter: &SourceFilter,
    mut diff_of: D,
    mut progress: P,
) -> anyhow::Result<LabelOutcome>
where
    D: FnMut(&Commit) -> anyhow::Result<CommitDiff>,
    P: FnMut(usize, usize),
{
    let fixes: HashMap<&str, &ResolvedTicket> = tickets
        .iter()
        .filter_map(|t| t.fix_commit.as_deref().map(|c| (c, t)))
        .collect();

    let mut outcome = LabelOutcome::default();
    for (done, commit) in commits.iter().enumerate() {
        let diff = diff_of(commit)?;
        let fix = fixes.get(commit.id.as_str()).copied();
        if fix.is_some() {
            outcome.fix_commits += 1;
        }
        apply_commit(commit, &diff, fix, store, filter, &mut outcome);
        outcome.commits_replayed += 1;
        progress(done + 1, commits.len());
    }
    Ok(outcome)
}

/// Apply one commit's diff to the snapshots
pub fn apply_commit(
    commit: &Commit,
    diff: &CommitDiff,
    fix: Option<&ResolvedTicket>,
    store: &mut ClassSnapshotStore,
    filter: &SourceFilter,
    outcome: &mut LabelOutcome,
) {
    let change_set = diff.change_set_size();
    for entry in diff.entries.iter().filter(|e| is_tracked_entry(e, filter)) {
        let path = entry.path.as_str();

        match &entry.kind {
            ChangeKind::Rename { from } => store.propagate_rename(commit.release, from, path),
            ChangeKind::Add => store.propagate_date_added(commit.release, path, commit.date),
            ChangeKind::Modify | ChangeKind::Delete => {}
        }

        if let Some(ticket) = fix.filter(|_| entry.is_modify()) {
            label_affected(ticket, commit, path, store, outcome);
        }

        let Some(class) = store.class_mut(commit.release, path) else {
            // Not in the release tree, e.g. deleted before the tag
            outcome.untracked_entries += 1;
            continue;
        };
        let metrics = &mut class.metrics;
        if entry.is_modify() {
            metrics.record_line_changes(entry.lines);
            if fix.is_some() {
                metrics.record_bug_fix();
            }
        }
        metrics.record_change_set(change_set);
        metrics.record_revision(&commit.author);
    }
}

fn is_tracked_entry(entry: &DiffEntry, filter: &SourceFilter) -> bool {
    filter.is_tracked(&entry.path) || entry.renamed_from().is_some_and(|p| filter.is_tracked(p))
}

fn label_affected(
    ticket: &ResolvedTicket,
    commit: &Commit,
    path: &str,
    store: &mut ClassSnapshotStore,
    outcome: &mut LabelOutcome,
) {
    let identity = store.identity_of(commit.release, path);
    for release in ticket.affected.ids() {
        let already = store
            .snapshot(release)
            .and_then(|s| s.by_identity(&identity))
            .is_some_and(|c| c.buggy);
        if store.mark_buggy(release, &identity) {
            if !already {
                outcome.labels_applied += 1;
            }
        } else {
            outcome.missed_lookups += 1;
            tracing::debug!(
                ticket = %ticket.key,
                class = %identity,
                release = %release,
                "no class with this identity in affected release"
            );
        }
    }
}
