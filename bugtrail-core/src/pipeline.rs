//! Run orchestration
//!
//! Stages run strictly in order, each consuming the full output of the
//! previous one:
//!
//! align releases -> bind commits -> link tickets -> resolve versions ->
//! select -> Proportion -> affected ranges -> class snapshots -> replay
//!
//! Global invariants enforced:
//! - The Proportion coefficient lives in the run context, never in global state
//! - Collaborator failures abort the run as `PipelineError::Upstream`
//! - Per-ticket and per-commit inconsistencies are counted, not raised
//! - Identical inputs yield identical datasets

use crate::affected::rebuild_affected_versions;
use crate::commit::{bind_commits, link_tickets, Commit};
use crate::config::ResolvedConfig;
use crate::diff_cache::{retain_commits, DiffCache};
use crate::error::{PipelineError, StageContext};
use crate::export::{dataset_rows, DatasetRow};
use crate::git::VcsSource;
use crate::labeling::{replay_history, LabelOutcome};
use crate::proportion::{coefficient, predict_injected, Proportion};
use crate::release::{align_releases, AlignOptions, ReleaseTimeline};
use crate::snapshot::{ClassSnapshotStore, ReleaseTree};
use crate::ticket::{resolve_versions, select_tickets, ResolvedTicket, Ticket};
use crate::tracker::TrackerSource;
use rayon::prelude::*;
use serde::Serialize;

/// State threaded through one run: the coefficient and what each stage dropped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunContext {
    pub releases: usize,
    pub commits: usize,
    pub tickets_fetched: usize,
    /// Tickets no commit message mentions
    pub tickets_unlinked: usize,
    /// Tickets whose fixed version is after the last release
    pub tickets_unplaced: usize,
    /// Tickets rejected by the OV/FV/IV consistency rule
    pub tickets_rejected: usize,
    pub tickets_selected: usize,
    pub iv_predicted: usize,
    /// Set by the Proportion stage
    pub proportion: Option<Proportion>,
    pub classes: usize,
    pub buggy_classes: usize,
    pub diff_cache_hits: usize,
    pub diff_cache_misses: usize,
    pub labeling: LabelOutcome,
}

/// A labeled dataset and everything it was derived from
#[derive(Debug, Clone)]
pub struct Dataset {
    pub timeline: ReleaseTimeline,
    pub commits: Vec<Commit>,
    pub tickets: Vec<ResolvedTicket>,
    pub store: ClassSnapshotStore,
    pub context: RunContext,
}

impl Dataset {
    /// Dataset rows, honoring the configured release fraction
    pub fn rows(&self, keep_release_fraction: Option<f64>) -> Vec<DatasetRow> {
        dataset_rows(&self.store, &self.timeline, keep_release_fraction)
    }
}

/// Selected tickets with their versions resolved and affected ranges rebuilt
#[derive(Debug, Clone)]
pub struct TicketSelection {
    pub timeline: ReleaseTimeline,
    pub commits: Vec<Commit>,
    pub tickets: Vec<ResolvedTicket>,
    pub context: RunContext,
}

/// Align repository tags with tracker releases
pub fn aligned_releases<V, T>(
    vcs: &V,
    tracker: &T,
    config: &ResolvedConfig,
) -> Result<ReleaseTimeline, PipelineError>
where
    V: VcsSource + ?Sized,
    T: TrackerSource + ?Sized,
{
    let tags = vcs.tags().stage("reading tags")?;
    let tracker_releases = tracker.releases().stage("reading tracker releases")?;
    let options = AlignOptions {
        tag_prefix: &config.tag_prefix,
        tag_exclude: config.tag_exclude.as_ref(),
    };
    let timeline = align_releases(&tags, &tracker_releases, options)?;
    tracing::info!(
        tags = tags.len(),
        tracker_releases = tracker_releases.len(),
        aligned = timeline.len(),
        "releases aligned"
    );
    Ok(timeline)
}

/// Run every stage up to affected-range reconstruction
pub fn select_and_estimate<V, T>(
    vcs: &V,
    tracker: &T,
    config: &ResolvedConfig,
) -> Result<TicketSelection, PipelineError>
where
    V: VcsSource + ?Sized,
    T: TrackerSource + ?Sized,
{
    let timeline = aligned_releases(vcs, tracker, config)?;
    let mut context = RunContext {
        releases: timeline.len(),
        ..RunContext::default()
    };

    let raw = vcs
        .commits_between(&timeline.first().commit_id, &timeline.last().commit_id)
        .stage("reading commit log")?;
    let mut commits = bind_commits(raw, &timeline);
    context.commits = commits.len();
    tracing::info!(commits = commits.len(), "commits bound to releases");

    let tracker_tickets = tracker.tickets().stage("reading tracker tickets")?;
    context.tickets_fetched = tracker_tickets.len();
    let tickets: Vec<Ticket> = tracker_tickets
        .into_iter()
        .map(|t| Ticket::from_tracker(t, &timeline))
        .collect();
    let linked = link_tickets(&mut commits, tickets);
    context.tickets_unlinked = context.tickets_fetched - linked.len();

    let resolved: Vec<ResolvedTicket> = linked
        .iter()
        .filter_map(|t| {
            let resolved = resolve_versions(t, &timeline);
            if resolved.is_none() {
                tracing::debug!(ticket = %t.key, "fixed version after the last release, dropped");
            }
            resolved
        })
        .collect();
    context.tickets_unplaced = linked.len() - resolved.len();

    let (mut tickets, rejected) = select_tickets(resolved);
    context.tickets_rejected = rejected;
    context.tickets_selected = tickets.len();

    let proportion = coefficient(&tickets, config.strategy, config.fallback_p);
    context.proportion = Some(proportion);
    context.iv_predicted = predict_injected(&mut tickets, proportion.p);
    let non_empty = rebuild_affected_versions(&mut tickets);
    tracing::info!(
        fetched = context.tickets_fetched,
        unlinked = context.tickets_unlinked,
        unplaced = context.tickets_unplaced,
        rejected = context.tickets_rejected,
        selected = context.tickets_selected,
        p = proportion.p,
        samples = proportion.samples,
        predicted = context.iv_predicted,
        non_empty_ranges = non_empty,
        "tickets resolved"
    );

    Ok(TicketSelection {
        timeline,
        commits,
        tickets,
        context,
    })
}

/// Build one class snapshot per release, reading release trees in parallel
pub fn build_snapshots<V>(
    vcs: &V,
    timeline: &ReleaseTimeline,
    config: &ResolvedConfig,
) -> Result<ClassSnapshotStore, PipelineError>
where
    V: VcsSource + ?Sized,
{
    let trees: Vec<ReleaseTree> = timeline
        .releases()
        .par_iter()
        .map(|release| vcs.release_tree(release, &config.filter))
        .collect::<anyhow::Result<_>>()
        .stage("reading release trees")?;
    let store = ClassSnapshotStore::build(timeline, trees);
    tracing::info!(classes = store.class_count(), "class snapshots built");
    Ok(store)
}

/// Build the labeled dataset
///
/// Diffs already in `cache` are reused; new ones are added and entries for
/// commits outside this run are dropped. `progress` receives `(done, total)`
/// during the history replay.
pub fn build_dataset<V, T, P>(
    vcs: &V,
    tracker: &T,
    config: &ResolvedConfig,
    cache: &mut DiffCache,
    progress: P,
) -> Result<Dataset, PipelineError>
where
    V: VcsSource + ?Sized,
    T: TrackerSource + ?Sized,
    P: FnMut(usize, usize),
{
    let TicketSelection {
        timeline,
        commits,
        tickets,
        mut context,
    } = select_and_estimate(vcs, tracker, config)?;

    let mut store = build_snapshots(vcs, &timeline, config)?;
    context.classes = store.class_count();

    let (mut hits, mut misses) = (0, 0);
    let outcome = replay_history(
        &commits,
        &tickets,
        &mut store,
        &config.filter,
        |commit| {
            if let Some(diff) = cache.get(&commit.id) {
                hits += 1;
                return Ok(diff.clone());
            }
            misses += 1;
            let diff = vcs.commit_diff(&commit.id, commit.parent_id.as_deref())?;
            cache.insert(commit.id.clone(), diff.clone());
            Ok(diff)
        },
        progress,
    )
    .stage("replaying history")?;
    retain_commits(cache, commits.iter().map(|c| c.id.as_str()));

    context.diff_cache_hits = hits;
    context.diff_cache_misses = misses;
    context.buggy_classes = store.buggy_count();
    context.labeling = outcome;
    tracing::info!(
        commits = context.labeling.commits_replayed,
        fix_commits = context.labeling.fix_commits,
        labels = context.labeling.labels_applied,
        missed_lookups = context.labeling.missed_lookups,
        buggy = context.buggy_classes,
        classes = context.classes,
        cache_hits = hits,
        "history replayed"
    );

    Ok(Dataset {
        timeline,
        commits,
        tickets,
        store,
        context,
    })
}
