//! Pipeline integration tests - full runs over in-memory collaborators
//!
//! Global test rules:
//! - No git, no filesystem
//! - Assert labels, ranges and counters, not log output

mod common;

use bugtrail_core::diff::ChangeKind;
use bugtrail_core::diff_cache::DiffCache;
use bugtrail_core::interval::{ReleaseId, ReleaseRange};
use bugtrail_core::pipeline::{aligned_releases, build_dataset, select_and_estimate, Dataset};
use bugtrail_core::ticket::InjectedVersion;
use bugtrail_core::PipelineError;
use common::{at, config, three_release_project, FakeTracker, FakeVcs};

fn id(n: u32) -> ReleaseId {
    ReleaseId::new(n).unwrap()
}

fn run(vcs: &FakeVcs, tracker: &FakeTracker) -> Dataset {
    let mut cache = DiffCache::new();
    build_dataset(vcs, tracker, &config(), &mut cache, |_, _| {}).unwrap()
}

fn buggy(dataset: &Dataset, release: u32, path: &str) -> bool {
    dataset.store.class(id(release), path).unwrap().buggy
}

#[test]
fn test_predicted_injected_version_labels_r1_and_r2() {
    let (vcs, tracker) = three_release_project();
    let dataset = run(&vcs, &tracker);

    let proportion = dataset.context.proportion.unwrap();
    assert_eq!(proportion.p, 1);
    assert_eq!(proportion.samples, 1);

    let ticket = dataset.tickets.iter().find(|t| t.key == "PROJ-1").unwrap();
    assert_eq!(ticket.observed(), id(1));
    assert_eq!(ticket.fv, id(3));
    // 3 - 1 * (3 - 1 + 1) = 0, clamped to the first release
    assert_eq!(ticket.iv, InjectedVersion::Predicted(id(1)));
    assert_eq!(ticket.affected, ReleaseRange::new(id(1), id(3)));

    assert!(buggy(&dataset, 1, "src/A.java"));
    assert!(buggy(&dataset, 2, "src/A.java"));
    assert!(!buggy(&dataset, 3, "src/A.java"));
}

#[test]
fn test_reported_injected_version_is_kept() {
    let (vcs, tracker) = three_release_project();
    let dataset = run(&vcs, &tracker);

    let ticket = dataset.tickets.iter().find(|t| t.key == "PROJ-3").unwrap();
    assert_eq!(ticket.iv, InjectedVersion::Reported(id(1)));
    assert_eq!(ticket.observed(), id(2));
    assert!(buggy(&dataset, 1, "src/B.java"));
    assert!(buggy(&dataset, 2, "src/B.java"));
    assert!(!buggy(&dataset, 3, "src/B.java"));
}

#[test]
fn test_ticket_with_observed_equal_fixed_is_discarded() {
    let (vcs, tracker) = three_release_project();
    let dataset = run(&vcs, &tracker);

    assert!(dataset.tickets.iter().all(|t| t.key != "PROJ-2"));
    assert_eq!(dataset.context.tickets_rejected, 1);
    for release in 1..=3 {
        assert!(!buggy(&dataset, release, "src/Other.java"));
    }
    // Its commit is not a fix commit
    assert_eq!(dataset.context.labeling.fix_commits, 2);
    let other = dataset.store.class(id(2), "src/Other.java").unwrap();
    assert_eq!(other.metrics.bug_fixes, 0);
    assert_eq!(other.metrics.revisions, 1);
}

#[test]
fn test_class_added_in_r2_has_its_own_date_added() {
    let (vcs, tracker) = three_release_project();
    let dataset = run(&vcs, &tracker);

    assert!(dataset.store.class(id(1), "src/C.java").is_none());
    assert_eq!(
        dataset.store.class(id(2), "src/C.java").unwrap().date_added,
        at(1, 20)
    );
    assert_eq!(
        dataset.store.class(id(3), "src/C.java").unwrap().date_added,
        at(1, 20)
    );
    // Classes of the initial import carry the import date everywhere
    for release in 1..=3 {
        assert_eq!(
            dataset.store.class(id(release), "src/A.java").unwrap().date_added,
            at(1, 1)
        );
    }
}

#[test]
fn test_run_context_counters() {
    let (vcs, tracker) = three_release_project();
    let context = run(&vcs, &tracker).context;

    assert_eq!(context.releases, 3);
    assert_eq!(context.commits, 5);
    assert_eq!(context.tickets_fetched, 3);
    assert_eq!(context.tickets_unlinked, 0);
    assert_eq!(context.tickets_unplaced, 0);
    assert_eq!(context.tickets_rejected, 1);
    assert_eq!(context.tickets_selected, 2);
    assert_eq!(context.iv_predicted, 1);
    assert_eq!(context.classes, 11);
    assert_eq!(context.buggy_classes, 4);
    assert_eq!(context.labeling.labels_applied, 4);
    assert_eq!(context.labeling.missed_lookups, 0);
    assert_eq!(context.diff_cache_misses, 5);
}

#[test]
fn test_fix_commit_metrics_land_in_commit_release() {
    let (vcs, tracker) = three_release_project();
    let dataset = run(&vcs, &tracker);

    // c4 (Feb 20) is bound to R3
    let a3 = dataset.store.class(id(3), "src/A.java").unwrap();
    assert_eq!(a3.metrics.bug_fixes, 1);
    assert_eq!(a3.metrics.loc_touched, 5);
    assert_eq!(a3.metrics.revisions, 1);
    let a2 = dataset.store.class(id(2), "src/A.java").unwrap();
    assert_eq!(a2.metrics.bug_fixes, 0);
    assert_eq!(a2.metrics.revisions, 0);
}

#[test]
fn test_unlinked_ticket_is_counted_and_dropped() {
    let (vcs, mut tracker) = three_release_project();
    tracker.ticket("PROJ-99", common::day(1, 2), common::day(2, 1), &[], &[]);
    let dataset = run(&vcs, &tracker);

    assert_eq!(dataset.context.tickets_fetched, 4);
    assert_eq!(dataset.context.tickets_unlinked, 1);
    assert!(dataset.tickets.iter().all(|t| t.key != "PROJ-99"));
}

#[test]
fn test_ticket_resolved_after_last_release_is_unplaced() {
    let (mut vcs, mut tracker) = three_release_project();
    vcs.commit(
        "c6",
        at(3, 5),
        "PROJ-7 late fix",
        vec![common::entry(ChangeKind::Modify, "src/C.java", 1, 0)],
    );
    tracker.ticket("PROJ-7", common::day(1, 2), common::day(4, 1), &[], &[]);
    let dataset = run(&vcs, &tracker);

    assert_eq!(dataset.context.tickets_unplaced, 1);
    for release in 2..=3 {
        assert!(!buggy(&dataset, release, "src/C.java"));
    }
}

#[test]
fn test_no_common_releases_aborts() {
    let (vcs, _) = three_release_project();
    let mut tracker = FakeTracker::default();
    tracker.release("9.9", common::day(1, 1));

    let err = aligned_releases(&vcs, &tracker, &config()).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::NoCommonReleases {
            tags: 3,
            tracker_releases: 1
        }
    ));
}

#[test]
fn test_collaborator_failure_is_upstream_error() {
    let (mut vcs, tracker) = three_release_project();
    vcs.fail_diffs = true;
    let mut cache = DiffCache::new();

    let err = build_dataset(&vcs, &tracker, &config(), &mut cache, |_, _| {}).unwrap_err();
    match err {
        PipelineError::Upstream { stage, source } => {
            assert_eq!(stage, "replaying history");
            assert!(format!("{:#}", source).contains("status 128"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_cached_diffs_are_reused() {
    let (vcs, tracker) = three_release_project();
    let mut cache = DiffCache::new();
    let first = build_dataset(&vcs, &tracker, &config(), &mut cache, |_, _| {}).unwrap();
    assert_eq!(vcs.diff_calls(), 5);
    assert_eq!(cache.len(), 5);

    let second = build_dataset(&vcs, &tracker, &config(), &mut cache, |_, _| {}).unwrap();
    assert_eq!(vcs.diff_calls(), 5);
    assert_eq!(second.context.diff_cache_hits, 5);
    assert_eq!(first.rows(None), second.rows(None));
}

#[test]
fn test_stale_cache_entries_are_dropped() {
    let (vcs, tracker) = three_release_project();
    let mut cache = DiffCache::new();
    cache.insert("gone".to_string(), Default::default());
    build_dataset(&vcs, &tracker, &config(), &mut cache, |_, _| {}).unwrap();
    assert!(!cache.contains_key("gone"));
}

#[test]
fn test_progress_reports_every_commit() {
    let (vcs, tracker) = three_release_project();
    let mut cache = DiffCache::new();
    let mut seen = Vec::new();
    build_dataset(&vcs, &tracker, &config(), &mut cache, |done, total| {
        seen.push((done, total))
    })
    .unwrap();
    assert_eq!(seen, vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]);
}

#[test]
fn test_selection_stops_before_snapshots() {
    let (vcs, tracker) = three_release_project();
    let selection = select_and_estimate(&vcs, &tracker, &config()).unwrap();

    assert_eq!(selection.tickets.len(), 2);
    assert_eq!(vcs.diff_calls(), 0);
    let fix_commits: Vec<_> = selection
        .tickets
        .iter()
        .map(|t| t.fix_commit.as_deref().unwrap())
        .collect();
    assert_eq!(fix_commits, vec!["c4", "c5"]);
}

#[test]
fn test_release_fraction_limits_rows() {
    let (vcs, tracker) = three_release_project();
    let dataset = run(&vcs, &tracker);

    let all = dataset.rows(None);
    assert_eq!(all.len(), 11);
    // floor(3 * 0.5) = 1 release
    let half = dataset.rows(Some(0.5));
    assert_eq!(half.len(), 3);
    assert!(half.iter().all(|r| r.release_id == 1));
}

#[test]
fn test_rename_carries_labels_to_older_releases() {
    let (mut vcs, mut tracker) = three_release_project();
    // Other is renamed to D before R3; a fix to D must label Other in R1 and R2
    vcs.tags.pop();
    vcs.trees.remove("tag-R3");
    vcs.tag(
        "R3",
        at(3, 10),
        &["src/A.java", "src/B.java", "src/C.java", "src/D.java"],
    );
    vcs.commit(
        "c0",
        at(2, 15),
        "move Other",
        vec![common::entry(
            ChangeKind::Rename {
                from: "src/Other.java".to_string(),
            },
            "src/D.java",
            0,
            0,
        )],
    );
    vcs.commit(
        "c9",
        at(3, 3),
        "PROJ-8 fix D",
        vec![common::entry(ChangeKind::Modify, "src/D.java", 1, 1)],
    );
    tracker.ticket("PROJ-8", common::day(1, 15), common::day(3, 4), &["R3"], &["R1"]);
    let dataset = run(&vcs, &tracker);

    let d3 = dataset.store.class(id(3), "src/D.java").unwrap();
    assert_eq!(d3.identity.as_str(), "src/Other.java");
    assert_eq!(d3.date_added, at(1, 1));
    assert!(buggy(&dataset, 1, "src/Other.java"));
    assert!(buggy(&dataset, 2, "src/Other.java"));
    assert!(!d3.buggy);
}
