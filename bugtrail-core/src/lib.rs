//! Bugtrail core library - defect-prediction datasets from git history and issue trackers

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Release ids are dense, 1-based and ordered by release date
// - Affected-version ranges are half-open: [injected, fixed)
// - Bug labels follow a class across renames and into every release it touches
// - No global mutable state; run-scoped values travel in `RunContext`
// - Deterministic traversal order must be explicit
// - Identical input yields identical datasets

pub mod affected;
pub mod commit;
pub mod config;
pub mod diff;
pub mod diff_cache;
pub mod error;
pub mod export;
pub mod git;
pub mod interval;
pub mod labeling;
pub mod metrics;
pub mod pipeline;
pub mod proportion;
pub mod release;
pub mod snapshot;
pub mod ticket;
pub mod tracker;

pub use config::ResolvedConfig;
pub use error::PipelineError;
pub use export::{render, DatasetRow, OutputFormat, ReleaseRow, TicketRow};
pub use git::{GitCli, VcsSource};
pub use interval::{ReleaseId, ReleaseRange};
pub use pipeline::{build_dataset, Dataset, RunContext};
pub use proportion::{Proportion, ProportionStrategy};
pub use tracker::{JiraExport, TrackerSource};
