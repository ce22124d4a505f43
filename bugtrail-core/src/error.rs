//! Pipeline error taxonomy
//!
//! Per-ticket and per-commit inconsistencies never surface here: they are
//! absorbed by filtering. Only run-level failures do.

use thiserror::Error;

/// Errors that abort a labeling run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No release name is shared by the repository tags and the tracker.
    #[error(
        "no common releases: {tags} repository tag(s) and {tracker_releases} released tracker version(s) share no name"
    )]
    NoCommonReleases { tags: usize, tracker_releases: usize },

    /// A collaborator (git, tracker export, diff cache) reported a failure.
    #[error("{stage} failed: {source:#}")]
    Upstream {
        stage: &'static str,
        source: anyhow::Error,
    },
}

impl PipelineError {
    pub fn upstream(stage: &'static str, source: anyhow::Error) -> Self {
        PipelineError::Upstream { stage, source }
    }
}

/// Attach a pipeline stage to a collaborator result.
pub(crate) trait StageContext<T> {
    fn stage(self, stage: &'static str) -> Result<T, PipelineError>;
}

impl<T> StageContext<T> for anyhow::Result<T> {
    fn stage(self, stage: &'static str) -> Result<T, PipelineError> {
        self.map_err(|source| PipelineError::upstream(stage, source))
    }
}
