//! Release alignment between repository tags and tracker versions
//!
//! Global invariants enforced:
//! - Only releases present on both sides survive
//! - IDs are dense, 1-based and strictly increasing with the tag date
//! - Both sides of a pair carry the same ID
//! - Zero matches aborts the run

use crate::error::PipelineError;
use crate::interval::ReleaseId;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A tag as read from the repository, peeled to its commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsTag {
    pub name: String,
    pub commit_id: String,
    pub date: DateTime<Utc>,
}

/// A version as declared in the issue tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerRelease {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub released: bool,
}

/// A release present in both systems
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Release {
    pub id: ReleaseId,
    /// Tracker-side name, used to resolve ticket versions
    pub name: String,
    pub tag: String,
    pub commit_id: String,
    /// Tag commit date; this is the date the timeline is ordered by
    pub date: DateTime<Utc>,
    pub tracker_date: NaiveDate,
}

impl Release {
    /// Calendar day of the tag commit, the granularity ticket dates are compared at
    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

/// Tag-side matching rules
#[derive(Debug, Clone, Copy, Default)]
pub struct AlignOptions<'a> {
    /// Prefix stripped from tag names before matching (e.g. `release-`)
    pub tag_prefix: &'a str,
    /// Tags whose name, minus `tag_prefix`, matches this pattern are not
    /// releases (e.g. docker image tags)
    pub tag_exclude: Option<&'a Regex>,
}

/// Normalize a release name for cross-system matching
pub fn normalize_release_name(name: &str, prefix: &str) -> String {
    strip_tag_prefix(name, prefix).trim().to_lowercase()
}

fn strip_tag_prefix<'a>(name: &'a str, prefix: &str) -> &'a str {
    if prefix.is_empty() {
        name
    } else {
        name.strip_prefix(prefix).unwrap_or(name)
    }
}

/// Ordered list of aligned releases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTimeline {
    releases: Vec<Release>,
}

impl ReleaseTimeline {
    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Oldest release; an aligned timeline always holds at least one
    pub fn first(&self) -> &Release {
        &self.releases[0]
    }

    pub fn last(&self) -> &Release {
        &self.releases[self.releases.len() - 1]
    }

    pub fn get(&self, id: ReleaseId) -> Option<&Release> {
        self.releases.get(id.position())
    }

    /// Look up a release by its tracker name (case-insensitive)
    pub fn by_name(&self, name: &str) -> Option<&Release> {
        let wanted = name.trim();
        self.releases
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(wanted))
    }

    /// Earliest release whose day is at or after `day`
    ///
    /// A day before the first release maps to the first release; a day after
    /// the last release cannot be placed and yields `None`.
    pub fn first_on_or_after(&self, day: NaiveDate) -> Option<&Release> {
        self.releases.iter().find(|r| day <= r.day())
    }

    /// Release a commit belongs to: the first release not before the commit
    ///
    /// Commits newer than the last release are attributed to the last release.
    pub fn release_for(&self, date: DateTime<Utc>) -> ReleaseId {
        self.releases
            .iter()
            .find(|r| date <= r.date)
            .unwrap_or_else(|| self.last())
            .id
    }

    /// Releases strictly after `id`, oldest first
    pub fn after(&self, id: ReleaseId) -> &[Release] {
        let from = (id.position() + 1).min(self.releases.len());
        &self.releases[from..]
    }
}

/// Match tracker versions to repository tags and assign shared IDs
///
/// # Errors
///
/// Returns [`PipelineError::NoCommonReleases`] when no released tracker
/// version has a tag with the same normalized name.
pub fn align_releases(
    tags: &[VcsTag],
    tracker: &[TrackerRelease],
    options: AlignOptions<'_>,
) -> Result<ReleaseTimeline, PipelineError> {
    // First tag wins for a duplicated normalized name
    let mut tag_index: HashMap<String, &VcsTag> = HashMap::new();
    for tag in tags {
        let stripped = strip_tag_prefix(&tag.name, options.tag_prefix);
        if options.tag_exclude.is_some_and(|re| re.is_match(stripped)) {
            continue;
        }
        tag_index
            .entry(normalize_release_name(&tag.name, options.tag_prefix))
            .or_insert(tag);
    }

    let eligible: Vec<(&TrackerRelease, NaiveDate)> = tracker
        .iter()
        .filter(|r| r.released)
        .filter_map(|r| r.date.map(|d| (r, d)))
        .collect();

    let mut matched: Vec<(&TrackerRelease, NaiveDate, &VcsTag)> = Vec::new();
    let mut seen_tags: Vec<&str> = Vec::new();
    for (release, tracker_date) in &eligible {
        let Some(tag) = tag_index.get(&normalize_release_name(&release.name, "")) else {
            continue;
        };
        // Two tracker versions differing only by case map to the same tag
        if seen_tags.contains(&tag.name.as_str()) {
            continue;
        }
        seen_tags.push(tag.name.as_str());
        matched.push((*release, *tracker_date, *tag));
    }

    if matched.is_empty() {
        return Err(PipelineError::NoCommonReleases {
            tags: tag_index.len(),
            tracker_releases: eligible.len(),
        });
    }

    matched.sort_by(|a, b| a.2.date.cmp(&b.2.date).then_with(|| a.2.name.cmp(&b.2.name)));

    let releases = matched
        .into_iter()
        .enumerate()
        .map(|(position, (release, tracker_date, tag))| Release {
            id: ReleaseId::from_position(position),
            name: release.name.clone(),
            tag: tag.name.clone(),
            commit_id: tag.commit_id.clone(),
            date: tag.date,
            tracker_date,
        })
        .collect();

    Ok(ReleaseTimeline { releases })
}
