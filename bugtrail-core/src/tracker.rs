//! Issue-tracker collaborator
//!
//! Reads Jira REST payloads saved to disk: the project document (its
//! `versions` array) and one or more issue search pages.
//!
//! Global invariants enforced:
//! - Tickets come out in tracker order (file order, then page order)
//! - Only versions flagged released are reported, on both releases and tickets
//! - Dates keep the calendar day only (first 10 characters)
//! - A ticket without a resolution date is malformed, not skipped

use crate::release::TrackerRelease;
use crate::ticket::TrackerTicket;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Source of releases and bug tickets consumed by the pipeline
pub trait TrackerSource {
    fn releases(&self) -> Result<Vec<TrackerRelease>>;

    /// Fixed bug tickets, in tracker order
    fn tickets(&self) -> Result<Vec<TrackerTicket>>;
}

#[derive(Debug, Deserialize)]
struct ProjectDocument {
    #[serde(default)]
    versions: Vec<JiraVersion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JiraVersion {
    name: String,
    #[serde(default)]
    released: bool,
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[derive(Debug, Deserialize)]
struct JiraIssue {
    id: String,
    key: String,
    fields: IssueFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueFields {
    created: String,
    #[serde(rename = "resolutiondate")]
    resolution_date: Option<String>,
    #[serde(default)]
    fix_versions: Vec<JiraVersion>,
    #[serde(default)]
    versions: Vec<JiraVersion>,
}

/// Calendar day of a Jira timestamp such as `2017-03-02T10:21:55.000+0000`
pub fn parse_jira_day(raw: &str) -> Result<NaiveDate> {
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").with_context(|| format!("invalid date: {:?}", raw))
}

fn released_names(versions: Vec<JiraVersion>) -> Vec<String> {
    versions
        .into_iter()
        .filter(|v| v.released)
        .map(|v| v.name)
        .collect()
}

/// [`TrackerSource`] reading saved Jira JSON payloads
#[derive(Debug, Clone)]
pub struct JiraExport {
    project: PathBuf,
    issues: Vec<PathBuf>,
}

impl JiraExport {
    pub fn new(project: PathBuf, issues: Vec<PathBuf>) -> Self {
        JiraExport { project, issues }
    }

    /// Use `project.json` and every `issues*.json` of `dir`, pages in file-name order
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let project = dir.join("project.json");
        if !project.exists() {
            anyhow::bail!("no project.json in tracker export {}", dir.display());
        }

        let mut issues: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read tracker export {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("issues") && n.ends_with(".json"))
            })
            .collect();
        issues.sort();

        Ok(JiraExport::new(project, issues))
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

impl TrackerSource for JiraExport {
    fn releases(&self) -> Result<Vec<TrackerRelease>> {
        let document: ProjectDocument = read_json(&self.project)?;
        document
            .versions
            .into_iter()
            .map(|v| {
                let date = v
                    .release_date
                    .as_deref()
                    .map(parse_jira_day)
                    .transpose()
                    .with_context(|| format!("version {}", v.name))?;
                Ok(TrackerRelease {
                    name: v.name,
                    date,
                    released: v.released,
                })
            })
            .collect()
    }

    fn tickets(&self) -> Result<Vec<TrackerTicket>> {
        let mut tickets = Vec::new();
        for path in &self.issues {
            let page: SearchPage = read_json(path)?;
            for issue in page.issues {
                let fields = issue.fields;
                let resolved = fields
                    .resolution_date
                    .as_deref()
                    .with_context(|| format!("ticket {} has no resolution date", issue.key))?;
                tickets.push(TrackerTicket {
                    created: parse_jira_day(&fields.created)
                        .with_context(|| format!("ticket {}", issue.key))?,
                    resolved: parse_jira_day(resolved)
                        .with_context(|| format!("ticket {}", issue.key))?,
                    fix_versions: released_names(fields.fix_versions),
                    affected_versions: released_names(fields.versions),
                    id: issue.id,
                    key: issue.key,
                });
            }
        }
        Ok(tickets)
    }
}
