//! Dataset rows and output rendering
//!
//! Global invariants enforced:
//! - One row per class snapshot, releases oldest first, paths ascending
//! - The release id is the first column and `buggy` the last
//! - Age is derived here from `date_added` and the release date, never stored
//! - Identical input yields byte-for-byte identical output

use crate::affected::affected_releases;
use crate::release::{Release, ReleaseTimeline};
use crate::snapshot::{ClassSnapshotStore, ProjectClass};
use crate::ticket::{InjectedVersion, ResolvedTicket};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Output format shared by every command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Aligned table for terminals
    #[default]
    Text,
    /// Pretty-printed JSON array
    Json,
    /// One JSON object per line
    Jsonl,
}

/// One labeled class snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRow {
    pub release_id: u32,
    pub release: String,
    pub path: String,
    pub class: String,
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
    pub authors: usize,
    pub bug_fixes: usize,
    /// Whole weeks between the addition date and the release date
    pub age: i64,
    pub buggy: bool,
}

/// Whole weeks from `added` to `release`, truncated toward zero
pub fn age_in_weeks(added: DateTime<Utc>, release: DateTime<Utc>) -> i64 {
    (release - added).num_weeks()
}

impl DatasetRow {
    pub fn from_class(class: &ProjectClass, release: &Release) -> Self {
        let m = &class.metrics;
        DatasetRow {
            release_id: release.id.get(),
            release: release.name.clone(),
            path: class.path.clone(),
            class: class.name.clone(),
            size: m.size,
            loc_touched: m.loc_touched,
            loc_added: m.loc_added,
            max_loc_added: m.max_loc_added,
            avg_loc_added: m.avg_loc_added,
            churn: m.churn,
            max_churn: m.max_churn,
            avg_churn: m.avg_churn,
            chg_set_size: m.chg_set_size,
            max_chg_set_size: m.max_chg_set_size,
            avg_chg_set_size: m.avg_chg_set_size,
            revisions: m.revisions,
            authors: m.author_count(),
            bug_fixes: m.bug_fixes,
            age: age_in_weeks(class.date_added, release.date),
            buggy: class.buggy,
        }
    }
}

/// Number of leading releases exported for `keep_fraction`
///
/// `None` keeps every release. A fraction keeps `floor(n * fraction)`
/// releases, at least one.
pub fn exported_release_count(total: usize, keep_fraction: Option<f64>) -> usize {
    match keep_fraction {
        None => total,
        Some(fraction) => ((total as f64 * fraction).floor() as usize).clamp(1, total.max(1)),
    }
}

/// Flatten the labeled snapshots into dataset rows
pub fn dataset_rows(
    store: &ClassSnapshotStore,
    timeline: &ReleaseTimeline,
    keep_fraction: Option<f64>,
) -> Vec<DatasetRow> {
    let keep = exported_release_count(timeline.len(), keep_fraction);
    store
        .snapshots()
        .iter()
        .take(keep)
        .filter_map(|snapshot| Some((snapshot, timeline.get(snapshot.release)?)))
        .flat_map(|(snapshot, release)| {
            snapshot
                .classes()
                .iter()
                .map(move |class| DatasetRow::from_class(class, release))
        })
        .collect()
}

/// One selected ticket with its resolved versions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketRow {
    pub key: String,
    pub created: String,
    pub resolved: String,
    pub fix_commit: Option<String>,
    pub iv: u32,
    pub iv_source: &'static str,
    pub ov: u32,
    pub fv: u32,
    /// Affected range as `[IV, FV)`
    pub affected: String,
    pub affected_releases: Vec<String>,
}

impl TicketRow {
    pub fn from_ticket(ticket: &ResolvedTicket, timeline: &ReleaseTimeline) -> Self {
        TicketRow {
            key: ticket.key.clone(),
            created: ticket.created.to_string(),
            resolved: ticket.resolved.to_string(),
            fix_commit: ticket.fix_commit.clone(),
            iv: ticket.iv.sentinel_id(),
            iv_source: match ticket.iv {
                InjectedVersion::Reported(_) => "reported",
                InjectedVersion::Predicted(_) => "predicted",
                InjectedVersion::Unknown => "unknown",
            },
            ov: ticket.observed().get(),
            fv: ticket.fv.get(),
            affected: ticket.affected.to_string(),
            affected_releases: affected_releases(ticket.affected, timeline)
                .map(|r| r.name.clone())
                .collect(),
        }
    }
}

/// One aligned release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseRow {
    pub id: u32,
    pub name: String,
    pub tag: String,
    pub commit: String,
    pub date: String,
    pub tracker_date: String,
}

impl From<&Release> for ReleaseRow {
    fn from(release: &Release) -> Self {
        ReleaseRow {
            id: release.id.get(),
            name: release.name.clone(),
            tag: release.tag.clone(),
            commit: release.commit_id.clone(),
            date: release.date.to_rfc3339(),
            tracker_date: release.tracker_date.to_string(),
        }
    }
}

/// Rows that know how to lay themselves out as a text table
pub trait TextTable {
    fn header() -> Vec<&'static str>;
    fn cells(&self) -> Vec<String>;
}

impl TextTable for DatasetRow {
    fn header() -> Vec<&'static str> {
        vec![
            "ID", "RELEASE", "CLASS", "SIZE", "TOUCHED", "CHURN", "NR", "NAUTH", "FIXES", "AGE",
            "BUGGY",
        ]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.release_id.to_string(),
            self.release.clone(),
            truncate_or_pad(&self.path, 50).trim_end().to_string(),
            self.size.to_string(),
            self.loc_touched.to_string(),
            self.churn.to_string(),
            self.revisions.to_string(),
            self.authors.to_string(),
            self.bug_fixes.to_string(),
            self.age.to_string(),
            if self.buggy { "yes" } else { "no" }.to_string(),
        ]
    }
}

impl TextTable for TicketRow {
    fn header() -> Vec<&'static str> {
        vec!["KEY", "CREATED", "RESOLVED", "IV", "SOURCE", "OV", "FV", "AFFECTED"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.key.clone(),
            self.created.clone(),
            self.resolved.clone(),
            self.iv.to_string(),
            self.iv_source.to_string(),
            self.ov.to_string(),
            self.fv.to_string(),
            self.affected.clone(),
        ]
    }
}

impl TextTable for ReleaseRow {
    fn header() -> Vec<&'static str> {
        vec!["ID", "NAME", "TAG", "COMMIT", "DATE"]
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.name.clone(),
            self.tag.clone(),
            self.commit.chars().take(12).collect(),
            self.date.clone(),
        ]
    }
}

/// Render rows as an aligned text table
pub fn render_text<T: TextTable>(rows: &[T]) -> String {
    let header = T::header();
    let body: Vec<Vec<String>> = rows.iter().map(TextTable::cells).collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let header_cells: Vec<String> = header.iter().map(|h| h.to_string()).collect();
    push_line(&mut output, &header_cells, &widths);
    for cells in &body {
        push_line(&mut output, cells, &widths);
    }
    output
}

fn push_line(output: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .collect();
    output.push_str(line.join("  ").trim_end());
    output.push('\n');
}

/// Render rows as a pretty-printed JSON array
pub fn render_json<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut json = serde_json::to_string_pretty(rows).context("failed to serialize rows")?;
    json.push('\n');
    Ok(json)
}

/// Render rows as JSON lines
pub fn render_jsonl<T: Serialize>(rows: &[T]) -> Result<String> {
    let mut output = String::new();
    for row in rows {
        output.push_str(&serde_json::to_string(row).context("failed to serialize row")?);
        output.push('\n');
    }
    Ok(output)
}

/// Render rows in the requested format
pub fn render<T: Serialize + TextTable>(rows: &[T], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(rows)),
        OutputFormat::Json => render_json(rows),
        OutputFormat::Jsonl => render_jsonl(rows),
    }
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len > width {
        let tail: String = s.chars().skip(len - width.saturating_sub(3)).collect();
        format!("...{}", tail)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
