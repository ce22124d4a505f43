//! Commit binding and fix-commit linking
//!
//! Global invariants enforced:
//! - Commits are ordered by date (stable for equal dates)
//! - Release binding is monotonic: a later commit never binds to an earlier release
//! - A commit links to at most one ticket; a ticket to at most one fix commit
//! - Tickets without a fix commit are dropped

use crate::interval::ReleaseId;
use crate::release::ReleaseTimeline;
use crate::ticket::Ticket;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A commit as read from the repository log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommit {
    pub id: String,
    /// First parent; `None` for a root commit
    pub parent_id: Option<String>,
    pub author: String,
    pub date: DateTime<Utc>,
    pub message: String,
}

/// A commit bound to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Commit {
    pub id: String,
    pub parent_id: Option<String>,
    pub author: String,
    pub date: DateTime<Utc>,
    pub message: String,
    pub release: ReleaseId,
    /// Key of the ticket this commit fixes
    pub ticket: Option<String>,
}

/// Sort commits by date and bind each to its release
///
/// A commit binds to the first release whose tag date is at or after the
/// commit date. Commits newer than the last release bind to the last release.
pub fn bind_commits(mut raw: Vec<RawCommit>, timeline: &ReleaseTimeline) -> Vec<Commit> {
    raw.sort_by_key(|c| c.date);
    raw.into_iter()
        .map(|c| Commit {
            release: timeline.release_for(c.date),
            id: c.id,
            parent_id: c.parent_id,
            author: c.author,
            date: c.date,
            message: c.message,
            ticket: None,
        })
        .collect()
}

/// Link tickets to their fix commits by key substring
///
/// Tickets are scanned in the given order. Each takes the oldest matching
/// commit not yet claimed by an earlier ticket. Returns the tickets that
/// found a commit, with `fix_commit` set.
pub fn link_tickets(commits: &mut [Commit], tickets: Vec<Ticket>) -> Vec<Ticket> {
    let mut linked = Vec::with_capacity(tickets.len());
    for mut ticket in tickets {
        let found = commits
            .iter_mut()
            .find(|c| c.ticket.is_none() && mentions_key(&c.message, &ticket.key));
        match found {
            Some(commit) => {
                commit.ticket = Some(ticket.key.clone());
                ticket.fix_commit = Some(commit.id.clone());
                linked.push(ticket);
            }
            None => {
                tracing::debug!(ticket = %ticket.key, "no fix commit mentions ticket");
            }
        }
    }
    linked
}

fn mentions_key(message: &str, key: &str) -> bool {
    !key.is_empty() && message.contains(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::{align_releases, AlignOptions, TrackerRelease, VcsTag};
    use chrono::{NaiveDate, TimeZone};

    fn timeline() -> ReleaseTimeline {
        let tags: Vec<VcsTag> = [5, 15]
            .iter()
            .enumerate()
            .map(|(i, d)| VcsTag {
                name: format!("1.{}", i),
                commit_id: format!("t{}", i),
                date: Utc.with_ymd_and_hms(2021, 3, *d, 0, 0, 0).unwrap(),
            })
            .collect();
        let tracker: Vec<TrackerRelease> = tags
            .iter()
            .map(|t| TrackerRelease {
                name: t.name.clone(),
                date: Some(t.date.date_naive()),
                released: true,
            })
            .collect();
        align_releases(&tags, &tracker, AlignOptions::default()).unwrap()
    }

    fn raw(id: &str, day: u32, message: &str) -> RawCommit {
        RawCommit {
            id: id.to_string(),
            parent_id: None,
            author: "dev".to_string(),
            date: Utc.with_ymd_and_hms(2021, 3, day, 1, 0, 0).unwrap(),
            message: message.to_string(),
        }
    }

    fn ticket(key: &str) -> Ticket {
        let day = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        Ticket {
            id: key.to_string(),
            key: key.to_string(),
            created: day,
            resolved: day,
            fix_versions: Vec::new(),
            affected_versions: Vec::new(),
            fix_commit: None,
        }
    }

    #[test]
    fn test_bind_sorts_and_binds_monotonically() {
        let commits = bind_commits(
            vec![raw("c", 20, ""), raw("a", 1, ""), raw("b", 10, "")],
            &timeline(),
        );
        let ids: Vec<&str> = commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        let releases: Vec<u32> = commits.iter().map(|c| c.release.get()).collect();
        assert_eq!(releases, vec![1, 2, 2], "newer than last release binds to last");
    }

    #[test]
    fn test_link_takes_oldest_unclaimed_commit() {
        let mut commits = bind_commits(
            vec![
                raw("a", 1, "PROJ-1 and PROJ-2 first attempt"),
                raw("b", 2, "PROJ-2 follow-up"),
                raw("c", 3, "unrelated"),
            ],
            &timeline(),
        );
        let linked = link_tickets(&mut commits, vec![ticket("PROJ-1"), ticket("PROJ-2")]);

        assert_eq!(linked.len(), 2);
        assert_eq!(linked[0].fix_commit.as_deref(), Some("a"));
        // "a" is already claimed by PROJ-1
        assert_eq!(linked[1].fix_commit.as_deref(), Some("b"));
        assert_eq!(commits[0].ticket.as_deref(), Some("PROJ-1"));
        assert_eq!(commits[1].ticket.as_deref(), Some("PROJ-2"));
        assert!(commits[2].ticket.is_none());
    }

    #[test]
    fn test_tickets_without_commit_are_dropped() {
        let mut commits = bind_commits(vec![raw("a", 1, "PROJ-1")], &timeline());
        let linked = link_tickets(&mut commits, vec![ticket("PROJ-9"), ticket("PROJ-1")]);
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].key, "PROJ-1");
    }

    #[test]
    fn test_key_is_plain_substring() {
        // PROJ-1 is a prefix of PROJ-12 and matches its message too
        let mut commits = bind_commits(vec![raw("a", 1, "fix PROJ-12")], &timeline());
        let linked = link_tickets(&mut commits, vec![ticket("PROJ-1")]);
        assert_eq!(linked.len(), 1);
    }
}
