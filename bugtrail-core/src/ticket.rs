//! Bug tickets and their version triple (IV, OV, FV)
//!
//! Global invariants enforced:
//! - Ticket versions only ever name aligned releases
//! - A resolved ticket always has an FV; OV <= FV after selection
//! - A reported IV is the oldest reported affected version
//! - Tickets whose FV cannot be placed are dropped, never guessed

use crate::interval::{ReleaseId, ReleaseRange};
use crate::release::ReleaseTimeline;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bug ticket as supplied by the tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerTicket {
    pub id: String,
    pub key: String,
    pub created: NaiveDate,
    pub resolved: NaiveDate,
    /// Names of released fix versions
    pub fix_versions: Vec<String>,
    /// Names of released affected versions
    pub affected_versions: Vec<String>,
}

/// A ticket whose version names were mapped onto the aligned timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: String,
    pub key: String,
    pub created: NaiveDate,
    pub resolved: NaiveDate,
    pub fix_versions: Vec<ReleaseId>,
    pub affected_versions: Vec<ReleaseId>,
    /// Representative fix commit, set by the commit linker
    pub fix_commit: Option<String>,
}

impl Ticket {
    /// Map version names onto aligned releases, dropping names with no match
    pub fn from_tracker(raw: TrackerTicket, timeline: &ReleaseTimeline) -> Self {
        let map = |names: &[String]| -> Vec<ReleaseId> {
            let mut ids: Vec<ReleaseId> = names
                .iter()
                .filter_map(|n| timeline.by_name(n).map(|r| r.id))
                .collect();
            ids.sort();
            ids.dedup();
            ids
        };
        Ticket {
            fix_versions: map(&raw.fix_versions),
            affected_versions: map(&raw.affected_versions),
            id: raw.id,
            key: raw.key,
            created: raw.created,
            resolved: raw.resolved,
            fix_commit: None,
        }
    }
}

/// Where a ticket's injected version came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "release")]
pub enum InjectedVersion {
    /// Oldest affected version reported by the tracker
    Reported(ReleaseId),
    /// Estimated with Proportion
    Predicted(ReleaseId),
    Unknown,
}

impl InjectedVersion {
    pub fn id(&self) -> Option<ReleaseId> {
        match self {
            InjectedVersion::Reported(id) | InjectedVersion::Predicted(id) => Some(*id),
            InjectedVersion::Unknown => None,
        }
    }

    pub fn is_reported(&self) -> bool {
        matches!(self, InjectedVersion::Reported(_))
    }

    /// Release ID with 0 standing for unknown
    pub fn sentinel_id(&self) -> u32 {
        self.id().map(ReleaseId::get).unwrap_or(0)
    }
}

/// A ticket with its version triple resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResolvedTicket {
    pub id: String,
    pub key: String,
    pub created: NaiveDate,
    pub resolved: NaiveDate,
    pub fix_commit: Option<String>,
    /// `None` when the creation date is after the last release
    pub ov: Option<ReleaseId>,
    pub fv: ReleaseId,
    pub iv: InjectedVersion,
    /// Whether the tracker reported any (aligned) affected version
    pub had_affected_versions: bool,
    /// `[IV, FV)`, rebuilt once IV is known or predicted
    pub affected: ReleaseRange,
}

impl ResolvedTicket {
    /// OV after normalization; an unplaceable OV falls back to FV
    pub fn observed(&self) -> ReleaseId {
        self.ov.unwrap_or(self.fv)
    }
}

/// Choose the fixed version of a ticket
///
/// No reported fix version: the first release at or after the resolution
/// date (`None` if resolution is after the last release). One: that one.
/// Several: the oldest.
pub fn fixed_version(ticket: &Ticket, timeline: &ReleaseTimeline) -> Option<ReleaseId> {
    match ticket.fix_versions.iter().min() {
        Some(oldest) => Some(*oldest),
        None => timeline.first_on_or_after(ticket.resolved).map(|r| r.id),
    }
}

/// First release at or after the creation date
pub fn observed_version(ticket: &Ticket, timeline: &ReleaseTimeline) -> Option<ReleaseId> {
    timeline.first_on_or_after(ticket.created).map(|r| r.id)
}

/// Oldest reported affected version, if any
pub fn injected_version(ticket: &Ticket) -> InjectedVersion {
    ticket
        .affected_versions
        .iter()
        .min()
        .map_or(InjectedVersion::Unknown, |id| InjectedVersion::Reported(*id))
}

/// Resolve FV, OV and IV. Returns `None` when FV cannot be placed.
pub fn resolve_versions(ticket: &Ticket, timeline: &ReleaseTimeline) -> Option<ResolvedTicket> {
    let fv = fixed_version(ticket, timeline)?;
    Some(ResolvedTicket {
        id: ticket.id.clone(),
        key: ticket.key.clone(),
        created: ticket.created,
        resolved: ticket.resolved,
        fix_commit: ticket.fix_commit.clone(),
        ov: observed_version(ticket, timeline),
        fv,
        iv: injected_version(ticket),
        had_affected_versions: !ticket.affected_versions.is_empty(),
        affected: ReleaseRange::empty_at(fv),
    })
}

/// Why a resolved ticket was rejected by selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Reported IV is not strictly before OV
    InconsistentInjected,
    /// No reported IV and OV == FV: nothing to estimate
    NoInterval,
}

/// Normalize OV (OV after FV becomes FV) and decide whether the ticket is usable
///
/// With reported affected versions the ticket is kept only if IV < OV.
/// Without, it is kept only if OV < FV.
pub fn select_ticket(ticket: &mut ResolvedTicket) -> Result<(), Rejection> {
    let ov = ticket.observed().min(ticket.fv);
    ticket.ov = Some(ov);

    if ticket.had_affected_versions {
        match ticket.iv.id() {
            Some(iv) if iv < ov => Ok(()),
            _ => Err(Rejection::InconsistentInjected),
        }
    } else if ov < ticket.fv {
        Ok(())
    } else {
        Err(Rejection::NoInterval)
    }
}

/// Apply [`select_ticket`] to every ticket, keeping the survivors in order
pub fn select_tickets(tickets: Vec<ResolvedTicket>) -> (Vec<ResolvedTicket>, usize) {
    let mut rejected = 0;
    let kept = tickets
        .into_iter()
        .filter_map(|mut t| match select_ticket(&mut t) {
            Ok(()) => Some(t),
            Err(reason) => {
                tracing::debug!(ticket = %t.key, ?reason, "ticket rejected by selection");
                rejected += 1;
                None
            }
        })
        .collect();
    (kept, rejected)
}
