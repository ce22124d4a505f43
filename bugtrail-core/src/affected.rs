//! Affected-version reconstruction
//!
//! Every ticket's affected releases are rebuilt as `[IV, FV)`. The tracker's
//! own affected-version list only seeded the IV and is not consulted here.

use crate::interval::ReleaseRange;
use crate::release::{Release, ReleaseTimeline};
use crate::ticket::ResolvedTicket;

/// Range of a single ticket; empty while its IV is unknown
pub fn affected_range(ticket: &ResolvedTicket) -> ReleaseRange {
    match ticket.iv.id() {
        Some(iv) => ReleaseRange::new(iv, ticket.fv),
        None => ReleaseRange::empty_at(ticket.fv),
    }
}

/// Replace the affected range of every ticket; returns how many are non-empty
pub fn rebuild_affected_versions(tickets: &mut [ResolvedTicket]) -> usize {
    let mut non_empty = 0;
    for ticket in tickets.iter_mut() {
        ticket.affected = affected_range(ticket);
        if !ticket.affected.is_empty() {
            non_empty += 1;
        }
    }
    non_empty
}

/// Releases covered by `range`, oldest first
pub fn affected_releases<'a>(
    range: ReleaseRange,
    timeline: &'a ReleaseTimeline,
) -> impl Iterator<Item = &'a Release> + 'a {
    range.ids().filter_map(move |id| timeline.get(id))
}
