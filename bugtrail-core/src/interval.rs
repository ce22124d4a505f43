//! Release identifiers and half-open release ranges
//!
//! Global invariants enforced:
//! - Release IDs are 1-based; 0 never names a release
//! - A range is `[start, end)`: start inclusive, end exclusive
//! - `start == end` is the only empty shape (inverted input collapses to empty)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense, 1-based identifier shared by the VCS and tracker side of a release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(u32);

impl ReleaseId {
    /// The oldest aligned release
    pub const FIRST: ReleaseId = ReleaseId(1);

    /// Returns `None` for 0, which is reserved for "unknown"
    pub fn new(id: u32) -> Option<Self> {
        (id > 0).then_some(ReleaseId(id))
    }

    /// ID of the release at a 0-based position in the timeline
    pub fn from_position(position: usize) -> Self {
        ReleaseId(position as u32 + 1)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// 0-based position in the timeline
    pub fn position(self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open interval of release IDs: `start <= id < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRange {
    start: ReleaseId,
    end: ReleaseId,
}

impl ReleaseRange {
    /// Build `[start, end)`. An inverted pair yields an empty range anchored at `end`.
    pub fn new(start: ReleaseId, end: ReleaseId) -> Self {
        if start > end {
            return ReleaseRange::empty_at(end);
        }
        ReleaseRange { start, end }
    }

    pub fn empty_at(at: ReleaseId) -> Self {
        ReleaseRange { start: at, end: at }
    }

    pub fn start(&self) -> ReleaseId {
        self.start
    }

    pub fn end(&self) -> ReleaseId {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Iterate the IDs in ascending order
    pub fn ids(&self) -> impl Iterator<Item = ReleaseId> {
        (self.start.0..self.end.0).map(ReleaseId)
    }
}

impl fmt::Display for ReleaseRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
