//! Side table used to connect the two ends of a move. The source and destination of a move can
//! be in different places in the same field (or in different fields entirely), so whichever end
//! is processed first records what the other end needs to know.
//!
//! Algorithms run in at most two passes. The first pass records every lookup it makes. If a later
//! write changes data which an earlier lookup already read, the table is invalidated and the
//! caller runs a second pass with the (now complete) table.

use std::collections::BTreeMap;

use smallvec::SmallVec;
use tracing::debug;

use crate::cell::ChangeAtomId;
use crate::mark::{Attach, Detach, MarkEffect};
use crate::range_map::{RangeMap, RangeQueryResult, RangeValue};
use crate::revision::{LocalId, RevisionTag};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum CrossFieldTarget {
    /// Data keyed by the move out end of a move.
    Source,
    /// Data keyed by the move in end of a move.
    Destination,
}

#[derive(Clone, Debug)]
pub struct CrossFieldTable<T> {
    src: BTreeMap<Option<RevisionTag>, RangeMap<T>>,
    dst: BTreeMap<Option<RevisionTag>, RangeMap<T>>,

    src_queries: BTreeMap<Option<RevisionTag>, RangeMap<()>>,
    dst_queries: BTreeMap<Option<RevisionTag>, RangeMap<()>>,

    is_invalidated: bool,
}

impl<T> Default for CrossFieldTable<T> {
    fn default() -> Self {
        Self {
            src: BTreeMap::new(),
            dst: BTreeMap::new(),
            src_queries: BTreeMap::new(),
            dst_queries: BTreeMap::new(),
            is_invalidated: false,
        }
    }
}

impl<T: RangeValue + PartialEq> CrossFieldTable<T> {
    pub fn new() -> Self { Self::default() }

    fn data(&self, target: CrossFieldTarget) -> &BTreeMap<Option<RevisionTag>, RangeMap<T>> {
        match target {
            CrossFieldTarget::Source => &self.src,
            CrossFieldTarget::Destination => &self.dst,
        }
    }

    /// Look up the data recorded for the given move end. If `add_dependency` is set, a later `set`
    /// which changes this range will invalidate the table.
    pub fn get(&mut self, target: CrossFieldTarget, revision: Option<RevisionTag>, id: LocalId, count: u32, add_dependency: bool) -> RangeQueryResult<T> {
        if add_dependency {
            let queries = match target {
                CrossFieldTarget::Source => &mut self.src_queries,
                CrossFieldTarget::Destination => &mut self.dst_queries,
            };
            queries.entry(revision).or_default().set(id, count, ());
        }

        match self.data(target).get(&revision) {
            Some(map) => map.get(id, count),
            None => RangeQueryResult { value: None, length: count },
        }
    }

    fn differs(&self, target: CrossFieldTarget, revision: Option<RevisionTag>, id: LocalId, count: u32, value: &T) -> bool {
        let Some(map) = self.data(target).get(&revision) else { return true; };
        let mut offset = 0;
        while offset < count {
            let result = map.get(id + offset, count - offset);
            match result.value {
                Some(v) if v == value.offset(offset) => {}
                _ => return true,
            }
            offset += result.length;
        }
        false
    }

    /// Record data for a move end. If `invalidate_dependents` is set and an earlier `get` read an
    /// overlapping range which now has a different value, the table becomes invalidated.
    pub fn set(&mut self, target: CrossFieldTarget, revision: Option<RevisionTag>, id: LocalId, count: u32, value: T, invalidate_dependents: bool) {
        if invalidate_dependents && !self.is_invalidated {
            let queries = match target {
                CrossFieldTarget::Source => &self.src_queries,
                CrossFieldTarget::Destination => &self.dst_queries,
            };
            let queried = queries.get(&revision).map_or(false, |q| q.overlaps(id, count));
            if queried && self.differs(target, revision, id, count, &value) {
                self.is_invalidated = true;
            }
        }

        let data = match target {
            CrossFieldTarget::Source => &mut self.src,
            CrossFieldTarget::Destination => &mut self.dst,
        };
        data.entry(revision).or_default().set(id, count, value);
    }

    pub fn is_invalidated(&self) -> bool { self.is_invalidated }

    /// Called between passes. Recorded data is kept.
    pub fn reset_invalidation(&mut self) {
        self.is_invalidated = false;
    }
}

/// What one end of a move tells the other.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MoveEffect<C> {
    /// Nested changes for the moved node, to be applied at the other end.
    pub changes: Option<C>,
    /// A concurrent detach of the moved content, to be applied where the content ends up.
    pub detach: Option<Detach>,
    /// The far end of a chain of moves.
    pub final_endpoint: Option<ChangeAtomId>,
    /// The move no longer happens. The other end must become inert.
    pub cancelled: bool,
}

impl<C> Default for MoveEffect<C> {
    fn default() -> Self {
        Self { changes: None, detach: None, final_endpoint: None, cancelled: false }
    }
}

impl<C: Clone> RangeValue for MoveEffect<C> {
    fn offset(&self, by: u32) -> Self {
        debug_assert!(by == 0 || self.changes.is_none(), "Nested changes are recorded for single nodes");
        Self {
            changes: self.changes.clone(),
            detach: self.detach.as_ref().map(|d| d.offset(by)),
            final_endpoint: self.final_endpoint.map(|e| e.offset(by)),
            cancelled: self.cancelled,
        }
    }
}

/// The table every sequence field operation uses.
pub type CrossFieldManager<C> = CrossFieldTable<MoveEffect<C>>;

/// One end of a move, as a key into the table.
pub(crate) type MoveEnd = (CrossFieldTarget, Option<RevisionTag>, LocalId);

/// The ends of moves which an effect contains.
pub(crate) fn move_ends(effect: &MarkEffect) -> SmallVec<MoveEnd, 2> {
    let (attach, detach) = effect.parts();
    let mut result = SmallVec::new();
    if let Some(Attach::MoveIn(m)) = attach {
        result.push((CrossFieldTarget::Destination, m.revision, m.id));
    }
    if let Some(Detach::MoveOut(m)) = detach {
        result.push((CrossFieldTarget::Source, m.revision, m.id));
    }
    result
}

impl<C: Clone + PartialEq> CrossFieldTable<MoveEffect<C>> {
    /// Shorten `len` so the table holds a single answer for each of the given move ends over the
    /// whole run. Doesn't add dependencies.
    pub(crate) fn clamp(&mut self, ends: &[MoveEnd], mut len: u32) -> u32 {
        for &(target, revision, id) in ends {
            len = self.get(target, revision, id, len, false).length;
        }
        len
    }

    /// Look up (and depend on) the move effect recorded for a run of ids.
    pub(crate) fn lookup(&mut self, target: CrossFieldTarget, revision: Option<RevisionTag>, id: LocalId, count: u32) -> Option<MoveEffect<C>> {
        self.get(target, revision, id, count, true).value
    }

    /// Modify the move effect for a run of ids in place. Runs which already hold different data
    /// are updated piece by piece.
    pub fn update_move_effect<F>(&mut self, target: CrossFieldTarget, revision: Option<RevisionTag>, id: LocalId, count: u32, f: F)
        where F: Fn(&mut MoveEffect<C>)
    {
        let mut offset = 0;
        while offset < count {
            let result = self.get(target, revision, id + offset, count - offset, false);
            let mut effect = result.value.unwrap_or_default();
            f(&mut effect);
            self.set(target, revision, id + offset, result.length, effect, true);
            offset += result.length;
        }
    }
}

/// Run `pass` with the table, and run it again if the first run invalidated the table. The second
/// run sees everything the first one recorded.
///
/// Panics if the second run invalidates the table too.
pub fn run_passes<C, T, F>(table: &mut CrossFieldManager<C>, mut pass: F) -> T
    where C: Clone + PartialEq, F: FnMut(&mut CrossFieldManager<C>) -> T
{
    let result = pass(table);
    if !table.is_invalidated() { return result; }

    debug!("Cross-field table invalidated. Running a second pass");
    table.reset_invalidation();
    let result = pass(table);
    assert!(!table.is_invalidated(), "Cross-field data is still changing after two passes");
    result
}
