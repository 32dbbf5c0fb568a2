//! Identities for cells. A cell is a position in a field which is either filled with a node or
//! empty. Empty (detached) cells are remembered by [`CellId`] so later changes can refill them
//! and so concurrent changes can agree on where they sit.

use std::fmt::{Debug, Formatter};
use smallvec::SmallVec;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::revision::{LocalId, RevisionTag};

/// The identity of one atom of change: a revision and a local id within that revision.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChangeAtomId {
    pub revision: Option<RevisionTag>,
    pub local_id: LocalId,
}

impl ChangeAtomId {
    pub fn new(revision: Option<RevisionTag>, local_id: LocalId) -> Self {
        Self { revision, local_id }
    }

    pub fn offset(&self, by: u32) -> Self {
        Self { revision: self.revision, local_id: self.local_id + by }
    }
}

impl Debug for ChangeAtomId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.revision {
            Some(r) => write!(f, "{:?}.{}", r, self.local_id),
            None => write!(f, "_.{}", self.local_id),
        }
    }
}

/// A contiguous run of local ids.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdRange {
    pub id: LocalId,
    pub count: u32,
}

impl IdRange {
    pub fn new(id: LocalId, count: u32) -> Self { Self { id, count } }

    pub fn end(&self) -> LocalId { self.id + self.count }

    pub fn contains(&self, id: LocalId) -> bool {
        id >= self.id && id < self.end()
    }
}

/// Records that some other revision detached cells next to a cell.
///
/// The cell sits after the first `offset` of the `count` cells which `revision` detached
/// starting at local id `id`. Cells of that revision with a local id below `id + offset` come
/// before the cell, the rest come after it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LineageEvent {
    pub revision: Option<RevisionTag>,
    pub id: LocalId,
    pub count: u32,
    pub offset: u32,
}

impl LineageEvent {
    /// Local ids of `revision` below this bound sort before the cell which owns the event.
    pub fn boundary(&self) -> LocalId {
        self.id + self.offset
    }
}

/// Identifies one (or, with a count, a run of) detached cells.
#[derive(Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellId {
    /// The revision which detached (or created) the cell.
    pub revision: Option<RevisionTag>,
    pub local_id: LocalId,

    /// Detach events which happened next to this cell. Oldest first.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "SmallVec::is_empty"))]
    pub lineage: SmallVec<LineageEvent, 1>,

    /// Cells detached by the same revision in the same gap, in sequence order. Only needed when
    /// a revision's ids don't follow sequence order in that gap.
    ///
    /// The algorithms here never fill this in. It comes from whoever built the changeset (usually
    /// a decoder or an edit builder which renumbered its ids), and is carried along from there.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub adjacent_cells: Option<SmallVec<IdRange, 1>>,
}

impl Debug for CellId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_tuple("CellId");
        s.field(&self.atom());
        if !self.lineage.is_empty() { s.field(&self.lineage); }
        if let Some(adj) = &self.adjacent_cells { s.field(adj); }
        s.finish()
    }
}

impl CellId {
    pub fn new(revision: Option<RevisionTag>, local_id: LocalId) -> Self {
        Self {
            revision,
            local_id,
            lineage: SmallVec::new(),
            adjacent_cells: None,
        }
    }

    pub fn atom(&self) -> ChangeAtomId {
        ChangeAtomId { revision: self.revision, local_id: self.local_id }
    }

    /// The id of the cell `by` positions further along a run of cells. This is what splitting
    /// a detach event does to the second half.
    pub fn offset(&self, by: u32) -> Self {
        Self {
            revision: self.revision,
            local_id: self.local_id + by,
            lineage: self.lineage.clone(),
            adjacent_cells: self.adjacent_cells.clone(),
        }
    }

    /// True if both ids name the same detached cell. Lineage is ignored.
    pub fn same_cell(&self, other: &CellId) -> bool {
        self.revision == other.revision && self.local_id == other.local_id
    }

    /// True if a run of `count` cells starting at self can be extended by the run starting at
    /// `next`.
    pub fn is_continued_by(&self, count: u32, next: &CellId) -> bool {
        self.revision == next.revision
            && self.local_id + count == next.local_id
            && self.lineage == next.lineage
            && self.adjacent_cells == next.adjacent_cells
    }

    pub fn lineage_for(&self, revision: Option<RevisionTag>) -> Option<&LineageEvent> {
        self.lineage.iter().rev().find(|e| e.revision == revision)
    }

    /// Adds a lineage event unless one for the same revision is already recorded.
    pub fn add_lineage(&mut self, event: LineageEvent) {
        if event.revision == self.revision { return; }
        if self.lineage.iter().any(|e| e.revision == event.revision) { return; }
        self.lineage.push(event);
    }

    /// Fills in the revision on this id (and its lineage) if it is anonymous.
    pub fn with_revision(&self, revision: Option<RevisionTag>) -> Self {
        let mut result = self.clone();
        if result.revision.is_none() { result.revision = revision; }
        for e in result.lineage.iter_mut() {
            if e.revision.is_none() { e.revision = revision; }
        }
        result
    }

    /// Position of `local_id` within the adjacent cell list, counted in cells.
    pub(crate) fn adjacent_position(&self, local_id: LocalId) -> Option<u32> {
        let mut pos = 0;
        for range in self.adjacent_cells.as_ref()?.iter() {
            if range.contains(local_id) {
                return Some(pos + (local_id - range.id));
            }
            pos += range.count;
        }
        None
    }
}

impl From<ChangeAtomId> for CellId {
    fn from(atom: ChangeAtomId) -> Self {
        CellId::new(atom.revision, atom.local_id)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DetachIdOverrideType {
    /// The detach undoes an attach. The cell goes back to the id it had before the attach.
    Unattach,
    /// The detach sends content back into a cell which was known before, for example when
    /// undoing a rename.
    Redetach,
}

/// Overrides the id which a detach gives the cell it empties.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DetachIdOverride {
    pub kind: DetachIdOverrideType,
    pub id: CellId,
}

impl DetachIdOverride {
    pub fn unattach(id: CellId) -> Self {
        Self { kind: DetachIdOverrideType::Unattach, id }
    }

    pub fn redetach(id: CellId) -> Self {
        Self { kind: DetachIdOverrideType::Redetach, id }
    }

    pub(crate) fn offset(&self, by: u32) -> Self {
        Self { kind: self.kind, id: self.id.offset(by) }
    }
}
