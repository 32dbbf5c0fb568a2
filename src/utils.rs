//! Helpers shared by compose, rebase and invert. Mostly about figuring out the relative order of
//! detached cells which two different changesets refer to.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::cell::CellId;
use crate::mark::{Changeset, Mark};
use crate::revision::{RevisionMetadataSource, RevisionTag};

/// The relative position of two cells, one referenced by an "old" changeset and one by a "new"
/// changeset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CellOrder {
    SameCell,
    OldThenNew,
    NewThenOld,
}

impl CellOrder {
    fn from_old_first(old_first: bool) -> Self {
        if old_first { CellOrder::OldThenNew } else { CellOrder::NewThenOld }
    }
}

/// The set of revisions whose cells a changeset has marks for.
pub type CellKnowledge = BTreeSet<Option<RevisionTag>>;

/// Revisions of every cell named in the changeset's input context.
pub fn input_knowledge<C>(changeset: &[Mark<C>]) -> CellKnowledge {
    changeset.iter()
        .filter_map(|m| m.cell_id.as_ref().map(|c| c.revision))
        .collect()
}

/// Revisions of every empty cell in the changeset's output context.
pub fn output_knowledge<C>(changeset: &[Mark<C>]) -> CellKnowledge {
    changeset.iter()
        .filter_map(|m| m.output_cell_id().map(|c| c.revision))
        .collect()
}

/// Order two cells using only their lineage. Scans `b`'s lineage from newest to oldest looking
/// for a revision which also appears in `a`'s lineage.
///
/// Returns Less if `a` comes first, Greater if `b` comes first and Equal if the lineage doesn't
/// say.
pub fn compare_lineages(a: &CellId, b: &CellId) -> Ordering {
    for b_event in b.lineage.iter().rev() {
        if let Some(a_event) = a.lineage_for(b_event.revision) {
            match a_event.boundary().cmp(&b_event.boundary()) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
    }
    Ordering::Equal
}

/// Order the detached cells which two changesets refer to at the same gap.
///
/// `old_knowledge` and `new_knowledge` name the revisions each changeset has tombstones or marks
/// for. A changeset which knows about a revision's cells lists all of them, so if the new
/// changeset knows the old cell's revision but has reached `new_cell` first, the new cell comes
/// first (and vice versa).
///
/// When nothing else decides, the cell from the later revision comes first. Revisions outside
/// the metadata's window are older than everything inside it. Remaining ties go to the new cell.
pub fn compare_cell_positions_using_tombstones<M: RevisionMetadataSource>(
    old_cell: &CellId,
    new_cell: &CellId,
    old_knowledge: &CellKnowledge,
    new_knowledge: &CellKnowledge,
    metadata: &M
) -> CellOrder {
    if old_cell.same_cell(new_cell) { return CellOrder::SameCell; }

    if old_cell.revision == new_cell.revision {
        for adj_owner in [old_cell, new_cell] {
            if let (Some(o), Some(n)) = (adj_owner.adjacent_position(old_cell.local_id), adj_owner.adjacent_position(new_cell.local_id)) {
                return CellOrder::from_old_first(o < n);
            }
        }

        // Cells detached by one (tagged) revision are numbered in sequence order.
        if old_cell.revision.is_some() {
            return CellOrder::from_old_first(old_cell.local_id < new_cell.local_id);
        }
    }

    if let Some(e) = new_cell.lineage_for(old_cell.revision) {
        return CellOrder::from_old_first(old_cell.local_id < e.boundary());
    }
    if let Some(e) = old_cell.lineage_for(new_cell.revision) {
        return CellOrder::from_old_first(new_cell.local_id >= e.boundary());
    }

    match compare_lineages(old_cell, new_cell) {
        Ordering::Less => return CellOrder::OldThenNew,
        Ordering::Greater => return CellOrder::NewThenOld,
        Ordering::Equal => {}
    }

    let old_knows_new = old_knowledge.contains(&new_cell.revision);
    let new_knows_old = new_knowledge.contains(&old_cell.revision);
    match (old_knows_new, new_knows_old) {
        (true, false) => return CellOrder::OldThenNew,
        (false, true) => return CellOrder::NewThenOld,
        _ => {}
    }

    match (metadata.get_index(old_cell.revision), metadata.get_index(new_cell.revision)) {
        (Some(o), Some(n)) if o > n => CellOrder::OldThenNew,
        (Some(_), None) => CellOrder::OldThenNew,
        // New cell wins.
        _ => CellOrder::NewThenOld,
    }
}

/// Decide which of two runs of empty cells comes first, and how many cells of that run can be
/// taken before the other run must be considered again.
///
/// Runs from the same revision which overlap but start at different ids are split where the
/// later one starts. Runs starting at the same cell are paired up.
pub(crate) fn order_empty_cells<M: RevisionMetadataSource>(
    old_cell: &CellId, old_count: u32,
    new_cell: &CellId, new_count: u32,
    old_knowledge: &CellKnowledge,
    new_knowledge: &CellKnowledge,
    metadata: &M
) -> (CellOrder, u32) {
    if old_cell.same_cell(new_cell) {
        return (CellOrder::SameCell, old_count.min(new_count));
    }

    if old_cell.revision == new_cell.revision {
        let (o, n) = (old_cell.local_id, new_cell.local_id);
        if o < n && n < o + old_count { return (CellOrder::OldThenNew, n - o); }
        if n < o && o < n + new_count { return (CellOrder::NewThenOld, o - n); }
    }

    match compare_cell_positions_using_tombstones(old_cell, new_cell, old_knowledge, new_knowledge, metadata) {
        CellOrder::OldThenNew => (CellOrder::OldThenNew, old_count),
        CellOrder::NewThenOld => (CellOrder::NewThenOld, new_count),
        CellOrder::SameCell => unreachable!(),
    }
}

/// Tag every anonymous effect and cell id in the changeset with `revision`.
pub fn with_revision<C: Clone>(changeset: &[Mark<C>], revision: Option<RevisionTag>) -> Changeset<C> {
    if revision.is_none() { return changeset.to_vec(); }

    changeset.iter().map(|mark| Mark {
        count: mark.count,
        cell_id: mark.cell_id.as_ref().map(|c| c.with_revision(revision)),
        changes: mark.changes.clone(),
        effect: mark.effect.with_revision(revision),
    }).collect()
}
