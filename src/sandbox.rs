//! A tiny interpreter for sequence field changesets, used by the tests. A field is an explicit list
//! of cells, full or empty, so tests can check what a changeset does to content rather than what
//! it looks like.

use std::collections::BTreeMap;
use rand::prelude::*;

use crate::cell::{CellId, ChangeAtomId};
use crate::mark::{Attach, Changeset, Detach, Mark, MarkEffect};
use crate::prune::prune;
use crate::revision::{LocalId, RevisionTag};
use rle::SplitableSpan;
use crate::utils::with_revision;

/// Nodes are named after the insert which created them.
pub(crate) type Node = ChangeAtomId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct Cell {
    /// The cell's current id. Only meaningful while the cell is empty.
    pub name: ChangeAtomId,
    /// Removed content stays in its cell. Moved content doesn't.
    pub node: Option<Node>,
    pub live: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct Field {
    pub cells: Vec<Cell>,
}

#[derive(Debug)]
struct PendingAttach {
    cell: ChangeAtomId,
    from: ChangeAtomId,
    then: Option<Detach>,
}

impl Field {
    /// A field with `count` live nodes named after `revision`.
    pub(crate) fn new_with_nodes(revision: RevisionTag, count: u32) -> Self {
        Self {
            cells: (0..count).map(|i| {
                let name = ChangeAtomId::new(Some(revision), i);
                Cell { name, node: Some(name), live: true }
            }).collect()
        }
    }

    /// The nodes in the field, in order.
    pub(crate) fn content(&self) -> Vec<Node> {
        self.cells.iter()
            .filter(|c| c.live)
            .map(|c| c.node.unwrap())
            .collect()
    }

    fn find_live(&self, from: usize) -> usize {
        (from..self.cells.len())
            .find(|&i| self.cells[i].live)
            .expect("Changeset covers more content than the field has")
    }

    /// Find the named empty cell between `from` and the next full cell. Cells which don't exist yet
    /// are created at `from`.
    fn find_empty(&mut self, from: usize, name: ChangeAtomId) -> usize {
        for i in from..self.cells.len() {
            let cell = &self.cells[i];
            if cell.live { break; }
            if cell.name == name { return i; }
        }

        assert!(!self.cells.iter().any(|c| !c.live && c.name == name), "Cell {:?} referenced out of order", name);
        self.cells.insert(from, Cell { name, node: None, live: false });
        from
    }

    fn detach(cell: &mut Cell, detach: &Detach, output: ChangeAtomId, transit: &mut BTreeMap<ChangeAtomId, Node>) {
        if let Detach::MoveOut(m) = detach {
            let node = cell.node.take().expect("Moving out of a cell with no content");
            transit.insert(m.atom(), node);
        }
        cell.live = false;
        cell.name = output;
    }

    fn attach(cell: &mut Cell, insert_into: &CellId, is_new: bool) {
        assert!(!cell.live);
        if is_new {
            assert!(cell.node.is_none(), "Inserting into a cell which has content: {:?}", insert_into);
            cell.node = Some(insert_into.atom());
        } else {
            assert!(cell.node.is_some(), "Reviving a cell with no content: {:?}", insert_into);
        }
        cell.live = true;
    }

    /// Apply a single cell mark. Returns the index of the cell it applied to.
    fn apply_one<C>(&mut self, mark: &Mark<C>, from: usize, transit: &mut BTreeMap<ChangeAtomId, Node>, pending: &mut Vec<PendingAttach>) -> usize {
        let idx = match &mark.cell_id {
            None => self.find_live(from),
            Some(c) => self.find_empty(from, c.atom()),
        };
        let output = mark.output_cell_id().map(|c| c.atom());
        let cell = &mut self.cells[idx];

        match &mark.effect {
            MarkEffect::NoOp => {}
            MarkEffect::Insert(insert) => {
                // Inserting into a full cell does nothing.
                if let Some(c) = &mark.cell_id {
                    Self::attach(cell, c, insert.is_new_content(c));
                }
            }
            MarkEffect::MoveIn(m) => {
                pending.push(PendingAttach { cell: cell.name, from: m.atom(), then: None });
            }
            MarkEffect::Remove(_) | MarkEffect::MoveOut(_) => {
                Self::detach(cell, &mark.effect.as_detach().unwrap(), output.unwrap(), transit);
            }
            MarkEffect::AttachAndDetach(ad) => {
                let input = mark.cell_id.as_ref().unwrap();
                match &ad.attach {
                    Attach::Insert(insert) => {
                        Self::attach(cell, input, insert.is_new_content(input));
                        Self::detach(cell, &ad.detach, output.unwrap(), transit);
                    }
                    Attach::MoveIn(m) => {
                        cell.name = output.unwrap();
                        pending.push(PendingAttach { cell: cell.name, from: m.atom(), then: Some(ad.detach.clone()) });
                    }
                }
            }
        }
        idx
    }

    pub(crate) fn apply<C: Clone>(&mut self, change: &[Mark<C>], revision: Option<RevisionTag>) {
        let marks = with_revision(change, revision);
        let mut transit = BTreeMap::new();
        let mut pending = Vec::new();

        let mut idx = 0;
        for mark in marks {
            let mut mark = mark.without_changes::<()>();
            loop {
                let rest = if mark.count > 1 { Some(mark.truncate(1)) } else { None };
                idx = self.apply_one(&mark, idx, &mut transit, &mut pending) + 1;
                match rest {
                    Some(rest) => mark = rest,
                    None => break,
                }
            }
        }

        // Moves land once everything is detached. Chains of moves may take a few rounds.
        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|p| {
                let Some(node) = transit.remove(&p.from) else { return true; };
                let cell = self.cells.iter_mut()
                    .find(|c| !c.live && c.name == p.cell)
                    .expect("Move destination is missing");
                cell.node = Some(node);
                match &p.then {
                    None => cell.live = true,
                    Some(Detach::MoveOut(m)) => { transit.insert(m.atom(), cell.node.take().unwrap()); }
                    Some(Detach::Remove(_)) => {}
                }
                false
            });
            assert!(pending.len() < before, "Moved content never arrived: {:?}", pending);
        }
        assert!(transit.is_empty(), "Moved content has nowhere to go: {:?}", transit);
    }
}

impl<C> Mark<C> {
    fn without_changes<D>(&self) -> Mark<D> {
        Mark { count: self.count, cell_id: self.cell_id.clone(), changes: None, effect: self.effect.clone() }
    }
}

fn alloc(next_id: &mut LocalId, count: u32) -> LocalId {
    let id = *next_id;
    *next_id += count;
    id
}

/// Make a random change to the field. The change has a tombstone for every empty cell it passes,
/// so it lists cells in exactly the order the field has them.
pub(crate) fn random_change(field: &Field, revision: RevisionTag, with_moves: bool, rng: &mut SmallRng) -> Changeset<()> {
    let rev = Some(revision);
    let mut next_id = 0;
    let mut slots: Vec<Mark<()>> = Vec::new();
    let mut moved = Vec::new();

    for cell in field.cells.iter() {
        if rng.gen_bool(0.15) {
            let count = rng.gen_range(1..3);
            slots.push(Mark::insert(count, rev, alloc(&mut next_id, count)));
        }

        let mark = if cell.live {
            match rng.gen_range(0..10) {
                0 | 1 => Mark::remove(1, rev, alloc(&mut next_id, 1)),
                2 if with_moves => {
                    let id = alloc(&mut next_id, 1);
                    moved.push(id);
                    Mark::move_out(1, rev, id)
                }
                _ => Mark::skip(1),
            }
        } else {
            let cell_id = CellId::from(cell.name);
            if cell.node.is_some() && rng.gen_bool(0.25) {
                Mark::revive(1, cell_id, rev, alloc(&mut next_id, 1))
            } else {
                Mark::tombstone(1, cell_id)
            }
        };
        slots.push(mark);
    }

    if rng.gen_bool(0.2) {
        let count = rng.gen_range(1..3);
        slots.push(Mark::insert(count, rev, alloc(&mut next_id, count)));
    }

    for id in moved {
        let dest = CellId::new(rev, alloc(&mut next_id, 1));
        let pos = rng.gen_range(0..=slots.len());
        slots.insert(pos, Mark::move_in(1, rev, id, dest));
    }

    prune(&slots)
}

#[cfg(test)]
mod test {
    use super::*;

    const R0: RevisionTag = RevisionTag(0);
    const R1: Option<RevisionTag> = Some(RevisionTag(1));
    const R2: Option<RevisionTag> = Some(RevisionTag(2));

    fn node(i: u32) -> Node { ChangeAtomId::new(Some(R0), i) }

    #[test]
    fn insert_remove_revive() {
        let mut field = Field::new_with_nodes(R0, 3);
        field.apply::<()>(&[Mark::skip(1), Mark::insert(1, R1, 0), Mark::remove(1, R1, 1)], R1);
        assert_eq!(field.content(), vec![node(0), ChangeAtomId::new(R1, 0), node(2)]);

        field.apply::<()>(&[Mark::skip(2), Mark::revive(1, CellId::new(R1, 1), R2, 0)], R2);
        assert_eq!(field.content(), vec![node(0), ChangeAtomId::new(R1, 0), node(1), node(2)]);
    }

    #[test]
    fn moves_land_after_the_walk() {
        let mut field = Field::new_with_nodes(R0, 3);
        field.apply::<()>(&[
            Mark::move_in(1, R1, 0, CellId::new(R1, 5)),
            Mark::skip(2),
            Mark::move_out(1, R1, 0),
        ], R1);
        assert_eq!(field.content(), vec![node(2), node(0), node(1)]);
    }

    #[test]
    fn random_changes_apply() {
        let mut rng = SmallRng::seed_from_u64(10);
        let mut field = Field::new_with_nodes(R0, 5);
        for r in 1..50 {
            let change = random_change(&field, RevisionTag(r), true, &mut rng);
            field.apply(&change, Some(RevisionTag(r)));
        }
    }
}
