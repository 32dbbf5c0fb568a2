//! Rebasing a sequence field changeset over a concurrent one.
//!
//! `rebase(change, over)` walks both changesets over their shared input context and produces a
//! changeset with the same intent as `change`, expressed against the output context of `over`.

use std::cmp::min;

use tracing::trace;

use crate::cell::{CellId, LineageEvent};
use crate::cross_field::{move_ends, run_passes, CrossFieldManager, CrossFieldTarget};
use crate::cross_field::CrossFieldTarget::{Destination, Source};
use crate::mark::{are_output_cells_empty, mark_empties_cells, Attach, Changeset, Detach, Mark, MarkEffect};
use crate::mark_queue::MarkQueue;
use crate::node_change::NodeChangeHandler;
use crate::prune::prune_keeping_pins;
use crate::revision::{LocalId, RevisionMetadataSource, RevisionTag, TaggedChange};
use rle::AppendRle;
use crate::utils::{input_knowledge, order_empty_cells, with_revision, CellOrder};

/// Rebase `change` over `over`, running a second cross-field pass when the first one turns out
/// to have read incomplete data.
///
/// Rebasing over the empty changeset is the same as pruning, except that pins (inserts into
/// cells which are already full) are kept.
pub fn rebase<C, H, M>(change: &[Mark<C>], over: &TaggedChange<Changeset<C>>, handler: &H, metadata: &M) -> Changeset<C>
    where C: Clone + PartialEq, H: NodeChangeHandler<C>, M: RevisionMetadataSource
{
    trace!(marks = change.len(), over = ?over.revision, "rebase");
    let mut table = CrossFieldManager::new();
    run_passes(&mut table, |table| rebase_pass(change, over, handler, table, metadata))
}

#[derive(Copy, Clone, Debug)]
enum Step {
    New(u32),
    Base(u32),
    Both(u32),
}

/// One pass of rebasing `change` over `over` with the given cross-field table.
pub fn rebase_pass<C, H, M>(change: &[Mark<C>], over: &TaggedChange<Changeset<C>>, handler: &H,
                            table: &mut CrossFieldManager<C>, metadata: &M) -> Changeset<C>
    where C: Clone + PartialEq, H: NodeChangeHandler<C>, M: RevisionMetadataSource
{
    let base_marks = with_revision(&over.change, over.revision);
    let base_knowledge = input_knowledge(&base_marks);
    let new_knowledge = input_knowledge(change);

    let mut rebaser = Rebaser {
        handler,
        table,
        base_revision: over.revision,
        detach_run: None,
    };

    let mut new_queue = MarkQueue::new(change);
    let mut base_queue = MarkQueue::new(&base_marks);
    let mut result = Changeset::new();

    loop {
        let step = match (new_queue.peek(), base_queue.peek()) {
            (None, None) => break,
            (Some(n), None) => Step::New(n.count),
            (None, Some(b)) => Step::Base(b.count),
            (Some(n), Some(b)) => match (&n.cell_id, &b.cell_id) {
                (None, None) => Step::Both(min(n.count, b.count)),
                (Some(_), None) => Step::New(n.count),
                (None, Some(_)) => Step::Base(b.count),
                (Some(n_cell), Some(b_cell)) => {
                    match order_empty_cells(b_cell, b.count, n_cell, n.count, &base_knowledge, &new_knowledge, metadata) {
                        (CellOrder::SameCell, len) => Step::Both(len),
                        (CellOrder::OldThenNew, len) => Step::Base(len),
                        (CellOrder::NewThenOld, len) => Step::New(len),
                    }
                }
            }
        };

        match step {
            Step::New(len) => {
                let ends = move_ends(&new_queue.peek().unwrap().effect);
                let len = rebaser.table.clamp(&ends, len);
                let mut mark = new_queue.dequeue_up_to(len);
                if let Some(cell) = mark.cell_id.as_mut() {
                    if let Some(event) = rebaser.adjacent_detach(base_queue.peek()) {
                        cell.add_lineage(event);
                    }
                }
                result.push_rle(rebaser.neutralize(mark));
            }
            Step::Base(len) => {
                let ends = move_ends(&base_queue.peek().unwrap().effect);
                let len = rebaser.table.clamp(&ends, len);
                let base = base_queue.dequeue_up_to(len);
                rebaser.track_base(&base);
                if let Some(mark) = rebaser.rebase_base_only(base) {
                    result.push_rle(mark);
                }
            }
            Step::Both(len) => {
                let mut ends = move_ends(&new_queue.peek().unwrap().effect);
                ends.extend(move_ends(&base_queue.peek().unwrap().effect));
                let len = rebaser.table.clamp(&ends, len);
                let new = new_queue.dequeue_up_to(len);
                let base = base_queue.dequeue_up_to(len);
                rebaser.track_base(&base);
                result.push_rle(rebaser.rebase_marks(new, base));
            }
        }
    }

    prune_keeping_pins(&result)
}

struct Rebaser<'a, C, H> {
    handler: &'a H,
    table: &'a mut CrossFieldManager<C>,
    base_revision: Option<RevisionTag>,

    /// The run of cells the base changeset emptied immediately before the current position. The
    /// event's offset is the length of the run.
    detach_run: Option<LineageEvent>,
}

impl<'a, C: Clone + PartialEq, H: NodeChangeHandler<C>> Rebaser<'a, C, H> {
    fn is_cancelled(&mut self, target: CrossFieldTarget, revision: Option<RevisionTag>, id: LocalId, count: u32) -> bool {
        self.table.lookup(target, revision, id, count).map_or(false, |e| e.cancelled)
    }

    fn rebase_changes(&self, change: Option<&C>, over: Option<&C>) -> Option<C> {
        change?;
        self.handler.rebase(change, over, self.base_revision)
    }

    fn track_base(&mut self, base: &Mark<C>) {
        if mark_empties_cells(base) {
            let out = base.output_cell_id().unwrap();
            match &mut self.detach_run {
                Some(run) if run.revision == out.revision && run.id + run.count == out.local_id => {
                    run.count += base.count;
                    run.offset += base.count;
                }
                run => *run = Some(LineageEvent {
                    revision: out.revision,
                    id: out.local_id,
                    count: base.count,
                    offset: base.count,
                }),
            }
        } else if !are_output_cells_empty(base) {
            self.detach_run = None;
        }
    }

    /// Lineage for an empty cell which only the new changeset knows about, placing it among the
    /// cells the base changeset emptied next to it.
    fn adjacent_detach(&self, next_base: Option<&Mark<C>>) -> Option<LineageEvent> {
        if let Some(run) = self.detach_run { return Some(run); }
        let next = next_base.filter(|m| mark_empties_cells(m))?;
        let out = next.output_cell_id()?;
        Some(LineageEvent { revision: out.revision, id: out.local_id, count: next.count, offset: 0 })
    }

    /// Drop the ends of moves whose other end no longer happens.
    fn neutralize(&mut self, mut mark: Mark<C>) -> Mark<C> {
        let count = mark.count;
        let (attach, detach) = mark.effect.parts();
        let attach_cancelled = match &attach {
            Some(Attach::MoveIn(m)) => self.is_cancelled(Destination, m.revision, m.id, count),
            _ => false,
        };
        let detach_cancelled = match &detach {
            Some(Detach::MoveOut(m)) => self.is_cancelled(Source, m.revision, m.id, count),
            _ => false,
        };

        if attach_cancelled || detach_cancelled {
            mark.effect = MarkEffect::from_parts(
                if attach_cancelled { None } else { attach },
                if detach_cancelled { None } else { detach },
            );
        }
        mark
    }

    /// A base mark on cells the new changeset doesn't mention.
    fn rebase_base_only(&mut self, base: Mark<C>) -> Option<Mark<C>> {
        // The new changeset didn't know about these cells before, and it doesn't need to now.
        if are_output_cells_empty(&base) { return None; }

        let count = base.count;
        let mut mark = Mark::skip(count);
        if let MarkEffect::MoveIn(move_in) = &base.effect {
            self.apply_relocated(&mut mark, move_in.revision, move_in.id);
        }
        Some(mark)
    }

    /// Content the new changeset edits was moved here by the base changeset. Pick up the detach
    /// and nested changes the new changeset made at the source.
    fn apply_relocated(&mut self, mark: &mut Mark<C>, revision: Option<RevisionTag>, id: LocalId) {
        if let Some(effect) = self.table.lookup(Destination, revision, id, mark.count) {
            if let Some(detach) = effect.detach {
                if mark.effect.is_noop() {
                    mark.effect = detach.into();
                }
            }
            if effect.changes.is_some() {
                mark.changes = effect.changes;
            }
        }
    }

    fn rebase_marks(&mut self, new: Mark<C>, base: Mark<C>) -> Mark<C> {
        let count = new.count;
        let changes = self.rebase_changes(new.changes.as_ref(), base.changes.as_ref());

        match base.output_cell_id() {
            None if base.cell_id.is_none() => {
                // The base left the content alone.
                let mark = Mark { count, cell_id: new.cell_id, changes, effect: new.effect };
                self.neutralize(mark)
            }
            None => {
                // The base filled the cell. Attaching to it again does nothing. A revive is kept
                // as a pin, so it still happens if the base is undone.
                let (attach, detach) = new.effect.parts();
                if let Some(Attach::MoveIn(m)) = &attach {
                    // Whatever the new changeset wanted to move here stays where it was.
                    self.table.update_move_effect(Source, m.revision, m.id, count, |e| e.cancelled = true);
                }
                let effect = match (attach, detach) {
                    (Some(Attach::Insert(insert)), None) => MarkEffect::Insert(insert),
                    (_, detach) => MarkEffect::from_parts(None, detach),
                };
                let mut mark = Mark { count, cell_id: None, changes, effect };
                if let MarkEffect::MoveIn(move_in) = &base.effect {
                    self.apply_relocated(&mut mark, move_in.revision, move_in.id);
                }
                self.neutralize(mark)
            }
            Some(out) if base.cell_id.is_none() => {
                let base_detach = base.effect.as_detach().expect("Emptying a full cell needs a detach");
                self.rebase_over_detach(new, changes, base_detach, out)
            }
            Some(out) => {
                // The cell was empty before and after the base. It may have been renamed.
                let mark = Mark { count, cell_id: Some(out), changes, effect: new.effect };
                self.neutralize(mark)
            }
        }
    }

    /// The base changeset detached content which the new changeset refers to as live.
    fn rebase_over_detach(&mut self, new: Mark<C>, changes: Option<C>, base_detach: Detach, out: CellId) -> Mark<C> {
        let count = new.count;
        let tombstone = Mark::tombstone(count, out.clone());

        match (new.effect, base_detach) {
            (MarkEffect::NoOp | MarkEffect::Insert(_), Detach::MoveOut(moved)) if changes.is_some() => {
                // Nested changes follow the node to wherever it was moved.
                self.table.update_move_effect(Destination, moved.revision, moved.id, count, |e| {
                    e.changes = changes.clone();
                });
                tombstone
            }
            (MarkEffect::NoOp, _) => tombstone.with_changes(changes),
            // A pin on content which moved away. There is nothing left here to revive.
            (MarkEffect::Insert(_), Detach::MoveOut(_)) => tombstone,
            // A pin becomes a revive of the detached content.
            (MarkEffect::Insert(insert), Detach::Remove(_)) => {
                tombstone.with_changes(changes).with_effect(MarkEffect::Insert(insert))
            }
            (MarkEffect::Remove(remove), Detach::Remove(_)) => {
                // Removing content which is already removed. Now it only renames the cell.
                tombstone.with_changes(changes).with_effect(MarkEffect::Remove(remove))
            }
            (MarkEffect::MoveOut(move_out), Detach::Remove(_)) => {
                // Can't move content which was removed. The other end of the move is inert too.
                self.table.update_move_effect(Destination, move_out.revision, move_out.id, count, |e| e.cancelled = true);
                tombstone.with_changes(changes)
            }
            (effect @ (MarkEffect::Remove(_) | MarkEffect::MoveOut(_)), Detach::MoveOut(moved)) => {
                // The content was moved. The detach happens where it went.
                let detach = effect.as_detach();
                self.table.update_move_effect(Destination, moved.revision, moved.id, count, |e| {
                    e.detach = detach.clone();
                    if changes.is_some() { e.changes = changes.clone(); }
                });
                tombstone
            }
            (effect, _) => unreachable!("Cannot apply {:?} to a full cell", effect),
        }
    }
}

#[cfg(test)]
mod test {
    use smallvec::smallvec;
    use crate::cell::{DetachIdOverride, IdRange};
    use crate::invert::invert;
    use crate::mark::Remove;
    use crate::node_change::{EditLog, NoNestedChanges};
    use crate::prune::prune;
    use crate::revision::RevisionIndexer;
    use super::*;

    const R1: Option<RevisionTag> = Some(RevisionTag(1));
    const R2: Option<RevisionTag> = Some(RevisionTag(2));
    const R3: Option<RevisionTag> = Some(RevisionTag(3));

    fn meta() -> RevisionIndexer {
        [RevisionTag(1), RevisionTag(2), RevisionTag(3)].into_iter().collect()
    }

    fn rebase_over(change: Changeset<()>, over: Changeset<()>) -> Changeset<()> {
        rebase(&change, &TaggedChange { revision: R1, change: over }, &NoNestedChanges, &meta())
    }

    #[test]
    fn rebase_over_nothing_prunes() {
        let c: Changeset<()> = vec![
            Mark::skip(1),
            Mark::remove(1, R2, 0),
            Mark::remove(1, R2, 1),
            Mark::tombstone(1, CellId::new(R1, 0)),
            Mark::skip(2),
        ];
        assert_eq!(rebase_over(c.clone(), vec![]), prune(&c));

        // Except for pins.
        let pinned = vec![Mark::skip(1), Mark::insert(1, R2, 2).with_cell(None), Mark::skip(2)];
        assert_eq!(rebase_over(pinned.clone(), vec![]), pinned[..2].to_vec());
    }

    #[test]
    fn insert_after_removed_content() {
        let result = rebase_over(
            vec![Mark::skip(1), Mark::insert(1, R2, 0)],
            vec![Mark::remove(1, R1, 0)],
        );

        let mut cell = CellId::new(R2, 0);
        cell.add_lineage(LineageEvent { revision: R1, id: 0, count: 1, offset: 1 });
        assert_eq!(result, vec![
            Mark::tombstone(1, CellId::new(R1, 0)),
            Mark::insert(1, R2, 0).with_cell(Some(cell)),
        ]);
    }

    #[test]
    fn concurrent_removes_rename() {
        let over: Changeset<()> = vec![Mark::skip(1), Mark::remove(1, R1, 0)];
        let result = rebase_over(vec![Mark::skip(1), Mark::remove(2, R2, 0)], over.clone());
        assert_eq!(result, vec![
            Mark::skip(1),
            Mark::remove(1, R2, 0).with_cell(Some(CellId::new(R1, 0))),
            Mark::remove(1, R2, 1),
        ]);

        // Once the base is undone, the rebased change removes the content itself.
        let undo = invert(&TaggedChange { revision: R1, change: over }, R3, false, &NoNestedChanges);
        let result = rebase(&result, &TaggedChange { revision: R3, change: undo }, &NoNestedChanges, &meta());
        assert_eq!(result, vec![Mark::skip(1), Mark::remove(2, R2, 0)]);
    }

    #[test]
    fn insert_shifts_over_base_insert() {
        // Both insert at the start. The later revision's content goes first.
        let result = rebase_over(
            vec![Mark::insert(1, R2, 0)],
            vec![Mark::insert(2, R1, 0)],
        );
        assert_eq!(result, vec![Mark::insert(1, R2, 0)]);

        let result = rebase_over(
            vec![Mark::skip(1), Mark::remove(1, R2, 0)],
            vec![Mark::insert(2, R1, 0)],
        );
        assert_eq!(result, vec![Mark::skip(3), Mark::remove(1, R2, 0)]);
    }

    #[test]
    fn revive_of_revived_cell_is_pinned() {
        let cell = CellId::new(Some(RevisionTag(0)), 3);
        let change = vec![Mark::revive(1, cell.clone(), R2, 0), Mark::remove(1, R2, 1)];
        let over: Changeset<()> = vec![Mark::revive(1, cell, R1, 0)];
        let result = rebase_over(change.clone(), over.clone());
        assert_eq!(result, vec![Mark::insert(1, R2, 0).with_cell(None), Mark::remove(1, R2, 1)]);

        // Undoing the base revives the content again.
        let undo = invert(&TaggedChange { revision: R1, change: over }, R3, false, &NoNestedChanges);
        let result = rebase(&result, &TaggedChange { revision: R3, change: undo }, &NoNestedChanges, &meta());
        assert_eq!(result, change);
    }

    #[test]
    fn adjacent_cells_order_cells_of_one_revision() {
        // Revision 0 detached cell 5 before cell 1 in this gap.
        let adjacent = Some(smallvec![IdRange::new(5, 1), IdRange::new(1, 1)]);
        let mut five = CellId::new(Some(RevisionTag(0)), 5);
        five.adjacent_cells = adjacent.clone();
        let mut one = CellId::new(Some(RevisionTag(0)), 1);
        one.adjacent_cells = adjacent;

        let result = rebase_over(
            vec![Mark::revive(1, five.clone(), R2, 0)],
            vec![Mark::revive(1, one, R1, 0)],
        );
        assert_eq!(result, vec![Mark::revive(1, five, R2, 0)]);
    }

    #[test]
    fn remove_follows_moved_content() {
        // Base moves the second node to the front. The destination comes first, so the
        // relocated remove is only known on the second pass.
        let over: Changeset<()> = vec![
            Mark::move_in(1, R1, 0, CellId::new(R1, 10)),
            Mark::skip(1),
            Mark::move_out(1, R1, 0),
        ];
        let result = rebase_over(vec![Mark::skip(1), Mark::remove(1, R2, 0)], over);
        assert_eq!(result, vec![
            Mark::remove(1, R2, 0),
            Mark::skip(1),
            Mark::tombstone(1, CellId::new(R1, 0)),
        ]);
    }

    #[test]
    fn move_of_removed_content_is_inert() {
        let change: Changeset<()> = vec![
            Mark::move_in(1, R2, 0, CellId::new(R2, 10)),
            Mark::skip(1),
            Mark::move_out(1, R2, 0),
        ];
        let result = rebase_over(change, vec![Mark::skip(1), Mark::remove(1, R1, 0)]);
        assert_eq!(result, vec![
            Mark::tombstone(1, CellId::new(R2, 10)),
            Mark::skip(1),
            Mark::tombstone(1, CellId::new(R1, 0)),
        ]);
    }

    #[test]
    fn changes_follow_moved_content() {
        let over: Changeset<Vec<u32>> = vec![
            Mark::move_out(1, R1, 0),
            Mark::skip(1),
            Mark::move_in(1, R1, 0, CellId::new(R1, 10)),
        ];
        let result = rebase(&[Mark::modify(vec![3])], &TaggedChange { revision: R1, change: over }, &EditLog, &meta());
        assert_eq!(result, vec![
            Mark::tombstone(1, CellId::new(R1, 0)),
            Mark::skip(1),
            Mark::modify(vec![3]),
        ]);
    }

    #[test]
    fn renamed_cells_are_followed() {
        let old = CellId::new(Some(RevisionTag(0)), 0);
        let mut rename = Mark::remove(1, R1, 0).with_cell(Some(old.clone()));
        rename.effect = MarkEffect::Remove(Remove {
            revision: R1, id: 0, id_override: Some(DetachIdOverride::redetach(CellId::new(R1, 5))),
        });
        let result = rebase_over(vec![Mark::revive(1, old, R2, 0)], vec![rename]);
        assert_eq!(result, vec![Mark::revive(1, CellId::new(R1, 5), R2, 0)]);
    }
}
