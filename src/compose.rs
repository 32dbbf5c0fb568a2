//! Composition of sequence field changesets. Composing `a` and `b` produces a single changeset
//! with the same effect as applying `a` and then `b`.
//!
//! The two changesets are walked together over the cells of the intermediate state (the output
//! context of `a`, which is the input context of `b`). Cells only one changeset mentions pass
//! through unchanged. Cells both mention have their effects combined.

use std::cmp::min;

use tracing::trace;

use crate::cell::CellId;
use crate::cross_field::{move_ends, run_passes, CrossFieldManager, CrossFieldTarget};
use crate::cross_field::CrossFieldTarget::{Destination, Source};
use crate::mark::{Attach, Changeset, Detach, Mark, MarkEffect};
use crate::mark_queue::MarkQueue;
use crate::node_change::NodeChangeHandler;
use crate::prune::prune;
use crate::revision::{LocalId, RevisionMetadataSource, RevisionTag, TaggedChange};
use rle::AppendRle;
use crate::utils::{input_knowledge, order_empty_cells, output_knowledge, with_revision, CellOrder};

/// Compose a list of changesets, oldest first, into one. Each pair is composed with its own
/// cross-field table, in up to two passes.
///
/// Composing nothing gives the empty changeset. Composing a single changeset prunes it.
pub fn compose<C, H, M>(changes: &[TaggedChange<Changeset<C>>], handler: &H, metadata: &M) -> Changeset<C>
    where C: Clone + PartialEq, H: NodeChangeHandler<C>, M: RevisionMetadataSource
{
    trace!(changesets = changes.len(), "compose");
    let mut iter = changes.iter();
    let Some(first) = iter.next() else { return Changeset::new(); };

    let mut result = TaggedChange {
        revision: first.revision,
        change: prune(&with_revision(&first.change, first.revision)),
    };

    for next in iter {
        let mut table = CrossFieldManager::new();
        let change = run_passes(&mut table, |table| {
            compose_pair(&result, next, handler, table, metadata)
        });
        // The result spans several revisions.
        result = TaggedChange::anonymous(change);
    }

    result.change
}

#[derive(Copy, Clone, Debug)]
enum Step {
    First(u32),
    Second(u32),
    Both(u32),
}

/// One pass of composing `second` after `first`, using (and filling in) the given cross-field
/// table. Callers are responsible for running a second pass if the table is invalidated.
pub fn compose_pair<C, H, M>(first: &TaggedChange<Changeset<C>>, second: &TaggedChange<Changeset<C>>, handler: &H,
                             table: &mut CrossFieldManager<C>, metadata: &M) -> Changeset<C>
    where C: Clone + PartialEq, H: NodeChangeHandler<C>, M: RevisionMetadataSource
{
    let a_marks = with_revision(&first.change, first.revision);
    let b_marks = with_revision(&second.change, second.revision);
    let a_knowledge = output_knowledge(&a_marks);
    let b_knowledge = input_knowledge(&b_marks);

    let mut composer = Composer {
        handler,
        table,
        a_revision: first.revision,
        b_revision: second.revision,
    };

    let mut a_queue = MarkQueue::new(&a_marks);
    let mut b_queue = MarkQueue::new(&b_marks);
    let mut result = Changeset::new();

    loop {
        let step = match (a_queue.peek(), b_queue.peek()) {
            (None, None) => break,
            (Some(a), None) => Step::First(a.count),
            (None, Some(b)) => Step::Second(b.count),
            (Some(a), Some(b)) => match (a.output_cell_id(), &b.cell_id) {
                (None, None) => Step::Both(min(a.count, b.count)),
                // Empty cells come before the next full cell.
                (Some(_), None) => Step::First(a.count),
                (None, Some(_)) => Step::Second(b.count),
                (Some(a_cell), Some(b_cell)) => {
                    match order_empty_cells(&a_cell, a.count, b_cell, b.count, &a_knowledge, &b_knowledge, metadata) {
                        (CellOrder::SameCell, len) => Step::Both(len),
                        (CellOrder::OldThenNew, len) => Step::First(len),
                        (CellOrder::NewThenOld, len) => Step::Second(len),
                    }
                }
            }
        };

        let mark = match step {
            Step::First(len) => {
                let ends = move_ends(&a_queue.peek().unwrap().effect);
                let len = composer.table.clamp(&ends, len);
                let mark = a_queue.dequeue_up_to(len);
                composer.finish_moves(mark)
            }
            Step::Second(len) => {
                let ends = move_ends(&b_queue.peek().unwrap().effect);
                let len = composer.table.clamp(&ends, len);
                let mark = b_queue.dequeue_up_to(len);
                composer.finish_moves(mark)
            }
            Step::Both(len) => {
                let mut ends = move_ends(&a_queue.peek().unwrap().effect);
                ends.extend(move_ends(&b_queue.peek().unwrap().effect));
                let len = composer.table.clamp(&ends, len);
                let a = a_queue.dequeue_up_to(len);
                let b = b_queue.dequeue_up_to(len);
                composer.compose_marks(a, b)
            }
        };

        result.push_rle(mark);
    }

    prune(&result)
}

struct Composer<'a, C, H> {
    handler: &'a H,
    table: &'a mut CrossFieldManager<C>,
    a_revision: Option<RevisionTag>,
    b_revision: Option<RevisionTag>,
}

impl<'a, C: Clone + PartialEq, H: NodeChangeHandler<C>> Composer<'a, C, H> {
    fn compose_changes(&self, a: Option<&C>, b: Option<&C>) -> Option<C> {
        if a.is_none() && b.is_none() { return None; }
        self.handler.compose(a, self.a_revision, b, self.b_revision)
    }

    fn is_cancelled(&mut self, target: CrossFieldTarget, revision: Option<RevisionTag>, id: LocalId, count: u32) -> bool {
        self.table.lookup(target, revision, id, count).map_or(false, |e| e.cancelled)
    }

    /// Pick up whatever the other end of a move recorded for this mark.
    fn finish_moves(&mut self, mut mark: Mark<C>) -> Mark<C> {
        let count = mark.count;
        match &mut mark.effect {
            MarkEffect::MoveOut(move_out) => {
                if let Some(effect) = self.table.lookup(Source, move_out.revision, move_out.id, count) {
                    if effect.final_endpoint.is_some() {
                        move_out.final_endpoint = effect.final_endpoint;
                    }
                    if effect.changes.is_some() {
                        mark.changes = self.compose_changes(mark.changes.as_ref(), effect.changes.as_ref());
                    }
                }
            }
            MarkEffect::MoveIn(move_in) => {
                if let Some(effect) = self.table.lookup(Destination, move_in.revision, move_in.id, count) {
                    if effect.final_endpoint.is_some() {
                        move_in.final_endpoint = effect.final_endpoint;
                    }
                }
            }
            _ => {}
        }
        mark
    }

    /// The first changeset detached content which the second attaches again. Both effects go
    /// away.
    fn cancel_reattach(&mut self, detach: &Detach, attach: &Attach, count: u32) {
        match (detach, attach) {
            (Detach::Remove(_), Attach::Insert(_)) => {}
            (Detach::MoveOut(out), Attach::MoveIn(back)) => {
                // The content is moved back where it came from. Neither move happens.
                self.table.update_move_effect(Destination, out.revision, out.id, count, |e| e.cancelled = true);
                self.table.update_move_effect(Source, back.revision, back.id, count, |e| e.cancelled = true);
            }
            _ => panic!("Cannot fill a cell with different content than was detached from it: {:?} then {:?}", detach, attach),
        }
    }

    /// Combine two marks which cover the same cells. `a` is applied first.
    fn compose_marks(&mut self, a: Mark<C>, b: Mark<C>) -> Mark<C> {
        let count = a.count;
        let input = a.cell_id.clone();
        let (a_attach, a_detach) = a.effect.parts();
        let (b_attach, b_detach) = b.effect.parts();

        let (attach, detach) = match a.output_cell_id() {
            None => {
                // Pins on either side do nothing to a full cell.
                assert!(!matches!(b_attach, Some(Attach::MoveIn(_))), "Cannot move content into a full cell");
                let attach = if input.is_some() { a_attach.clone() } else { None };
                (attach, b_detach)
            }
            Some(mid) => match b_attach {
                Some(b_attach) => {
                    if let (Some(a_detach), true) = (&a_detach, input.is_none() || a_attach.is_some()) {
                        self.cancel_reattach(a_detach, &b_attach, count);
                        (a_attach.clone(), b_detach)
                    } else {
                        // The cell was empty all along (maybe renamed). Fill it from its input
                        // state instead.
                        (Some(b_attach), b_detach)
                    }
                }
                None => match (a_detach, b_detach) {
                    (a_detach, None) => (a_attach.clone(), a_detach),
                    (None, Some(b_detach)) => (None, Some(b_detach)),
                    (Some(a_detach), Some(b_detach)) => {
                        // Detaching already detached content only renames the cell, unless the
                        // content is moved somewhere else.
                        let output = b_detach.output_cell_id();
                        let detach = if matches!(b_detach, Detach::MoveOut(_)) { b_detach } else { a_detach };
                        (a_attach.clone(), Some(detach.with_output(output)))
                    }
                }
            }
        };

        let effect = match (attach, detach) {
            (Some(attach), Some(detach)) => {
                let input = input.as_ref().expect("Attach needs an empty input cell");
                self.attach_and_detach(input, attach, detach, count)
            }
            (attach, detach) => MarkEffect::from_parts(attach, detach),
        };

        let mut changes = self.compose_changes(a.changes.as_ref(), b.changes.as_ref());
        if let (MarkEffect::MoveIn(move_in), Some(Attach::MoveIn(_))) = (&effect, &a_attach) {
            if b.changes.is_some() {
                // Changes to content which was moved in belong with the move out.
                let relocated = b.changes.clone();
                self.table.update_move_effect(Source, move_in.revision, move_in.id, count, |e| {
                    e.changes = relocated.clone();
                });
                changes = a.changes.clone();
            }
        }

        let mark = Mark { count, cell_id: input, changes, effect };
        self.finish_moves(mark)
    }

    /// Content is attached to the (empty) input cell and then detached again.
    fn attach_and_detach(&mut self, input: &CellId, attach: Attach, detach: Detach, count: u32) -> MarkEffect {
        match (attach, detach) {
            (Attach::MoveIn(move_in), Detach::MoveOut(move_out)) => {
                let attach_cancelled = self.is_cancelled(Destination, move_in.revision, move_in.id, count);
                let detach_cancelled = self.is_cancelled(Source, move_out.revision, move_out.id, count);

                match (attach_cancelled, detach_cancelled) {
                    (true, true) => MarkEffect::NoOp,
                    (true, false) => Detach::MoveOut(move_out).with_output(input.clone()).into(),
                    (false, true) => MarkEffect::MoveIn(move_in),
                    (false, false) => {
                        // The content passes through this cell. Tell both ends of the chain where
                        // the other end is.
                        let origin = move_in.final_endpoint.unwrap_or(move_in.atom());
                        let end = move_out.final_endpoint.unwrap_or(move_out.atom());
                        self.table.update_move_effect(Source, origin.revision, origin.local_id, count, |e| e.final_endpoint = Some(end));
                        self.table.update_move_effect(Destination, end.revision, end.local_id, count, |e| e.final_endpoint = Some(origin));
                        MarkEffect::from_parts(Some(Attach::MoveIn(move_in)), Some(Detach::MoveOut(move_out)))
                    }
                }
            }
            (Attach::Insert(insert), detach) if !insert.is_new_content(input) => {
                normalize_cell_rename(input, detach)
            }
            (attach, detach) => {
                if matches!(detach, Detach::Remove(_)) && detach.output_cell_id().same_cell(input) {
                    // Inserted and removed straight back into the cell it came from.
                    MarkEffect::NoOp
                } else {
                    MarkEffect::from_parts(Some(attach), Some(detach))
                }
            }
        }
    }
}

/// Reviving content and detaching it again is the same as detaching the content where it sits,
/// which at most renames its cell.
pub fn normalize_cell_rename(input: &CellId, detach: Detach) -> MarkEffect {
    if matches!(detach, Detach::Remove(_)) && detach.output_cell_id().same_cell(input) {
        MarkEffect::NoOp
    } else {
        detach.into()
    }
}
