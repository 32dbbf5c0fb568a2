//! Inverting a sequence field changeset.
//!
//! The inverse of a changeset takes the field from the changeset's output context back to its
//! input context. Marks line up one to one, so the inverse is built in a single walk (plus a
//! second pass when nested changes have to travel to the other end of a move).

use tracing::trace;

use crate::cell::{CellId, ChangeAtomId, DetachIdOverride};
use crate::cross_field::{run_passes, CrossFieldManager};
use crate::cross_field::CrossFieldTarget::Source;
use crate::mark::{Attach, AttachAndDetach, Changeset, Detach, Insert, Mark, MarkEffect, MoveIn, MoveOut, Remove};
use crate::mark_queue::MarkQueue;
use crate::node_change::NodeChangeHandler;
use crate::revision::{RevisionTag, TaggedChange};
use rle::AppendRle;
use crate::utils::with_revision;

/// Build the inverse of `change`, tagging every effect in the inverse with `revision`.
///
/// The inverse must be tagged with a revision other than the original's. Otherwise reviving
/// removed content would look like inserting it for the first time.
///
/// When `is_rollback` is set, the inverse is only ever used to undo the change before anything
/// else is applied, so tombstones which only place cells are left out.
pub fn invert<C, H>(change: &TaggedChange<Changeset<C>>, revision: Option<RevisionTag>, is_rollback: bool, handler: &H) -> Changeset<C>
    where C: Clone + PartialEq, H: NodeChangeHandler<C>
{
    trace!(marks = change.change.len(), ?revision, is_rollback, "invert");
    let mut table = CrossFieldManager::new();
    run_passes(&mut table, |table| invert_pass(change, revision, is_rollback, handler, table))
}

/// One pass of [`invert`] with the given cross-field table.
pub fn invert_pass<C, H>(change: &TaggedChange<Changeset<C>>, revision: Option<RevisionTag>, is_rollback: bool,
                         handler: &H, table: &mut CrossFieldManager<C>) -> Changeset<C>
    where C: Clone + PartialEq, H: NodeChangeHandler<C>
{
    debug_assert!(revision.is_none() || revision != change.revision, "Inverse needs its own revision");

    let marks = with_revision(&change.change, change.revision);
    let mut inverter = Inverter { handler, table, revision, is_rollback };
    let mut queue = MarkQueue::new(&marks);
    let mut result = Changeset::new();

    loop {
        // Moved content may have picked up nested changes at the other end, keyed by the
        // inverse move out.
        let len = match queue.peek() {
            None => break,
            Some(Mark { effect: MarkEffect::MoveIn(m), count, .. }) => {
                let (id, count) = (m.id, *count);
                inverter.table.clamp(&[(Source, revision, id)], count)
            }
            Some(mark) => mark.count,
        };
        let mark = queue.dequeue_up_to(len);
        if let Some(inverse) = inverter.invert_mark(mark) {
            result.push_rle(inverse);
        }
    }

    result
}

struct Inverter<'a, C, H> {
    handler: &'a H,
    table: &'a mut CrossFieldManager<C>,
    revision: Option<RevisionTag>,
    is_rollback: bool,
}

impl<'a, C: Clone + PartialEq, H: NodeChangeHandler<C>> Inverter<'a, C, H> {
    /// The inverse of an attach is a detach which puts the cell back the way it was.
    fn invert_attach(&self, attach: &Attach, input: &CellId) -> Detach {
        let id_override = Some(DetachIdOverride::unattach(input.clone()));
        match attach {
            Attach::Insert(insert) => Detach::Remove(Remove {
                revision: self.revision, id: insert.id, id_override,
            }),
            Attach::MoveIn(move_in) => Detach::MoveOut(MoveOut {
                revision: self.revision,
                id: move_in.id,
                id_override,
                final_endpoint: self.retag(move_in.final_endpoint),
            }),
        }
    }

    /// The far end of a chain of moves, in terms of the inverse. The inverse chain uses the same
    /// ids under the inverse's revision.
    fn retag(&self, endpoint: Option<ChangeAtomId>) -> Option<ChangeAtomId> {
        endpoint.map(|e| ChangeAtomId::new(self.revision, e.local_id))
    }

    /// The inverse of a detach brings the content back.
    fn invert_detach(&self, detach: &Detach) -> Attach {
        match detach {
            Detach::Remove(remove) => Attach::Insert(Insert::new(self.revision, remove.id)),
            Detach::MoveOut(move_out) => Attach::MoveIn(MoveIn {
                revision: self.revision,
                id: move_out.id,
                final_endpoint: self.retag(move_out.final_endpoint),
            }),
        }
    }

    fn invert_mark(&mut self, mark: Mark<C>) -> Option<Mark<C>> {
        let count = mark.count;
        let changes = mark.changes.as_ref().map(|c| self.handler.invert(c, self.revision, self.is_rollback));
        let output = mark.output_cell_id();

        let inverse = match (&mark.effect, &mark.cell_id) {
            (MarkEffect::NoOp, _) => {
                if self.is_rollback && mark.cell_id.is_some() && changes.is_none() { return None; }
                Mark { count, cell_id: mark.cell_id.clone(), changes, effect: MarkEffect::NoOp }
            }

            (MarkEffect::Insert(_) | MarkEffect::MoveIn(_), Some(input)) => {
                let attach = mark.effect.as_attach().unwrap();
                let mut inverse = Mark {
                    count,
                    cell_id: None,
                    changes,
                    effect: self.invert_attach(&attach, input).into(),
                };
                if let Attach::MoveIn(move_in) = &attach {
                    // Nested changes made to this node while it sat at the source.
                    if let Some(effect) = self.table.lookup(Source, self.revision, move_in.id, count) {
                        if effect.changes.is_some() { inverse.changes = effect.changes; }
                    }
                }
                inverse
            }

            (MarkEffect::Remove(_) | MarkEffect::MoveOut(_), None) => {
                let detach = mark.effect.as_detach().unwrap();
                let mut inverse = Mark {
                    count,
                    cell_id: output,
                    changes: None,
                    effect: self.invert_detach(&detach).into(),
                };
                match &detach {
                    Detach::MoveOut(move_out) if changes.is_some() => {
                        // The node is back at the other end of the move when the inverse runs.
                        let id = move_out.id;
                        self.table.update_move_effect(Source, self.revision, id, count, |e| {
                            e.changes = changes.clone();
                        });
                    }
                    _ => inverse.changes = changes,
                }
                inverse
            }

            // Renames. The content was already detached.
            (MarkEffect::Remove(remove), Some(input)) => Mark {
                count,
                cell_id: output,
                changes,
                effect: MarkEffect::Remove(Remove {
                    revision: self.revision,
                    id: remove.id,
                    id_override: Some(DetachIdOverride::redetach(input.clone())),
                }),
            },
            (MarkEffect::MoveOut(move_out), Some(input)) => {
                // The content left `input` for the move's destination. Bring it back and park
                // it in `input` again.
                let attach = self.invert_detach(&Detach::MoveOut(move_out.clone()));
                let detach = Detach::Remove(Remove {
                    revision: self.revision,
                    id: move_out.id,
                    id_override: Some(DetachIdOverride::redetach(input.clone())),
                });
                Mark {
                    count,
                    cell_id: output,
                    changes,
                    effect: MarkEffect::AttachAndDetach(AttachAndDetach { attach, detach }),
                }
            }

            // An insert into a full cell does nothing, and neither does its inverse.
            (MarkEffect::Insert(_), None) => Mark { count, cell_id: None, changes, effect: MarkEffect::NoOp },

            (MarkEffect::AttachAndDetach(ad), Some(input)) => Mark {
                count,
                cell_id: output,
                changes,
                effect: MarkEffect::AttachAndDetach(AttachAndDetach {
                    attach: self.invert_detach(&ad.detach),
                    detach: self.invert_attach(&ad.attach, input),
                }),
            },

            (effect, cell) => panic!("Invalid mark: {:?} on {:?}", effect, cell),
        };

        Some(inverse)
    }
}
