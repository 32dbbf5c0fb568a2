//! This crate implements the changeset algebra for sequence fields in a collaboratively edited
//! tree. A sequence field is an ordered list of nodes. A changeset for the field is a list of
//! [`Mark`]s, each of which covers a run of *cells* and says what happens to them.
//!
//! Changesets support four operations:
//!
//! 1. [`compose`] combines changesets which happen one after another into one changeset
//! 2. [`invert`] makes the changeset which undoes a change
//! 3. [`rebase`] rewrites a changeset so it can be applied after a concurrent changeset
//! 4. [`prune`] strips out effects which no longer do anything
//!
//! ## Cells
//!
//! Every position in a field is a cell. A cell is either full (it holds a node) or empty. When a
//! node is removed, its cell doesn't go away. The cell becomes empty and is named by a [`CellId`],
//! and the removed node stays inside it. Later changes can refill that cell (reviving the node),
//! and concurrent changes can agree on where the empty cell sits relative to other empty cells.
//!
//! Marks which refer to full cells have no cell id. Marks which refer to empty cells name the
//! first cell they cover.
//!
//! ## Moves
//!
//! A move is a [`MoveOut`] at the source and a [`MoveIn`] at the destination. The two ends can be
//! in different places in the same field, or in different fields entirely, so the algorithms pass
//! information between them through a [`CrossFieldTable`]. Whichever end is processed first writes
//! what the other end needs. If something was read before it was written, the table is
//! invalidated and the whole walk runs again (see [`run_passes`]).
//!
//! ## Example
//!
//! ```
//! use seqfield::*;
//!
//! let (r1, r2) = (RevisionTag(1), RevisionTag(2));
//!
//! // Insert a node at the start of the field. Then remove the node which was there before.
//! let insert: Changeset<()> = vec![Mark::insert(1, Some(r1), 0)];
//! let remove: Changeset<()> = vec![Mark::skip(1), Mark::remove(1, Some(r2), 0)];
//!
//! let both = compose(&[
//!     TaggedChange::new(r1, insert.clone()),
//!     TaggedChange::new(r2, remove),
//! ], &NoNestedChanges, &());
//! assert_eq!(both, vec![Mark::insert(1, Some(r1), 0), Mark::remove(1, Some(r2), 0)]);
//!
//! // A concurrent change removes the first node. After the insert, that node is second.
//! let concurrent: Changeset<()> = vec![Mark::remove(1, Some(r2), 0)];
//! let rebased = rebase(&concurrent, &TaggedChange::new(r1, insert), &NoNestedChanges, &());
//! assert_eq!(rebased, vec![Mark::skip(1), Mark::remove(1, Some(r2), 0)]);
//! ```
//!
//! Nested changes to the nodes themselves are opaque to this crate. They are carried on marks and
//! combined by a [`NodeChangeHandler`] which the caller supplies.

mod revision;
mod cell;
mod mark;
mod mark_queue;
mod range_map;
mod utils;
mod cross_field;
mod node_change;
mod prune;
mod compose;
mod invert;
mod rebase;
mod handler;
mod check;

#[cfg(test)]
mod sandbox;
#[cfg(test)]
mod fuzzer;

pub use revision::{LocalId, RevisionIndexer, RevisionMetadataSource, RevisionTag, TaggedChange};
pub use cell::{CellId, ChangeAtomId, DetachIdOverride, DetachIdOverrideType, IdRange, LineageEvent};
pub use mark::*;
pub use range_map::{RangeEntry, RangeMap, RangeQueryResult, RangeValue};
pub use utils::{compare_cell_positions_using_tombstones, compare_lineages, input_knowledge, output_knowledge, with_revision, CellKnowledge, CellOrder};
pub use cross_field::{run_passes, CrossFieldManager, CrossFieldTable, CrossFieldTarget, MoveEffect};
pub use node_change::{NoNestedChanges, NodeChangeHandler};
pub use prune::{is_impactful, prune, settle_mark};
pub use compose::{compose, compose_pair, normalize_cell_rename};
pub use invert::{invert, invert_pass};
pub use rebase::{rebase, rebase_pass};
pub use handler::{FieldChangeHandler, SequenceFieldHandler};
pub use check::ChangesetCheck;
