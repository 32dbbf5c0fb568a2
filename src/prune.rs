//! Removes effects which can't be observed, and compacts what's left.

use crate::mark::{are_input_cells_empty, Changeset, Mark, MarkEffect};
use rle::AppendRle;

/// Does this mark change anything about the cells it covers?
pub fn is_impactful<C>(mark: &Mark<C>) -> bool {
    match &mark.effect {
        MarkEffect::NoOp => false,
        MarkEffect::Remove(_) => {
            if !are_input_cells_empty(mark) { return true; }
            // Removing content which is already detached only matters if it renames the cell.
            let input = mark.cell_id.as_ref().unwrap();
            mark.output_cell_id().map_or(false, |out| !out.same_cell(input))
        }
        MarkEffect::MoveOut(_) | MarkEffect::MoveIn(_) | MarkEffect::AttachAndDetach(_) => true,
        // An insert into a cell which is already full does nothing.
        MarkEffect::Insert(_) => are_input_cells_empty(mark),
    }
}

/// Replace the mark's effect with a no-op if it has no impact. Cell id and nested changes are
/// kept.
pub fn settle_mark<C: Clone>(mark: &Mark<C>) -> Mark<C> {
    if is_impactful(mark) { mark.clone() } else { mark.without_effect() }
}

/// An insert into cells which are already full. It does nothing where it is, but if the cells
/// are emptied again by a later rebase it becomes a revive.
pub(crate) fn is_pin<C>(mark: &Mark<C>) -> bool {
    matches!(mark.effect, MarkEffect::Insert(_)) && !are_input_cells_empty(mark)
}

/// Settle every mark, merge neighbours which can be merged and drop trailing skips.
///
/// This is idempotent.
pub fn prune<C: Clone>(changeset: &[Mark<C>]) -> Changeset<C> {
    prune_where(changeset, |_| false)
}

/// Prune, but keep pins. Rebase output uses this.
pub(crate) fn prune_keeping_pins<C: Clone>(changeset: &[Mark<C>]) -> Changeset<C> {
    prune_where(changeset, is_pin)
}

fn prune_where<C: Clone, F: Fn(&Mark<C>) -> bool>(changeset: &[Mark<C>], keep: F) -> Changeset<C> {
    let mut result: Changeset<C> = Vec::with_capacity(changeset.len());
    for mark in changeset {
        if mark.count == 0 { continue; }
        result.push_rle(if keep(mark) { mark.clone() } else { settle_mark(mark) });
    }
    trim(&mut result);
    result
}

/// Changesets never end with (useless) trailing skip marks.
pub(crate) fn trim<C>(changeset: &mut Changeset<C>) {
    while let Some(last) = changeset.last() {
        if last.effect.is_noop() && last.cell_id.is_none() && last.changes.is_none() {
            changeset.pop();
        } else { break; }
    }
}
