use crate::mark::{are_input_cells_empty, Attach, Detach, Mark, MarkEffect};

/// Structural checks for changesets. This is used by the tests and fuzzers. It panics with a
/// message saying what is wrong.
pub trait ChangesetCheck {
    fn dbg_check(&self);
}

impl<C: std::fmt::Debug> ChangesetCheck for [Mark<C>] {
    fn dbg_check(&self) {
        for mark in self {
            assert!(mark.count > 0, "Zero length mark {:?}", mark);
            if mark.changes.is_some() {
                assert_eq!(mark.count, 1, "Nested changes on a mark covering several cells: {:?}", mark);
            }

            let input_empty = are_input_cells_empty(mark);
            match &mark.effect {
                MarkEffect::NoOp => {}
                MarkEffect::Insert(_) | MarkEffect::MoveIn(_) => {
                    // Inserts into full cells (pins) are allowed. They do nothing, and prune
                    // removes them.
                    if matches!(mark.effect, MarkEffect::MoveIn(_)) {
                        assert!(input_empty, "Move in to a full cell: {:?}", mark);
                    }
                }
                MarkEffect::Remove(_) | MarkEffect::MoveOut(_) => {}
                MarkEffect::AttachAndDetach(ad) => {
                    assert!(input_empty, "Attach and detach on a full cell: {:?}", mark);
                    if let (Attach::MoveIn(i), Detach::MoveOut(o)) = (&ad.attach, &ad.detach) {
                        assert!(i.revision != o.revision || i.id != o.id, "Content moved out of the cell it was moved into by the same move: {:?}", mark);
                    }
                }
            }
        }
    }
}

impl<C: std::fmt::Debug> ChangesetCheck for Vec<Mark<C>> {
    fn dbg_check(&self) {
        self.as_slice().dbg_check()
    }
}
