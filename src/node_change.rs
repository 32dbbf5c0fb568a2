use crate::revision::RevisionTag;

/// Handles the nested changes carried by marks. Sequence field changesets don't know what a
/// nested change is; they only move it to the right place and ask this handler to combine it.
pub trait NodeChangeHandler<C> {
    /// Combine two nested changes to the same node. `first` is applied before `second`. The
    /// revisions of each side are passed through so the result can remember where each part
    /// came from.
    fn compose(&self, first: Option<&C>, first_revision: Option<RevisionTag>,
               second: Option<&C>, second_revision: Option<RevisionTag>) -> Option<C>;

    /// The nested change which undoes `change`.
    fn invert(&self, change: &C, revision: Option<RevisionTag>, is_rollback: bool) -> C;

    /// Rebase `change` over a concurrent nested change to the same node.
    fn rebase(&self, change: Option<&C>, over: Option<&C>, over_revision: Option<RevisionTag>) -> Option<C>;
}

/// Handler for fields whose nodes carry no meaningful nested changes. A nested `()` just marks the
/// node as touched.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NoNestedChanges;

impl NodeChangeHandler<()> for NoNestedChanges {
    fn compose(&self, first: Option<&()>, _: Option<RevisionTag>, second: Option<&()>, _: Option<RevisionTag>) -> Option<()> {
        first.or(second).copied()
    }

    fn invert(&self, _change: &(), _revision: Option<RevisionTag>, _is_rollback: bool) {}

    fn rebase(&self, change: Option<&()>, _over: Option<&()>, _: Option<RevisionTag>) -> Option<()> {
        change.copied()
    }
}

impl<C, H: NodeChangeHandler<C> + ?Sized> NodeChangeHandler<C> for &H {
    fn compose(&self, first: Option<&C>, first_revision: Option<RevisionTag>, second: Option<&C>, second_revision: Option<RevisionTag>) -> Option<C> {
        (*self).compose(first, first_revision, second, second_revision)
    }

    fn invert(&self, change: &C, revision: Option<RevisionTag>, is_rollback: bool) -> C {
        (*self).invert(change, revision, is_rollback)
    }

    fn rebase(&self, change: Option<&C>, over: Option<&C>, over_revision: Option<RevisionTag>) -> Option<C> {
        (*self).rebase(change, over, over_revision)
    }
}

/// A nested change which is just a log of edit numbers. Composing concatenates the logs and
/// inverting negates them, which makes it easy to see where nested changes end up.
#[cfg(test)]
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct EditLog;

#[cfg(test)]
impl NodeChangeHandler<Vec<u32>> for EditLog {
    fn compose(&self, first: Option<&Vec<u32>>, _: Option<RevisionTag>, second: Option<&Vec<u32>>, _: Option<RevisionTag>) -> Option<Vec<u32>> {
        match (first, second) {
            (None, None) => None,
            (a, b) => Some(a.into_iter().chain(b).flatten().copied().collect()),
        }
    }

    fn invert(&self, change: &Vec<u32>, _revision: Option<RevisionTag>, _is_rollback: bool) -> Vec<u32> {
        change.iter().rev().map(|e| e + 1000).collect()
    }

    fn rebase(&self, change: Option<&Vec<u32>>, _over: Option<&Vec<u32>>, _: Option<RevisionTag>) -> Option<Vec<u32>> {
        change.cloned()
    }
}
