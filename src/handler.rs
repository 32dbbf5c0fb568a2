//! The interface a tree-level change family uses to drive sequence fields.
//!
//! A tree changeset holds one changeset per field. The moves in one field can have their other end
//! in a different field, so the caller owns the cross-field table and shares it between every field
//! it processes. The caller is also responsible for running its whole walk a second time when the
//! table reports that it was invalidated (see [`run_passes`](crate::cross_field::run_passes)).

use tracing::trace;

use crate::compose::compose_pair;
use crate::cross_field::CrossFieldManager;
use crate::invert::invert_pass;
use crate::mark::Changeset;
use crate::node_change::NodeChangeHandler;
use crate::prune::prune;
use crate::rebase::rebase_pass;
use crate::revision::{RevisionMetadataSource, RevisionTag, TaggedChange};

pub trait FieldChangeHandler<C> {
    fn compose<M: RevisionMetadataSource>(&self, first: &TaggedChange<Changeset<C>>, second: &TaggedChange<Changeset<C>>,
                                          table: &mut CrossFieldManager<C>, metadata: &M) -> Changeset<C>;

    fn invert(&self, change: &TaggedChange<Changeset<C>>, revision: Option<RevisionTag>, is_rollback: bool,
              table: &mut CrossFieldManager<C>) -> Changeset<C>;

    fn rebase<M: RevisionMetadataSource>(&self, change: &Changeset<C>, over: &TaggedChange<Changeset<C>>,
                                         table: &mut CrossFieldManager<C>, metadata: &M) -> Changeset<C>;

    fn prune(&self, change: &Changeset<C>) -> Changeset<C>;

    /// True if applying the change would leave the field exactly as it was.
    fn is_empty(&self, change: &Changeset<C>) -> bool {
        self.prune(change).is_empty()
    }
}

/// Sequence fields, with nested changes handled by `node_handler`.
#[derive(Copy, Clone, Debug, Default)]
pub struct SequenceFieldHandler<H> {
    pub node_handler: H,
}

impl<H> SequenceFieldHandler<H> {
    pub fn new(node_handler: H) -> Self { Self { node_handler } }
}

impl<C: Clone + PartialEq, H: NodeChangeHandler<C>> FieldChangeHandler<C> for SequenceFieldHandler<H> {
    fn compose<M: RevisionMetadataSource>(&self, first: &TaggedChange<Changeset<C>>, second: &TaggedChange<Changeset<C>>,
                                          table: &mut CrossFieldManager<C>, metadata: &M) -> Changeset<C> {
        trace!(first = ?first.revision, second = ?second.revision, "compose field");
        compose_pair(first, second, &self.node_handler, table, metadata)
    }

    fn invert(&self, change: &TaggedChange<Changeset<C>>, revision: Option<RevisionTag>, is_rollback: bool,
              table: &mut CrossFieldManager<C>) -> Changeset<C> {
        trace!(change = ?change.revision, ?revision, "invert field");
        invert_pass(change, revision, is_rollback, &self.node_handler, table)
    }

    fn rebase<M: RevisionMetadataSource>(&self, change: &Changeset<C>, over: &TaggedChange<Changeset<C>>,
                                         table: &mut CrossFieldManager<C>, metadata: &M) -> Changeset<C> {
        trace!(over = ?over.revision, "rebase field");
        rebase_pass(change, over, &self.node_handler, table, metadata)
    }

    fn prune(&self, change: &Changeset<C>) -> Changeset<C> {
        prune(change)
    }
}
