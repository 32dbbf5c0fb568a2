use std::fmt::{Debug, Formatter};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// An opaque, comparable identifier for a revision. Revision tags are minted by whatever
/// identifier compression scheme the host uses. Nothing in this crate interprets the number
/// beyond equality; ordering between revisions always comes from a [`RevisionMetadataSource`].
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct RevisionTag(pub u32);

impl Debug for RevisionTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Local ids are allocated per revision. They name detached cells, inserts and moves.
pub type LocalId = u32;

/// A changeset (or any other value) tagged with the revision that produced it.
///
/// An untagged (anonymous) change has a revision of `None`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TaggedChange<T> {
    pub revision: Option<RevisionTag>,
    pub change: T,
}

impl<T> TaggedChange<T> {
    pub fn new(revision: RevisionTag, change: T) -> Self {
        Self { revision: Some(revision), change }
    }

    pub fn anonymous(change: T) -> Self {
        Self { revision: None, change }
    }
}

/// Supplied by the revision ordering authority. Establishes a total order among the revisions
/// which are in scope for a single compose or rebase call.
pub trait RevisionMetadataSource {
    /// Returns the ordinal of the revision, or None if the revision is out of scope for this
    /// operation. Out of scope revisions are older than every revision in scope.
    fn get_index(&self, revision: Option<RevisionTag>) -> Option<usize>;
}

/// Used when there is no revision context at all. Every revision is out of scope.
impl RevisionMetadataSource for () {
    fn get_index(&self, _revision: Option<RevisionTag>) -> Option<usize> { None }
}

/// A revision metadata source backed by a list of revisions in sequence order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RevisionIndexer(pub Vec<RevisionTag>);

impl RevisionIndexer {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, revision: RevisionTag) {
        debug_assert!(!self.0.contains(&revision), "Revision {:?} is already indexed", revision);
        self.0.push(revision);
    }
}

impl FromIterator<RevisionTag> for RevisionIndexer {
    fn from_iter<T: IntoIterator<Item=RevisionTag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl RevisionMetadataSource for RevisionIndexer {
    fn get_index(&self, revision: Option<RevisionTag>) -> Option<usize> {
        let revision = revision?;
        self.0.iter().position(|r| *r == revision)
    }
}

impl<M: RevisionMetadataSource + ?Sized> RevisionMetadataSource for &M {
    fn get_index(&self, revision: Option<RevisionTag>) -> Option<usize> {
        (*self).get_index(revision)
    }
}
