//! The mark model. A sequence field changeset is a list of marks. Each mark covers `count`
//! contiguous cells of the field's input context and says what happens to them.

use std::fmt::Debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::cell::{CellId, ChangeAtomId, DetachIdOverride, DetachIdOverrideType};
use crate::revision::{LocalId, RevisionTag};
use rle::{HasLength, MergableSpan, SplitableSpan, SplitableSpanHelpers};

/// Fills an empty cell with new content, or with the content it held before it was emptied.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Insert {
    pub revision: Option<RevisionTag>,
    pub id: LocalId,
}

/// Fills an empty cell with content moved out of another cell (possibly in another field).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MoveIn {
    pub revision: Option<RevisionTag>,
    pub id: LocalId,
    /// When the moved content was moved again, this names the move out at the start of the
    /// chain.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub final_endpoint: Option<ChangeAtomId>,
}

/// Empties a cell. The content stays in the (now detached) cell.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Remove {
    pub revision: Option<RevisionTag>,
    pub id: LocalId,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id_override: Option<DetachIdOverride>,
}

/// Empties a cell, sending its content to the matching [`MoveIn`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MoveOut {
    pub revision: Option<RevisionTag>,
    pub id: LocalId,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub id_override: Option<DetachIdOverride>,
    /// When the moved content was moved again, this names the move in at the end of the chain.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub final_endpoint: Option<ChangeAtomId>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Attach {
    Insert(Insert),
    MoveIn(MoveIn),
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Detach {
    Remove(Remove),
    MoveOut(MoveOut),
}

/// Content is attached to an empty cell and then detached again. The cell starts and ends
/// empty.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttachAndDetach {
    pub attach: Attach,
    pub detach: Detach,
}

#[derive(Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MarkEffect {
    #[default]
    NoOp,
    Insert(Insert),
    Remove(Remove),
    MoveIn(MoveIn),
    MoveOut(MoveOut),
    AttachAndDetach(AttachAndDetach),
}

/// A run-length encoded description of one effect applied to `count` contiguous cells.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Mark<C> {
    pub count: u32,

    /// Present iff the input cells are empty. Names the detached cells the mark refers to.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub cell_id: Option<CellId>,

    /// Nested changes for the node in this cell. Marks with changes always have a count of 1.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub changes: Option<C>,

    pub effect: MarkEffect,
}

/// A changeset for a single sequence field. Marks are listed in the order of the field's input
/// context.
pub type Changeset<C> = Vec<Mark<C>>;

fn continues(a: &Option<ChangeAtomId>, count: u32, b: &Option<ChangeAtomId>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.revision == b.revision && a.local_id + count == b.local_id,
        _ => false,
    }
}

fn override_continues(a: &Option<DetachIdOverride>, count: u32, b: &Option<DetachIdOverride>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.kind == b.kind && a.id.is_continued_by(count, &b.id),
        _ => false,
    }
}

impl Insert {
    pub fn new(revision: Option<RevisionTag>, id: LocalId) -> Self { Self { revision, id } }

    /// True if this insert creates content rather than reviving the content of `cell`.
    pub fn is_new_content(&self, cell: &CellId) -> bool {
        cell.revision == self.revision && cell.local_id == self.id
    }

    fn offset(&self, by: u32) -> Self { Self { revision: self.revision, id: self.id + by } }

    fn continued_by(&self, count: u32, other: &Self) -> bool {
        self.revision == other.revision && self.id + count == other.id
    }
}

impl MoveIn {
    pub fn new(revision: Option<RevisionTag>, id: LocalId) -> Self {
        Self { revision, id, final_endpoint: None }
    }

    pub fn atom(&self) -> ChangeAtomId { ChangeAtomId::new(self.revision, self.id) }

    fn offset(&self, by: u32) -> Self {
        Self {
            revision: self.revision,
            id: self.id + by,
            final_endpoint: self.final_endpoint.map(|e| e.offset(by)),
        }
    }

    fn continued_by(&self, count: u32, other: &Self) -> bool {
        self.revision == other.revision
            && self.id + count == other.id
            && continues(&self.final_endpoint, count, &other.final_endpoint)
    }
}

impl Remove {
    pub fn new(revision: Option<RevisionTag>, id: LocalId) -> Self {
        Self { revision, id, id_override: None }
    }

    fn offset(&self, by: u32) -> Self {
        Self {
            revision: self.revision,
            id: self.id + by,
            id_override: self.id_override.as_ref().map(|o| o.offset(by)),
        }
    }

    fn continued_by(&self, count: u32, other: &Self) -> bool {
        self.revision == other.revision
            && self.id + count == other.id
            && override_continues(&self.id_override, count, &other.id_override)
    }
}

impl MoveOut {
    pub fn new(revision: Option<RevisionTag>, id: LocalId) -> Self {
        Self { revision, id, id_override: None, final_endpoint: None }
    }

    pub fn atom(&self) -> ChangeAtomId { ChangeAtomId::new(self.revision, self.id) }

    fn offset(&self, by: u32) -> Self {
        Self {
            revision: self.revision,
            id: self.id + by,
            id_override: self.id_override.as_ref().map(|o| o.offset(by)),
            final_endpoint: self.final_endpoint.map(|e| e.offset(by)),
        }
    }

    fn continued_by(&self, count: u32, other: &Self) -> bool {
        self.revision == other.revision
            && self.id + count == other.id
            && override_continues(&self.id_override, count, &other.id_override)
            && continues(&self.final_endpoint, count, &other.final_endpoint)
    }
}

impl Attach {
    pub fn revision(&self) -> Option<RevisionTag> {
        match self {
            Attach::Insert(i) => i.revision,
            Attach::MoveIn(m) => m.revision,
        }
    }

    pub fn id(&self) -> LocalId {
        match self {
            Attach::Insert(i) => i.id,
            Attach::MoveIn(m) => m.id,
        }
    }

    pub(crate) fn offset(&self, by: u32) -> Self {
        match self {
            Attach::Insert(i) => Attach::Insert(i.offset(by)),
            Attach::MoveIn(m) => Attach::MoveIn(m.offset(by)),
        }
    }

    fn continued_by(&self, count: u32, other: &Self) -> bool {
        match (self, other) {
            (Attach::Insert(a), Attach::Insert(b)) => a.continued_by(count, b),
            (Attach::MoveIn(a), Attach::MoveIn(b)) => a.continued_by(count, b),
            _ => false,
        }
    }

    pub(crate) fn with_revision(&self, revision: Option<RevisionTag>) -> Self {
        let mut result = self.clone();
        match &mut result {
            Attach::Insert(i) => { i.revision = i.revision.or(revision); }
            Attach::MoveIn(m) => {
                m.revision = m.revision.or(revision);
                if let Some(e) = &mut m.final_endpoint { e.revision = e.revision.or(revision); }
            }
        }
        result
    }
}

impl From<Attach> for MarkEffect {
    fn from(attach: Attach) -> Self {
        match attach {
            Attach::Insert(i) => MarkEffect::Insert(i),
            Attach::MoveIn(m) => MarkEffect::MoveIn(m),
        }
    }
}

impl Detach {
    pub fn revision(&self) -> Option<RevisionTag> {
        match self {
            Detach::Remove(r) => r.revision,
            Detach::MoveOut(m) => m.revision,
        }
    }

    pub fn id(&self) -> LocalId {
        match self {
            Detach::Remove(r) => r.id,
            Detach::MoveOut(m) => m.id,
        }
    }

    pub fn id_override(&self) -> Option<&DetachIdOverride> {
        match self {
            Detach::Remove(r) => r.id_override.as_ref(),
            Detach::MoveOut(m) => m.id_override.as_ref(),
        }
    }

    pub fn set_id_override(&mut self, id_override: Option<DetachIdOverride>) {
        match self {
            Detach::Remove(r) => r.id_override = id_override,
            Detach::MoveOut(m) => m.id_override = id_override,
        }
    }

    /// The id of the cell after this detach. Detaching content which is already detached still
    /// names the cell after the detach, unless the id is overridden.
    pub fn output_cell_id(&self) -> CellId {
        match self.id_override() {
            Some(o) => o.id.clone(),
            None => CellId::new(self.revision(), self.id()),
        }
    }

    pub fn atom(&self) -> ChangeAtomId { ChangeAtomId::new(self.revision(), self.id()) }

    /// Make the detach leave the cell with the id `output`.
    pub(crate) fn with_output(mut self, output: CellId) -> Self {
        if self.output_cell_id() == output { return self; }
        let kind = self.id_override().map_or(DetachIdOverrideType::Redetach, |o| o.kind);
        self.set_id_override(Some(DetachIdOverride { kind, id: output }));
        self
    }

    pub(crate) fn offset(&self, by: u32) -> Self {
        match self {
            Detach::Remove(r) => Detach::Remove(r.offset(by)),
            Detach::MoveOut(m) => Detach::MoveOut(m.offset(by)),
        }
    }

    fn continued_by(&self, count: u32, other: &Self) -> bool {
        match (self, other) {
            (Detach::Remove(a), Detach::Remove(b)) => a.continued_by(count, b),
            (Detach::MoveOut(a), Detach::MoveOut(b)) => a.continued_by(count, b),
            _ => false,
        }
    }

    pub(crate) fn with_revision(&self, revision: Option<RevisionTag>) -> Self {
        let mut result = self.clone();
        match &mut result {
            Detach::Remove(r) => { r.revision = r.revision.or(revision); }
            Detach::MoveOut(m) => {
                m.revision = m.revision.or(revision);
                if let Some(e) = &mut m.final_endpoint { e.revision = e.revision.or(revision); }
            }
        }
        if let Some(o) = result.id_override().cloned() {
            result.set_id_override(Some(DetachIdOverride { kind: o.kind, id: o.id.with_revision(revision) }));
        }
        result
    }
}

impl From<Detach> for MarkEffect {
    fn from(detach: Detach) -> Self {
        match detach {
            Detach::Remove(r) => MarkEffect::Remove(r),
            Detach::MoveOut(m) => MarkEffect::MoveOut(m),
        }
    }
}

impl MarkEffect {
    pub fn is_noop(&self) -> bool { matches!(self, MarkEffect::NoOp) }

    pub fn as_attach(&self) -> Option<Attach> {
        match self {
            MarkEffect::Insert(i) => Some(Attach::Insert(*i)),
            MarkEffect::MoveIn(m) => Some(Attach::MoveIn(*m)),
            _ => None,
        }
    }

    pub fn as_detach(&self) -> Option<Detach> {
        match self {
            MarkEffect::Remove(r) => Some(Detach::Remove(r.clone())),
            MarkEffect::MoveOut(m) => Some(Detach::MoveOut(m.clone())),
            _ => None,
        }
    }

    /// Split the effect into the attach which fills the cell and the detach which then empties
    /// it.
    pub(crate) fn parts(&self) -> (Option<Attach>, Option<Detach>) {
        match self {
            MarkEffect::AttachAndDetach(ad) => (Some(ad.attach.clone()), Some(ad.detach.clone())),
            _ => (self.as_attach(), self.as_detach()),
        }
    }

    /// The inverse of [`MarkEffect::parts`].
    pub(crate) fn from_parts(attach: Option<Attach>, detach: Option<Detach>) -> Self {
        match (attach, detach) {
            (None, None) => MarkEffect::NoOp,
            (Some(attach), None) => attach.into(),
            (None, Some(detach)) => detach.into(),
            (Some(attach), Some(detach)) => MarkEffect::AttachAndDetach(AttachAndDetach { attach, detach }),
        }
    }

    /// Shift every id in the effect along by `by`. Used when splitting marks.
    pub(crate) fn offset(&self, by: u32) -> Self {
        match self {
            MarkEffect::NoOp => MarkEffect::NoOp,
            MarkEffect::Insert(i) => MarkEffect::Insert(i.offset(by)),
            MarkEffect::Remove(r) => MarkEffect::Remove(r.offset(by)),
            MarkEffect::MoveIn(m) => MarkEffect::MoveIn(m.offset(by)),
            MarkEffect::MoveOut(m) => MarkEffect::MoveOut(m.offset(by)),
            MarkEffect::AttachAndDetach(ad) => MarkEffect::AttachAndDetach(AttachAndDetach {
                attach: ad.attach.offset(by),
                detach: ad.detach.offset(by),
            }),
        }
    }

    /// Can an effect covering `count` cells be followed by `other` in a single mark?
    pub(crate) fn continued_by(&self, count: u32, other: &Self) -> bool {
        match (self, other) {
            (MarkEffect::NoOp, MarkEffect::NoOp) => true,
            (MarkEffect::Insert(a), MarkEffect::Insert(b)) => a.continued_by(count, b),
            (MarkEffect::Remove(a), MarkEffect::Remove(b)) => a.continued_by(count, b),
            (MarkEffect::MoveIn(a), MarkEffect::MoveIn(b)) => a.continued_by(count, b),
            (MarkEffect::MoveOut(a), MarkEffect::MoveOut(b)) => a.continued_by(count, b),
            (MarkEffect::AttachAndDetach(a), MarkEffect::AttachAndDetach(b)) => {
                a.attach.continued_by(count, &b.attach) && a.detach.continued_by(count, &b.detach)
            }
            _ => false,
        }
    }

    pub(crate) fn with_revision(&self, revision: Option<RevisionTag>) -> Self {
        match self {
            MarkEffect::NoOp => MarkEffect::NoOp,
            MarkEffect::Insert(_) | MarkEffect::MoveIn(_) => self.as_attach().unwrap().with_revision(revision).into(),
            MarkEffect::Remove(_) | MarkEffect::MoveOut(_) => self.as_detach().unwrap().with_revision(revision).into(),
            MarkEffect::AttachAndDetach(ad) => MarkEffect::AttachAndDetach(AttachAndDetach {
                attach: ad.attach.with_revision(revision),
                detach: ad.detach.with_revision(revision),
            }),
        }
    }
}

impl<C> Mark<C> {
    /// A mark which leaves `count` filled cells alone.
    pub fn skip(count: u32) -> Self {
        Self { count, cell_id: None, changes: None, effect: MarkEffect::NoOp }
    }

    /// A mark which refers to `count` empty cells without changing them.
    pub fn tombstone(count: u32, cell_id: CellId) -> Self {
        Self { count, cell_id: Some(cell_id), changes: None, effect: MarkEffect::NoOp }
    }

    /// Nested changes to the node in a single filled cell.
    pub fn modify(changes: C) -> Self {
        Self { count: 1, cell_id: None, changes: Some(changes), effect: MarkEffect::NoOp }
    }

    /// Insert `count` new nodes. The new cells are named after the insert.
    pub fn insert(count: u32, revision: Option<RevisionTag>, id: LocalId) -> Self {
        Self {
            count,
            cell_id: Some(CellId::new(revision, id)),
            changes: None,
            effect: MarkEffect::Insert(Insert::new(revision, id)),
        }
    }

    /// Restore the content of the `count` detached cells starting at `cell_id`.
    pub fn revive(count: u32, cell_id: CellId, revision: Option<RevisionTag>, id: LocalId) -> Self {
        Self { count, cell_id: Some(cell_id), changes: None, effect: MarkEffect::Insert(Insert::new(revision, id)) }
    }

    pub fn remove(count: u32, revision: Option<RevisionTag>, id: LocalId) -> Self {
        Self { count, cell_id: None, changes: None, effect: MarkEffect::Remove(Remove::new(revision, id)) }
    }

    pub fn move_out(count: u32, revision: Option<RevisionTag>, id: LocalId) -> Self {
        Self { count, cell_id: None, changes: None, effect: MarkEffect::MoveOut(MoveOut::new(revision, id)) }
    }

    /// Move content into the empty cells starting at `cell_id`.
    pub fn move_in(count: u32, revision: Option<RevisionTag>, id: LocalId, cell_id: CellId) -> Self {
        Self { count, cell_id: Some(cell_id), changes: None, effect: MarkEffect::MoveIn(MoveIn::new(revision, id)) }
    }

    pub fn with_cell(mut self, cell_id: Option<CellId>) -> Self {
        self.cell_id = cell_id;
        self
    }

    pub fn with_changes(mut self, changes: Option<C>) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_effect(mut self, effect: MarkEffect) -> Self {
        self.effect = effect;
        self
    }

    /// A copy of this mark with its effect removed. Cell id, count and nested changes stay.
    pub fn without_effect(&self) -> Self where C: Clone {
        Self { count: self.count, cell_id: self.cell_id.clone(), changes: self.changes.clone(), effect: MarkEffect::NoOp }
    }

    /// The id of the cells after the mark is applied. None if they are filled.
    pub fn output_cell_id(&self) -> Option<CellId> {
        match &self.effect {
            MarkEffect::NoOp => self.cell_id.clone(),
            MarkEffect::Insert(_) | MarkEffect::MoveIn(_) => None,
            MarkEffect::Remove(_) | MarkEffect::MoveOut(_) => {
                Some(self.effect.as_detach().unwrap().output_cell_id())
            }
            MarkEffect::AttachAndDetach(ad) => Some(ad.detach.output_cell_id()),
        }
    }
}

pub fn are_input_cells_empty<C>(mark: &Mark<C>) -> bool {
    mark.cell_id.is_some()
}

pub fn are_output_cells_empty<C>(mark: &Mark<C>) -> bool {
    match &mark.effect {
        MarkEffect::NoOp => mark.cell_id.is_some(),
        MarkEffect::Remove(_) | MarkEffect::MoveOut(_) | MarkEffect::AttachAndDetach(_) => true,
        MarkEffect::Insert(_) | MarkEffect::MoveIn(_) => false,
    }
}

/// Filled before, empty after.
pub fn mark_empties_cells<C>(mark: &Mark<C>) -> bool {
    !are_input_cells_empty(mark) && are_output_cells_empty(mark)
}

/// Empty before, filled after.
pub fn mark_fills_cells<C>(mark: &Mark<C>) -> bool {
    are_input_cells_empty(mark) && !are_output_cells_empty(mark)
}

/// True if the mark changes which content is in its cells, or what the cells are called.
pub fn mark_has_cell_effect<C>(mark: &Mark<C>) -> bool {
    match &mark.effect {
        MarkEffect::NoOp => false,
        MarkEffect::AttachAndDetach(_) => true,
        MarkEffect::Remove(_) | MarkEffect::MoveOut(_) if are_input_cells_empty(mark) => {
            mark.output_cell_id().map(|out| !mark.cell_id.as_ref().unwrap().same_cell(&out)).unwrap_or(false)
        }
        _ => mark_empties_cells(mark) || mark_fills_cells(mark),
    }
}

/// Number of filled cells the changeset covers before it is applied.
pub fn input_length<C>(changeset: &[Mark<C>]) -> usize {
    changeset.iter()
        .filter(|m| !are_input_cells_empty(m))
        .map(|m| m.count as usize)
        .sum()
}

/// Number of filled cells the changeset covers after it is applied.
pub fn output_length<C>(changeset: &[Mark<C>]) -> usize {
    changeset.iter()
        .filter(|m| !are_output_cells_empty(m))
        .map(|m| m.count as usize)
        .sum()
}

impl<C> HasLength for Mark<C> {
    fn len(&self) -> usize { self.count as usize }
}

impl<C: Clone> SplitableSpanHelpers for Mark<C> {
    fn truncate_h(&mut self, at: usize) -> Self {
        let at = at as u32;
        assert!(at > 0 && at < self.count, "Split offset {} is out of range for a mark of length {}", at, self.count);
        debug_assert!(self.changes.is_none(), "Marks with nested changes cover a single cell");

        let remainder = Mark {
            count: self.count - at,
            cell_id: self.cell_id.as_ref().map(|c| c.offset(at)),
            changes: None,
            effect: self.effect.offset(at),
        };
        self.count = at;
        remainder
    }
}

impl<C: Clone> MergableSpan for Mark<C> {
    fn can_append(&self, other: &Self) -> bool {
        if self.changes.is_some() || other.changes.is_some() { return false; }

        let cells_ok = match (&self.cell_id, &other.cell_id) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_continued_by(self.count, b),
            _ => false,
        };

        cells_ok && self.effect.continued_by(self.count, &other.effect)
    }

    fn append(&mut self, other: Self) {
        debug_assert!(self.can_append(&other));
        self.count += other.count;
    }
}

/// Merge two adjacent marks into one, if they can be represented that way.
pub fn try_merge_marks<C: Clone>(lhs: &Mark<C>, rhs: &Mark<C>) -> Option<Mark<C>> {
    if lhs.can_append(rhs) {
        let mut result = lhs.clone();
        result.append(rhs.clone());
        Some(result)
    } else { None }
}

/// Split a mark into a prefix of `length` cells and the rest.
///
/// Panics unless 0 < length < mark.count.
pub fn split_mark<C: Clone>(mark: &Mark<C>, length: u32) -> (Mark<C>, Mark<C>) {
    let mut start = mark.clone();
    let end = start.truncate(length as usize);
    (start, end)
}
