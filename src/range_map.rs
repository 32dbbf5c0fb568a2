use std::cmp::Ordering::*;
use std::fmt::Debug;

use crate::revision::LocalId;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Values stored in a [`RangeMap`] describe a whole run of ids. When only part of a run is
/// looked up (or overwritten) the value needs to be shifted along to describe the remainder.
pub trait RangeValue: Clone {
    fn offset(&self, by: u32) -> Self;
}

impl RangeValue for () {
    fn offset(&self, _by: u32) -> Self {}
}

impl RangeValue for bool {
    fn offset(&self, _by: u32) -> Self { *self }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RangeEntry<T> {
    pub start: LocalId,
    pub length: u32,
    pub value: T,
}

impl<T> RangeEntry<T> {
    pub fn end(&self) -> LocalId { self.start + self.length }
}

/// The result of looking up a run of ids. `length` is the number of ids (from the start of the
/// query) which share this answer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RangeQueryResult<T> {
    pub value: Option<T>,
    pub length: u32,
}

/// A sparse map from runs of local ids to values. Entries are kept sorted and never overlap, so
/// lookups are a binary search.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RangeMap<T>(Vec<RangeEntry<T>>);

impl<T> Default for RangeMap<T> {
    fn default() -> Self { Self(Vec::new()) }
}

impl<T: RangeValue> RangeMap<T> {
    pub fn new() -> Self { Self::default() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn num_entries(&self) -> usize { self.0.len() }

    pub fn iter(&self) -> std::slice::Iter<'_, RangeEntry<T>> { self.0.iter() }

    /// Find the index of the entry containing `needle` via binary search. If no entry contains
    /// it, returns the index of the next entry (or self.0.len()).
    fn find_index(&self, needle: LocalId) -> Result<usize, usize> {
        self.0.binary_search_by(|entry| {
            if needle < entry.start { Greater }
            else if needle >= entry.end() { Less }
            else { Equal }
        })
    }

    /// Look up the value at `start`. The returned length says how much of the requested run has
    /// the same answer.
    pub fn get(&self, start: LocalId, length: u32) -> RangeQueryResult<T> {
        debug_assert!(length > 0);
        match self.find_index(start) {
            Ok(idx) => {
                let entry = &self.0[idx];
                let offset = start - entry.start;
                RangeQueryResult {
                    value: Some(entry.value.offset(offset)),
                    length: length.min(entry.end() - start),
                }
            }
            Err(idx) => {
                let length = match self.0.get(idx) {
                    Some(next) => length.min(next.start - start),
                    None => length,
                };
                RangeQueryResult { value: None, length }
            }
        }
    }

    /// True if any id in the run has a value.
    pub fn overlaps(&self, start: LocalId, length: u32) -> bool {
        let end = start + length;
        let idx = self.find_index(start).unwrap_or_else(|i| i);
        self.0.get(idx).map_or(false, |e| e.start < end)
    }

    /// Remove all values in the run. Entries which straddle the edges are trimmed.
    pub fn delete(&mut self, start: LocalId, length: u32) {
        let end = start + length;
        let mut idx = match self.find_index(start) {
            Ok(idx) => {
                let entry = &mut self.0[idx];
                if entry.start < start {
                    // Split off the part of the entry before the deleted run.
                    let cut = start - entry.start;
                    let rest = RangeEntry {
                        start,
                        length: entry.length - cut,
                        value: entry.value.offset(cut),
                    };
                    entry.length = cut;
                    self.0.insert(idx + 1, rest);
                    idx + 1
                } else { idx }
            }
            Err(idx) => idx,
        };

        while idx < self.0.len() && self.0[idx].start < end {
            let entry = &mut self.0[idx];
            if entry.end() <= end {
                self.0.remove(idx);
            } else {
                let cut = end - entry.start;
                entry.value = entry.value.offset(cut);
                entry.start = end;
                entry.length -= cut;
                break;
            }
        }
    }

    /// Set the value of a run of ids, replacing whatever was there.
    pub fn set(&mut self, start: LocalId, length: u32, value: T) {
        assert!(length > 0, "Cannot set an empty range");
        self.delete(start, length);
        let idx = self.find_index(start).unwrap_or_else(|i| i);
        self.0.insert(idx, RangeEntry { start, length, value });
    }
}
