//! Merge Module
//!
//! K-way merge over prioritized peeking iterators. When the same key
//! appears in multiple sources, only the freshest version (highest
//! priority) is emitted; tombstones are suppressed at the merged output
//! boundary.

mod peek;

use std::collections::BinaryHeap;

pub use peek::{EntrySource, PeekIterator};

use crate::entry::Entry;
use crate::error::Result;

/// Merged, deduplicated, tombstone-suppressed stream over any number of
/// ordered entry sources.
///
/// Backed by a min-heap on `(current key ASC, priority DESC)`. Output keys
/// are strictly ascending; each key appears at most once, carrying the
/// value from the freshest source that held it.
pub struct MergeIterator {
    heap: BinaryHeap<PeekIterator>,
}

impl MergeIterator {
    /// Build a merge over the given sources, dropping empty ones.
    pub fn new(sources: impl IntoIterator<Item = PeekIterator>) -> Self {
        let heap = sources
            .into_iter()
            .filter(|iter| iter.peek().is_some())
            .collect();
        Self { heap }
    }

    /// Whether every source is already exhausted
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut top = self.heap.pop()?;
            let entry = match top.advance() {
                Some(Ok(entry)) => entry,
                Some(Err(e)) => return Some(Err(e)),
                // Exhausted iterators are never queued.
                None => continue,
            };
            if top.peek().is_some() {
                self.heap.push(top);
            }

            // Every other source currently holding this key is an older,
            // shadowed version: advance them past it.
            loop {
                let shadowed = match self.heap.peek() {
                    Some(it) => it.peek_key() == Some(entry.key.as_slice()),
                    None => false,
                };
                if !shadowed {
                    break;
                }
                if let Some(mut older) = self.heap.pop() {
                    if let Some(Err(e)) = older.advance() {
                        return Some(Err(e));
                    }
                    if older.peek().is_some() {
                        self.heap.push(older);
                    }
                }
            }

            // Deleted keys never reach the merged output.
            if entry.is_tombstone() {
                continue;
            }

            return Some(Ok(entry));
        }
    }
}
