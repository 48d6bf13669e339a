//! Peeking prioritized iterator
//!
//! Wraps an ordered entry source with a freshness priority and an eagerly
//! cached head, so a merge heap can order sources by their current key
//! without consuming it.

use std::cmp::Ordering;

use crate::entry::Entry;
use crate::error::Result;
use crate::segment::SegmentIter;

/// An ordered stream of entries feeding the merge.
pub enum EntrySource {
    /// Bounded scan over one on-disk segment
    Segment(SegmentIter),
    /// Caller-supplied ordered snapshot of an in-memory table
    Memtable(Box<dyn Iterator<Item = Entry>>),
}

impl Iterator for EntrySource {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            EntrySource::Segment(iter) => iter.next(),
            EntrySource::Memtable(iter) => iter.next().map(Ok),
        }
    }
}

/// An entry source with non-destructive `peek` and a freshness priority.
///
/// Larger priority = fresher = wins key ties. On-disk segments use their
/// ordinal; memtables are assigned priorities above every ordinal.
pub struct PeekIterator {
    source: EntrySource,
    priority: u64,
    /// Eagerly cached head of the source
    next: Option<Result<Entry>>,
}

impl PeekIterator {
    pub fn new(mut source: EntrySource, priority: u64) -> Self {
        let next = source.next();
        Self {
            source,
            priority,
            next,
        }
    }

    /// Current head without consuming it
    pub fn peek(&self) -> Option<&Result<Entry>> {
        self.next.as_ref()
    }

    /// Current head key, when the head is a healthy entry
    pub fn peek_key(&self) -> Option<&[u8]> {
        match &self.next {
            Some(Ok(entry)) => Some(&entry.key),
            _ => None,
        }
    }

    /// Take the current head and cache the next one
    pub fn advance(&mut self) -> Option<Result<Entry>> {
        let current = self.next.take();
        if current.is_some() {
            self.next = self.source.next();
        }
        current
    }

    pub fn priority(&self) -> u64 {
        self.priority
    }
}

// Heap ordering: `BinaryHeap` pops its greatest element, so the iterator
// that must pop first compares greatest. Smallest current key wins, key
// ties go to the higher priority, and an errored head beats everything so
// the error surfaces immediately.
impl Ord for PeekIterator {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.next, &other.next) {
            (Some(Ok(a)), Some(Ok(b))) => b
                .key
                .cmp(&a.key)
                .then_with(|| self.priority.cmp(&other.priority)),
            (Some(Err(_)), Some(Err(_))) => self.priority.cmp(&other.priority),
            (Some(Err(_)), _) => Ordering::Greater,
            (_, Some(Err(_))) => Ordering::Less,
            // Exhausted iterators are never queued; order them last anyway.
            (None, None) => Ordering::Equal,
            (None, _) => Ordering::Less,
            (_, None) => Ordering::Greater,
        }
    }
}

impl PartialOrd for PeekIterator {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PeekIterator {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PeekIterator {}
