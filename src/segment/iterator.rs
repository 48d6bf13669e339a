//! Segment Iterator
//!
//! Ordered iteration over one segment's entries within `[from, to)`.

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::Result;

use super::Segment;

/// Iterator over a bounded key range of a single segment.
///
/// Holds an `Arc` pin on its segment, so the backing maps stay alive even
/// if a compaction retires the segment mid-scan.
pub struct SegmentIter {
    segment: Arc<Segment>,
    /// Position of the next entry to yield
    position: usize,
    /// Exclusive upper bound; `None` = unbounded above
    to: Option<Vec<u8>>,
}

impl SegmentIter {
    /// Start a scan at the first key >= `from`.
    pub fn new(segment: Arc<Segment>, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<Self> {
        let position = segment.greater_or_equal(from)?;
        Ok(Self {
            segment,
            position,
            to: to.map(<[u8]>::to_vec),
        })
    }
}

impl Iterator for SegmentIter {
    /// Decode errors end the iteration after being yielded once.
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.position >= self.segment.entry_count() {
            return None;
        }

        let entry = match self.segment.read_entry(self.position) {
            Ok(entry) => entry,
            Err(e) => {
                self.position = self.segment.entry_count();
                return Some(Err(e));
            }
        };

        if let Some(to) = &self.to {
            if entry.key.as_slice() >= to.as_slice() {
                self.position = self.segment.entry_count();
                return None;
            }
        }

        self.position += 1;
        Some(Ok(entry))
    }
}
