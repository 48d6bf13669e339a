//! Segment Module
//!
//! An immutable sorted run stored as two files: a fixed-width index and a
//! variable-length data file. Entries are unique and strictly ascending by
//! key; the segment's ordinal encodes freshness (higher = fresher).
//!
//! ## File Format
//!
//! All integers are big-endian.
//!
//! ```text
//! N.dat ─ concatenated entries
//! ┌─────────────────────────────────────────────────────────┐
//! │ KeyLen: i32 │ Key │ ValLen: i32 │ Value                 │
//! │ ... repeated for each entry, ascending key order ...    │
//! │ (ValLen = -1 means tombstone, no value bytes follow)    │
//! └─────────────────────────────────────────────────────────┘
//!
//! N.idx ─ entry offsets plus trailing count
//! ┌─────────────────────────────────────────────────────────┐
//! │ Offset_0: u32 │ Offset_1: u32 │ ... │ Count: u32        │
//! │ (offsets are absolute byte positions in N.dat)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The trailing count is authoritative: `count = (index_size - 4) / 4`.

mod iterator;
mod reader;
mod writer;

pub use iterator::SegmentIter;
pub use reader::Segment;
pub use writer::write_segment;

// =============================================================================
// Shared Constants (used by reader, writer, iterator)
// =============================================================================

/// Length field value marking an absent (tombstone) value
pub(crate) const TOMBSTONE_LEN: i32 = -1;

/// Width of every fixed integer field (offsets, counts, lengths)
pub(crate) const FIELD_BYTES: usize = 4;
