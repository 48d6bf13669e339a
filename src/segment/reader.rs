//! Segment Reader
//!
//! Memory-maps one segment's index and data files and serves point lookups
//! via binary search over the fixed-width offset index.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::entry::Entry;
use crate::error::Result;
use crate::StrataError;

use super::{SegmentIter, FIELD_BYTES, TOMBSTONE_LEN};

/// One immutable sorted run: a read-only map of its index and data files.
///
/// The index file holds one big-endian u32 data-file offset per entry,
/// followed by a trailing u32 entry count. The trailing count is read once
/// at open and validated against the file length.
pub struct Segment {
    /// Position in the store's lifetime; higher ordinal = fresher
    ordinal: usize,
    /// Offset index map (`None` when the file is empty)
    index: Option<Mmap>,
    /// Entry data map (`None` when the file is empty)
    data: Option<Mmap>,
    /// Authoritative entry count from the index trailer
    entry_count: usize,
}

impl Segment {
    /// Open a segment from its index and data files.
    ///
    /// Both files are mapped read-only for the lifetime of the segment.
    /// Fails with `Io(NotFound)` when either file is missing, and with
    /// `Corrupt` when the index is non-empty but shorter than 4 bytes,
    /// not a whole number of fields, or its trailing count disagrees
    /// with the file length.
    pub fn open(index_path: &Path, data_path: &Path, ordinal: usize) -> Result<Self> {
        let index = map_file(index_path)?;
        let data = map_file(data_path)?;

        let index_len = index.as_ref().map_or(0, |m| m.len());
        let entry_count = if index_len == 0 {
            0
        } else {
            if index_len < FIELD_BYTES {
                return Err(StrataError::Corrupt(format!(
                    "index file {} is {} bytes, too short for a trailing count",
                    index_path.display(),
                    index_len
                )));
            }
            if index_len % FIELD_BYTES != 0 {
                return Err(StrataError::Corrupt(format!(
                    "index file {} length {} is not field-aligned",
                    index_path.display(),
                    index_len
                )));
            }
            let bytes = index.as_deref().unwrap_or(&[]);
            let count = read_u32(bytes, index_len - FIELD_BYTES)? as usize;
            if index_len != (count + 1) * FIELD_BYTES {
                return Err(StrataError::Corrupt(format!(
                    "index file {} trailing count {} disagrees with length {}",
                    index_path.display(),
                    count,
                    index_len
                )));
            }
            count
        };

        Ok(Self {
            ordinal,
            index,
            data,
            entry_count,
        })
    }

    /// Find the entry with exactly this key.
    ///
    /// Tombstones are returned as entries with no value; the segment does
    /// not interpret them.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let position = self.greater_or_equal(Some(key))?;
        if position >= self.entry_count {
            return Ok(None);
        }
        let entry = self.read_entry(position)?;
        Ok(if entry.key == key { Some(entry) } else { None })
    }

    /// Freshness ordinal assigned at creation
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Number of entries in this segment
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    /// Whether the segment holds no entries
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Bounded scan over `from <= key < to`; `None` means unbounded.
    pub fn range(
        segment: Arc<Segment>,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
    ) -> Result<SegmentIter> {
        SegmentIter::new(segment, from, to)
    }

    /// Position of the first entry with key >= `key`, in `[0, entry_count]`.
    ///
    /// `None` and the empty segment both map to 0; `entry_count` means no
    /// in-range entry exists. A lower-bound search, so positions -1 and
    /// `entry_count` are never decoded.
    pub(super) fn greater_or_equal(&self, key: Option<&[u8]>) -> Result<usize> {
        let key = match key {
            Some(key) => key,
            None => return Ok(0),
        };
        if self.entry_count == 0 {
            return Ok(0);
        }

        let mut first = 0;
        let mut last = self.entry_count - 1;
        while first < last {
            let mid = first + (last - first) / 2;
            if self.key_at(mid)?.as_slice() < key {
                first = mid + 1;
            } else {
                last = mid;
            }
        }

        // `first` is the last candidate; it may still sort below the key
        // when the key is greater than everything in the segment.
        if self.key_at(first)?.as_slice() < key {
            Ok(first + 1)
        } else {
            Ok(first)
        }
    }

    /// Decode the full entry at `position`.
    pub(super) fn read_entry(&self, position: usize) -> Result<Entry> {
        let mut at = self.entry_offset(position)?;
        let data = self.data_bytes();

        let key = match read_bytes(data, at)? {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(StrataError::Corrupt(format!(
                    "entry {} has no key",
                    position
                )))
            }
        };
        at += FIELD_BYTES + key.len();
        let value = read_bytes(data, at)?;

        Ok(Entry { key, value })
    }

    /// Decode only the key at `position` (binary-search probe).
    fn key_at(&self, position: usize) -> Result<Vec<u8>> {
        let at = self.entry_offset(position)?;
        match read_bytes(self.data_bytes(), at)? {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(StrataError::Corrupt(format!(
                "entry {} has no key",
                position
            ))),
        }
    }

    /// Data-file offset of the entry at `position`, from the index map.
    fn entry_offset(&self, position: usize) -> Result<usize> {
        let bytes = self.index.as_deref().unwrap_or(&[]);
        Ok(read_u32(bytes, position * FIELD_BYTES)? as usize)
    }

    fn data_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// Map a file read-only. Zero-length files are not mapped (mapping them
/// is an error on the platforms we target); `None` stands in for them.
fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let map = unsafe { Mmap::map(&file)? };
    Ok(Some(map))
}

/// Read a big-endian u32 at `at`, bounds-checked.
fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    let field = bytes
        .get(at..at + FIELD_BYTES)
        .ok_or_else(|| StrataError::Corrupt(format!("truncated read at offset {}", at)))?;
    let field: [u8; FIELD_BYTES] = field
        .try_into()
        .map_err(|_| StrataError::Corrupt(format!("truncated read at offset {}", at)))?;
    Ok(u32::from_be_bytes(field))
}

/// Read a length-prefixed byte string at `at`.
///
/// A length of -1 means the bytes are absent (tombstone value); any other
/// negative length, or a truncated payload, is corruption.
fn read_bytes(bytes: &[u8], at: usize) -> Result<Option<Vec<u8>>> {
    let len = read_u32(bytes, at)? as i32;
    if len == TOMBSTONE_LEN {
        return Ok(None);
    }
    if len < 0 {
        return Err(StrataError::Corrupt(format!(
            "negative length {} at offset {}",
            len, at
        )));
    }
    let start = at + FIELD_BYTES;
    let payload = bytes.get(start..start + len as usize).ok_or_else(|| {
        StrataError::Corrupt(format!("truncated payload of {} bytes at offset {}", len, start))
    })?;
    Ok(Some(payload.to_vec()))
}
