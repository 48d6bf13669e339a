//! Segment Store
//!
//! Owns the ordered segment list and the storage directory, and coordinates
//! reads, flushes, and compaction.
//!
//! ## Responsibilities
//! - Discover existing segments on startup, finishing any interrupted
//!   compaction first
//! - Search segments freshest → oldest for point lookups
//! - Merge segments and caller-supplied memtable snapshots for range scans
//! - Flush sorted snapshots into new segments (temp file + atomic rename)
//! - Compact the whole set into a single segment, restart-safely

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::entry::Entry;
use crate::error::Result;
use crate::merge::{EntrySource, MergeIterator, PeekIterator};
use crate::segment::{write_segment, Segment};
use crate::StrataError;

const INDEX_SUFFIX: &str = "idx";
const DATA_SUFFIX: &str = "dat";
const COMPACTED_PREFIX: &str = "compacted_";
const TMP_PREFIX: &str = "tmp_";

/// Manages the segment set of one storage directory.
///
/// ## Concurrency:
/// - `segments`: an `Arc` list snapshot behind an `RwLock`. Readers clone
///   the `Arc` (pinning the snapshot and, transitively, every segment map
///   in it) and never block writers for longer than the pointer swap.
/// - `flush_compact_lock`: serializes the two mutating operations; point
///   lookups and scans never take it.
pub struct SegmentStore {
    config: Config,

    /// Open segments, ordered freshest → oldest
    segments: RwLock<Arc<Vec<Arc<Segment>>>>,

    /// Serializes `flush` and `compact`
    flush_compact_lock: Mutex<()>,
}

impl SegmentStore {
    /// Open or create a segment store in the configured directory.
    ///
    /// On startup:
    /// 1. Create the directory if it doesn't exist
    /// 2. Finish any compaction a crash interrupted (sentinel files)
    /// 3. Probe `0.idx/0.dat`, `1.idx/1.dat`, … until an ordinal is missing
    /// 4. Order the list freshest first
    pub fn open(config: Config) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;

        if compacted_index_path(&config.data_dir).exists()
            || compacted_data_path(&config.data_dir).exists()
        {
            tracing::warn!(
                "compaction sentinels found in {}, finishing interrupted compaction",
                config.data_dir.display()
            );
        }
        finish_compact(&config.data_dir)?;

        let mut parts = Vec::new();
        for ordinal in 0usize.. {
            let index = index_path(&config.data_dir, ordinal);
            let data = data_path(&config.data_dir, ordinal);
            match Segment::open(&index, &data, ordinal) {
                Ok(segment) => parts.push(Arc::new(segment)),
                // A missing ordinal terminates the probe; it is not an error.
                Err(StrataError::Io(e)) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e),
            }
        }
        parts.reverse();

        tracing::info!(
            "opened segment store at {} with {} segments",
            config.data_dir.display(),
            parts.len()
        );

        Ok(Self {
            config,
            segments: RwLock::new(Arc::new(parts)),
            flush_compact_lock: Mutex::new(()),
        })
    }

    /// Open with a path and default options (convenience method)
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Find the entry with the given key, searching freshest → oldest.
    ///
    /// The first match wins, tombstone or not. Callers interpret
    /// tombstones, so "deleted" and "never existed" stay distinguishable.
    pub fn find_entry(&self, key: &[u8]) -> Result<Option<Entry>> {
        let parts = self.pin();
        for segment in parts.iter() {
            if let Some(entry) = segment.get(key)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Merged ordered scan over `from <= key < to` across every segment
    /// plus the given memtable snapshots.
    ///
    /// Memtables must be ordered, and the freshest must come first: they
    /// are prioritized above all segments, in the order given. Tombstones
    /// are suppressed from the merged output.
    pub fn range_scan(
        &self,
        from: Option<&[u8]>,
        to: Option<&[u8]>,
        memtables: Vec<Box<dyn Iterator<Item = Entry>>>,
    ) -> Result<MergeIterator> {
        let parts = self.pin();
        let mut sources = Vec::with_capacity(parts.len() + memtables.len());

        for segment in parts.iter() {
            let iter = Segment::range(Arc::clone(segment), from, to)?;
            sources.push(PeekIterator::new(
                EntrySource::Segment(iter),
                segment.ordinal() as u64,
            ));
        }

        for (nth, memtable) in memtables.into_iter().enumerate() {
            sources.push(PeekIterator::new(
                EntrySource::Memtable(memtable),
                u64::MAX - nth as u64,
            ));
        }

        Ok(MergeIterator::new(sources))
    }

    /// Persist a sorted snapshot as the freshest segment.
    ///
    /// The snapshot must be in strictly ascending key order with unique
    /// keys (a sorted-map snapshot satisfies this). An empty snapshot is a
    /// silent no-op.
    pub fn flush(&self, snapshot: Vec<Entry>) -> Result<()> {
        if snapshot.is_empty() {
            tracing::debug!("flush skipped: empty snapshot");
            return Ok(());
        }

        let _guard = self.flush_compact_lock.lock();

        let current = self.pin();
        let ordinal = current.len();
        let index = index_path(&self.config.data_dir, ordinal);
        let data = data_path(&self.config.data_dir, ordinal);

        let entries = snapshot.len();
        save_atomic(
            &index,
            &data,
            snapshot.into_iter().map(Ok),
            self.config.sync_writes,
        )?;

        // This segment is the freshest, so it goes in front.
        let segment = Arc::new(Segment::open(&index, &data, ordinal)?);
        let mut parts = Vec::with_capacity(current.len() + 1);
        parts.push(segment);
        parts.extend(current.iter().cloned());
        *self.segments.write() = Arc::new(parts);

        tracing::debug!("flushed {} entries to segment {}", entries, ordinal);
        Ok(())
    }

    /// Rewrite the whole segment set as a single segment at ordinal 0.
    ///
    /// The merged, tombstone-suppressed scan is written to the compaction
    /// sentinel pair, the swap is finished restart-safely (see
    /// [`finish_compact`]), and the in-memory list is replaced. Readers
    /// holding a pinned snapshot keep their view until they drop it.
    pub fn compact(&self) -> Result<()> {
        let _guard = self.flush_compact_lock.lock();

        let replaced = self.pin().len();
        let comp_index = compacted_index_path(&self.config.data_dir);
        let comp_data = compacted_data_path(&self.config.data_dir);

        let merged = self.range_scan(None, None, Vec::new())?;
        save_atomic(&comp_index, &comp_data, merged, self.config.sync_writes)?;
        finish_compact(&self.config.data_dir)?;

        let segment = Arc::new(Segment::open(
            &index_path(&self.config.data_dir, 0),
            &data_path(&self.config.data_dir, 0),
            0,
        )?);
        *self.segments.write() = Arc::new(vec![segment]);

        tracing::info!("compacted {} segments into one", replaced);
        Ok(())
    }

    /// Whether the set holds at most one segment
    pub fn is_compacted(&self) -> bool {
        self.segments.read().len() <= 1
    }

    /// Number of open segments
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Release the segment list. Maps unmap once the last pinned snapshot
    /// drops.
    pub fn close(&self) {
        *self.segments.write() = Arc::new(Vec::new());
    }

    /// Pin the current list snapshot
    fn pin(&self) -> Arc<Vec<Arc<Segment>>> {
        self.segments.read().clone()
    }
}

// =============================================================================
// Crash-recovery protocol
// =============================================================================

/// Finish an interrupted compaction swap, if there is one.
///
/// Compaction writes stage the sentinel pair data-file-first, so the
/// presence of `compacted_.idx` is the commit point:
///
/// - Neither sentinel: nothing to do.
/// - Only `compacted_.dat`: the compaction write never committed; the old
///   segments are still authoritative, so the orphan is deleted.
/// - Both sentinels: a committed swap: delete every numbered segment file
///   (by directory scan, so crash-created holes can't strand stale files),
///   then rename the data sentinel and finally the index sentinel into
///   ordinal 0.
/// - Only `compacted_.idx`: a previous swap crashed between the two final
///   renames; `0.dat` already holds the compacted data and the old files
///   are gone, so only the index rename remains.
///
/// Re-running after a crash at any point converges on the compacted state.
fn finish_compact(dir: &Path) -> Result<()> {
    let comp_index = compacted_index_path(dir);
    let comp_data = compacted_data_path(dir);

    if !comp_index.exists() {
        if comp_data.exists() {
            tracing::warn!("removing uncommitted compaction data file");
            fs::remove_file(&comp_data)?;
        }
        return Ok(());
    }

    if comp_data.exists() {
        for dir_entry in fs::read_dir(dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            if name.to_str().is_some_and(is_segment_file) {
                fs::remove_file(dir_entry.path())?;
            }
        }
        fs::rename(&comp_data, data_path(dir, 0))?;
    }
    fs::rename(&comp_index, index_path(dir, 0))?;

    Ok(())
}

/// Whether a file name is a numbered segment file (`<ordinal>.idx/.dat`)
fn is_segment_file(name: &str) -> bool {
    let (stem, suffix) = match name.split_once('.') {
        Some(parts) => parts,
        None => return false,
    };
    (suffix == INDEX_SUFFIX || suffix == DATA_SUFFIX)
        && !stem.is_empty()
        && stem.bytes().all(|b| b.is_ascii_digit())
}

// =============================================================================
// Atomic segment writes
// =============================================================================

/// Write a segment through sibling temporaries and atomic renames.
///
/// Stale temporaries from a crashed writer are deleted first. The data
/// file is renamed into place before the index file, so an index file at
/// its final name always refers to complete data.
fn save_atomic<I>(index_path: &Path, data_path: &Path, entries: I, sync: bool) -> Result<()>
where
    I: IntoIterator<Item = Result<Entry>>,
{
    let tmp_index = tmp_sibling(index_path)?;
    let tmp_data = tmp_sibling(data_path)?;
    remove_stale(&tmp_index)?;
    remove_stale(&tmp_data)?;

    write_segment(&tmp_index, &tmp_data, entries, sync)?;

    fs::rename(&tmp_data, data_path)?;
    fs::rename(&tmp_index, index_path)?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StrataError::Storage(format!("unusable path {}", path.display())))?;
    Ok(path.with_file_name(format!("{}{}", TMP_PREFIX, name)))
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// File naming
// =============================================================================

fn index_path(dir: &Path, ordinal: usize) -> PathBuf {
    dir.join(format!("{}.{}", ordinal, INDEX_SUFFIX))
}

fn data_path(dir: &Path, ordinal: usize) -> PathBuf {
    dir.join(format!("{}.{}", ordinal, DATA_SUFFIX))
}

fn compacted_index_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.{}", COMPACTED_PREFIX, INDEX_SUFFIX))
}

fn compacted_data_path(dir: &Path) -> PathBuf {
    dir.join(format!("{}.{}", COMPACTED_PREFIX, DATA_SUFFIX))
}
