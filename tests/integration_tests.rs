//! Integration tests for StrataKV
//!
//! Note: Most tests live in dedicated test modules:
//! - Segment tests: tests/segment_tests.rs
//! - Merge tests: tests/merge_tests.rs
//! - Store tests: tests/store_tests.rs
//!
//! This file contains configuration tests and higher-level scenarios that
//! span flush, scan, compaction, and restart.

use stratakv::{Config, Entry, SegmentStore};
use tempfile::TempDir;

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_config_default() {
    let config = Config::default();

    assert_eq!(config.data_dir.to_str().unwrap(), "./stratakv_data");
    assert!(config.sync_writes);
}

#[test]
fn test_config_builder() {
    let config = Config::builder()
        .data_dir("/custom/path")
        .sync_writes(false)
        .build();

    assert_eq!(config.data_dir.to_str().unwrap(), "/custom/path");
    assert!(!config.sync_writes);
}

#[test]
fn test_config_builder_default_values() {
    // Builder should start from the defaults
    let config = Config::builder().build();
    let default_config = Config::default();

    assert_eq!(config.data_dir, default_config.data_dir);
    assert_eq!(config.sync_writes, default_config.sync_writes);
}

// =============================================================================
// End-to-End Integration Tests
// =============================================================================

#[test]
fn test_full_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().to_path_buf();

    // Phase 1: flush several generations, delete a key, compact
    {
        let config = Config::builder().data_dir(&data_dir).build();
        let store = SegmentStore::open(config).unwrap();

        store
            .flush(vec![
                Entry::new("user:1", "Alice"),
                Entry::new("user:2", "Bob"),
                Entry::new("user:3", "Charlie"),
            ])
            .unwrap();
        store
            .flush(vec![Entry::tombstone("user:2"), Entry::new("user:4", "Diana")])
            .unwrap();

        assert_eq!(store.segment_count(), 2);

        // Deleted key: visible as a tombstone to point lookups, absent
        // from scans
        assert!(store.find_entry(b"user:2").unwrap().unwrap().is_tombstone());
        let scanned: Vec<Vec<u8>> = store
            .range_scan(None, None, Vec::new())
            .unwrap()
            .map(|r| r.unwrap().key)
            .collect();
        assert_eq!(
            scanned,
            vec![
                b"user:1".to_vec(),
                b"user:3".to_vec(),
                b"user:4".to_vec(),
            ]
        );

        store.compact().unwrap();
        assert!(store.is_compacted());
    }

    // Phase 2: reopen and verify the compacted state persisted
    {
        let config = Config::builder().data_dir(&data_dir).build();
        let store = SegmentStore::open(config).unwrap();

        assert_eq!(store.segment_count(), 1);
        assert_eq!(
            store.find_entry(b"user:1").unwrap(),
            Some(Entry::new("user:1", "Alice"))
        );
        assert_eq!(
            store.find_entry(b"user:4").unwrap(),
            Some(Entry::new("user:4", "Diana"))
        );
        // The tombstone was garbage-collected by compaction
        assert_eq!(store.find_entry(b"user:2").unwrap(), None);
    }
}

#[test]
fn test_scan_spans_segments_and_memtables() {
    let temp_dir = TempDir::new().unwrap();
    let store = SegmentStore::open_path(temp_dir.path()).unwrap();

    store
        .flush(vec![Entry::new("a", "disk"), Entry::new("c", "disk")])
        .unwrap();
    store.flush(vec![Entry::new("b", "disk2")]).unwrap();

    // Two memtable snapshots, freshest first
    let fresh: Box<dyn Iterator<Item = Entry>> = Box::new(
        vec![Entry::new("c", "fresh"), Entry::tombstone("d")].into_iter(),
    );
    let stale: Box<dyn Iterator<Item = Entry>> =
        Box::new(vec![Entry::new("d", "stale"), Entry::new("e", "stale")].into_iter());

    let merged: Vec<Entry> = store
        .range_scan(None, None, vec![fresh, stale])
        .unwrap()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(
        merged,
        vec![
            Entry::new("a", "disk"),
            Entry::new("b", "disk2"),
            Entry::new("c", "fresh"), // memtable beats segment
            Entry::new("e", "stale"), // "d" killed by the fresher tombstone
        ]
    );
}

#[test]
fn test_unsynced_writes_still_readable() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .sync_writes(false)
        .build();
    let store = SegmentStore::open(config).unwrap();

    store.flush(vec![Entry::new("k", "v")]).unwrap();
    store.compact().unwrap();

    assert_eq!(store.find_entry(b"k").unwrap(), Some(Entry::new("k", "v")));
}

#[test]
fn test_repeated_flush_compact_cycles() {
    let temp_dir = TempDir::new().unwrap();
    let store = SegmentStore::open_path(temp_dir.path()).unwrap();

    for round in 0..3 {
        for i in 0..10 {
            store
                .flush(vec![Entry::new(
                    format!("key{:02}", i),
                    format!("round{}", round),
                )])
                .unwrap();
        }
        store.compact().unwrap();
        assert!(store.is_compacted());
    }

    // Every key carries the value from the last round
    let merged: Vec<Entry> = store
        .range_scan(None, None, Vec::new())
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(merged.len(), 10);
    for entry in &merged {
        assert_eq!(entry.value, Some(b"round2".to_vec()));
    }
}
