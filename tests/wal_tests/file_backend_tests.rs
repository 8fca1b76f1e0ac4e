//! Tests for the File Backend
//!
//! These tests verify:
//! - Append + scan on disk and in memory
//! - Content survives reopen and is appended to, never rewritten
//! - Truncated trailing bytes surface as a decode error on reopen
//! - Close semantics

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use tempfile::TempDir;
use txlog::backend::{Backend, FileBackend, SharedBuffer};
use txlog::wal::Event;
use txlog::{SyncPolicy, TxLogError};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("transaction.log");
    (temp_dir, log_path)
}

fn scan_all(backend: &mut dyn Backend) -> Vec<Event> {
    backend.scan().unwrap().map(|e| e.unwrap()).collect()
}

// =============================================================================
// Disk Tests
// =============================================================================

#[test]
fn test_open_creates_file() {
    let (_temp, log_path) = setup_temp_log();
    assert!(!log_path.exists());

    let mut backend = FileBackend::open(&log_path, SyncPolicy::EveryWrite).unwrap();

    assert!(log_path.exists());
    assert_eq!(backend.path(), Some(log_path.as_path()));
    assert_eq!(backend.name(), "file");
    assert!(scan_all(&mut backend).is_empty());
}

#[test]
fn test_open_creates_parent_directories() {
    let temp = TempDir::new().unwrap();
    let log_path = temp.path().join("nested").join("dir").join("tx.log");

    FileBackend::open(&log_path, SyncPolicy::Never).unwrap();

    assert!(log_path.exists());
}

#[test]
fn test_append_and_scan() {
    let (_temp, log_path) = setup_temp_log();
    let mut backend = FileBackend::open(&log_path, SyncPolicy::EveryWrite).unwrap();

    assert_eq!(backend.append(&Event::put("a", "1").with_sequence(1)).unwrap(), 1);
    assert_eq!(backend.append(&Event::delete("a").with_sequence(2)).unwrap(), 2);

    let events = scan_all(&mut backend);
    assert_eq!(
        events,
        vec![
            Event::put("a", "1").with_sequence(1),
            Event::delete("a").with_sequence(2),
        ]
    );
}

#[test]
fn test_reopen_keeps_and_appends() {
    let (_temp, log_path) = setup_temp_log();

    {
        let mut backend = FileBackend::open(&log_path, SyncPolicy::EveryWrite).unwrap();
        backend.append(&Event::put("a", "1").with_sequence(1)).unwrap();
        backend.close().unwrap();
    }
    let size_after_first = fs::metadata(&log_path).unwrap().len();

    let mut backend = FileBackend::open(&log_path, SyncPolicy::EveryWrite).unwrap();
    assert_eq!(fs::metadata(&log_path).unwrap().len(), size_after_first);

    backend.append(&Event::put("b", "2").with_sequence(2)).unwrap();

    let events = scan_all(&mut backend);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].key, "a");
    assert_eq!(events[1].key, "b");
}

#[test]
fn test_truncated_tail_is_decode_error() {
    let (_temp, log_path) = setup_temp_log();

    {
        let mut backend = FileBackend::open(&log_path, SyncPolicy::EveryWrite).unwrap();
        backend.append(&Event::put("a", "1").with_sequence(1)).unwrap();
        backend.append(&Event::put("b", "2").with_sequence(2)).unwrap();
    }

    // Simulate a torn write of the second record
    let len = fs::metadata(&log_path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&log_path).unwrap();
    file.set_len(len - 3).unwrap();
    drop(file);

    let mut backend = FileBackend::open(&log_path, SyncPolicy::EveryWrite).unwrap();
    let results: Vec<_> = backend.scan().unwrap().collect();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap().key, "a");
    assert!(matches!(results[1], Err(TxLogError::Decode(_))));
}

#[test]
fn test_scan_stops_after_corrupt_record() {
    let buffer = SharedBuffer::new();
    let mut bytes = Event::put("a", "1").with_sequence(1).encode().unwrap();
    let mut corrupt = Event::put("b", "2").with_sequence(2).encode().unwrap();
    let last = corrupt.len() - 1;
    corrupt[last] ^= 0x55;
    bytes.extend_from_slice(&corrupt);
    bytes.extend_from_slice(&Event::put("c", "3").with_sequence(3).encode().unwrap());
    buffer.replace(bytes);

    let mut backend = FileBackend::with_buffer(buffer);
    let mut scan = backend.scan().unwrap();

    assert_eq!(scan.next().unwrap().unwrap().key, "a");
    assert!(matches!(scan.next(), Some(Err(TxLogError::Decode(_)))));
    assert!(scan.next().is_none());
}

#[test]
fn test_close_then_append_fails() {
    let (_temp, log_path) = setup_temp_log();
    let mut backend = FileBackend::open(&log_path, SyncPolicy::EveryWrite).unwrap();

    backend.close().unwrap();

    assert!(backend.is_closed());
    assert!(matches!(
        backend.append(&Event::put("a", "1").with_sequence(1)),
        Err(TxLogError::BackendClosed)
    ));
    // Second close is a no-op
    backend.close().unwrap();
}

#[test]
fn test_append_rejects_invalid_event() {
    let (_temp, log_path) = setup_temp_log();
    let mut backend = FileBackend::open(&log_path, SyncPolicy::Never).unwrap();

    assert!(backend.append(&Event::put("", "v").with_sequence(1)).is_err());
    assert_eq!(fs::metadata(&log_path).unwrap().len(), 0);
}

// =============================================================================
// In-Memory Tests
// =============================================================================

#[test]
fn test_in_memory_append_and_scan() {
    let mut backend = FileBackend::in_memory();
    assert_eq!(backend.name(), "memory");
    assert!(backend.path().is_none());

    backend.append(&Event::put("key1", "value123").with_sequence(1)).unwrap();

    assert_eq!(
        scan_all(&mut backend),
        vec![Event::put("key1", "value123").with_sequence(1)]
    );
}

#[test]
fn test_shared_buffer_visible_to_second_backend() {
    let buffer = SharedBuffer::new();
    assert!(buffer.is_empty());

    let mut first = FileBackend::with_buffer(buffer.clone());
    first.append(&Event::put("a", "1").with_sequence(1)).unwrap();
    first.close().unwrap();

    assert!(!buffer.is_empty());

    let mut second = FileBackend::with_buffer(buffer.clone());
    let events = scan_all(&mut second);
    assert_eq!(events, vec![Event::put("a", "1").with_sequence(1)]);
    assert_eq!(buffer.len(), buffer.bytes().len());
}
