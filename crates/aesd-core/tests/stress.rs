//! Stress tests for aesd-core
//!
//! These tests verify store behavior under concurrent writers, sustained
//! eviction, and mixed device traffic.

use std::collections::HashSet;
use std::time::Instant;

use aesd_core::{CharDevice, RecordStore, SeekDirective, SharedStore};

// ============================================================================
// Concurrency Tests
// ============================================================================

/// N concurrent appenders each add one record; all land intact
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_keep_records_intact() {
    let capacity = 10;
    let store = SharedStore::with_capacity(capacity).unwrap();

    let mut handles = Vec::new();
    for i in 0..capacity {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let record = format!("writer-{i}-{}\n", "x".repeat(i * 100));
            store.append(record).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let guard = store.lock().await.unwrap();
    assert_eq!(guard.len(), capacity);

    let seen: HashSet<String> = guard
        .iter()
        .map(|r| String::from_utf8(r.as_bytes().to_vec()).unwrap())
        .collect();
    for i in 0..capacity {
        let expected = format!("writer-{i}-{}\n", "x".repeat(i * 100));
        assert!(seen.contains(&expected), "missing record from writer {i}");
    }
}

/// Many more writers than slots: the store never exceeds capacity and
/// total_size always matches the held records
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_with_eviction() {
    let store = SharedStore::with_capacity(10).unwrap();
    let writers = 50;
    let per_writer = 40;

    let start = Instant::now();
    let mut handles = Vec::new();
    for w in 0..writers {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..per_writer {
                store.append(format!("{w}:{n}\n")).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    println!(
        "Appended {} records in {:?}",
        writers * per_writer,
        start.elapsed()
    );

    let guard = store.lock().await.unwrap();
    assert_eq!(guard.len(), 10);
    let sum: usize = guard.iter().map(|r| r.len()).sum();
    assert_eq!(guard.total_size(), sum);
    assert_eq!(guard.read_from(0).len(), sum);
    assert!(guard.iter().all(|r| r.is_terminated()));
}

/// Readers racing writers always see whole records
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshots_never_split_records() {
    let store = SharedStore::with_capacity(5).unwrap();

    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for n in 0..500 {
                store.append(format!("record-{n:04}\n")).await.unwrap();
            }
        })
    };

    let reader = {
        let store = store.clone();
        tokio::spawn(async move {
            for _ in 0..500 {
                let snapshot = store.snapshot().await.unwrap();
                assert!(snapshot.is_empty() || snapshot.ends_with(b"\n"));
                for line in snapshot.split(|&b| b == b'\n').filter(|l| !l.is_empty()) {
                    assert_eq!(line.len(), "record-0000".len());
                    assert!(line.starts_with(b"record-"));
                }
            }
        })
    };

    writer.await.unwrap();
    reader.await.unwrap();
}

// ============================================================================
// Eviction Tests
// ============================================================================

/// Sustained eviction keeps exactly the newest `capacity` records in order
#[test]
fn test_sustained_eviction_order() {
    let mut store = RecordStore::new(7).unwrap();
    let total = 10_000;
    let mut evictions = 0;

    for i in 0..total {
        if store.append(format!("{i}\n")) {
            evictions += 1;
        }
    }

    assert_eq!(evictions, total - 7);
    let expected: String = (total - 7..total).map(|i| format!("{i}\n")).collect();
    assert_eq!(&store.read_from(0)[..], expected.as_bytes());
}

/// Entry addressing stays consistent after the ring wraps many times
#[test]
fn test_entry_addressing_after_wrap() {
    let mut store = RecordStore::new(3).unwrap();
    for i in 0..1_000 {
        store.append("y".repeat(i % 5 + 1) + "\n");
    }

    for (index, record) in store.iter().enumerate() {
        for offset in 0..record.len() {
            let flat = store.resolve(index, offset).unwrap();
            let pos = store.find_entry(flat).unwrap();
            assert_eq!((pos.record_index, pos.intra_offset), (index, offset));
        }
    }
}

// ============================================================================
// Device Tests
// ============================================================================

/// Device writers splitting records across writes still install them whole
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_device_handles_concurrently() {
    let device = CharDevice::new(10).unwrap();

    let mut handles = Vec::new();
    for i in 0..10 {
        let device = device.clone();
        handles.push(tokio::spawn(async move {
            let mut handle = device.open();
            // A full record per write; interleaving only happens between records
            handle.write(format!("dev-{i}\n").as_bytes()).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = device.store().snapshot().await.unwrap();
    let lines: HashSet<&[u8]> = snapshot
        .split(|&b| b == b'\n')
        .filter(|l| !l.is_empty())
        .collect();
    assert_eq!(lines.len(), 10);

    let mut reader = device.open();
    reader.seek_to(SeekDirective::new(9, 0)).await.unwrap();
    let last = reader.read(100).await.unwrap();
    assert!(last.starts_with(b"dev-"));
    assert!(last.ends_with(b"\n"));
}
