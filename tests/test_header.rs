// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Header protocol tests: version ordering, broadcast, the sticky error
// flag, and unblocking waiters at teardown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use objchan::{
    ChannelError, MutableRegion, ObjectId, ObjectStore, SemaphoreRegistry, SemaphorePair,
    SharedMemoryStore, BROADCAST_READERS,
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_object_id() -> ObjectId {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() as u64;
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&pid.to_le_bytes());
    bytes[8..16].copy_from_slice(&n.to_le_bytes());
    bytes[7] = b'h';
    ObjectId::from_bytes(bytes)
}

fn fresh_region(capacity: u64) -> (ObjectId, MutableRegion, Arc<SemaphorePair>) {
    let object_id = test_object_id();
    SharedMemoryStore::clear_storage(&object_id);
    let store = SharedMemoryStore::new(capacity);
    let region = store.get_mutable_object(&object_id).expect("region");
    let registry = SemaphoreRegistry::new();
    let sem = registry.open(&object_id, region.header()).expect("open sems");
    (object_id, region, sem)
}

#[test]
fn versions_are_strictly_increasing() {
    let (_id, region, sem) = fresh_region(128);
    let header = region.header();
    assert_eq!(header.version(), 0);

    let mut last_read = 0u64;
    for round in 1..=3u64 {
        header.write_acquire(&sem, 8, 0, 1).expect("write_acquire");
        header.write_release(&sem).expect("write_release");

        let observed = header.read_acquire(&sem, last_read + 1).expect("read_acquire");
        assert!(observed > last_read);
        assert_eq!(observed, round);
        header.read_release(&sem, observed).expect("read_release");
        last_read = observed;
    }
}

#[test]
fn broadcast_publishes_without_waiting() {
    let (_id, region, sem) = fresh_region(128);
    let header = region.header();

    // Two versions, no reader acknowledges either.
    for _ in 0..2 {
        header
            .write_acquire(&sem, 4, 0, BROADCAST_READERS)
            .expect("write_acquire");
        header.write_release(&sem).expect("write_release");
    }

    // A reader arriving late observes the newest version.
    let observed = header.read_acquire(&sem, 1).expect("read_acquire");
    assert_eq!(observed, 2);
    header.read_release(&sem, observed).expect("read_release");

    // And the writer is still not blocked.
    header
        .write_acquire(&sem, 4, 0, BROADCAST_READERS)
        .expect("write_acquire after broadcast reads");
    header.write_release(&sem).expect("write_release");
}

#[test]
fn error_is_sticky() {
    let (_id, region, sem) = fresh_region(128);
    let header = region.header();

    header.write_acquire(&sem, 4, 0, 1).expect("write_acquire");
    header.set_error(&sem);

    // Every protocol operation now fails, including the release of the
    // in-flight write, and keeps failing.
    assert!(matches!(
        header.write_release(&sem),
        Err(ChannelError::Io(_))
    ));
    assert!(matches!(
        header.write_release(&sem),
        Err(ChannelError::Io(_))
    ));
    assert!(matches!(
        header.write_acquire(&sem, 4, 0, 1),
        Err(ChannelError::Io(_))
    ));
    assert!(matches!(
        header.read_acquire(&sem, 1),
        Err(ChannelError::Io(_))
    ));
    assert!(header.has_error());
}

#[test]
fn set_error_unblocks_waiting_reader() {
    let (_id, region, sem) = fresh_region(128);

    let region = Arc::new(region);
    let r = Arc::clone(&region);
    let s = Arc::clone(&sem);
    let reader = thread::spawn(move || r.header().read_acquire(&s, 1));

    // Give the reader time to park in its wait loop.
    thread::sleep(Duration::from_millis(50));
    region.header().set_error(&sem);

    let result = reader.join().expect("join");
    assert!(matches!(result, Err(ChannelError::Io(_))));
}

#[test]
fn set_error_unblocks_waiting_writer() {
    let (_id, region, sem) = fresh_region(128);
    let header = region.header();

    // Publish a version owing one acknowledgement, never acknowledge it.
    header.write_acquire(&sem, 4, 0, 1).expect("write_acquire");
    header.write_release(&sem).expect("write_release");

    let region = Arc::new(region);
    let r = Arc::clone(&region);
    let s = Arc::clone(&sem);
    let writer = thread::spawn(move || r.header().write_acquire(&s, 4, 0, 1));

    thread::sleep(Duration::from_millis(50));
    region.header().set_error(&sem);

    let result = writer.join().expect("join");
    assert!(matches!(result, Err(ChannelError::Io(_))));
}

#[test]
fn unique_name_round_trips() {
    let (object_id, region, _sem) = fresh_region(128);
    let expected = objchan::names::unique_object_name(&object_id);
    assert_eq!(region.header().unique_name(), expected);
}
