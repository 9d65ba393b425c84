// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel manager tests: registration and roles, the four-phase API
// through the guards, blocking behavior, payload validation, and
// teardown.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use objchan::{
    names, ChannelError, ChannelManager, ChannelRole, NamedSemaphore, ObjectId, ObjectStore,
    SharedMemoryStore, BROADCAST_READERS,
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_object_id() -> ObjectId {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id() as u64;
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&pid.to_le_bytes());
    bytes[8..16].copy_from_slice(&n.to_le_bytes());
    bytes[7] = b'c';
    ObjectId::from_bytes(bytes)
}

/// A manager with one channel registered for both roles, so one process
/// can play writer and reader.
fn fresh_channel(capacity: u64) -> (ObjectId, ChannelManager) {
    let object_id = test_object_id();
    SharedMemoryStore::clear_storage(&object_id);
    let store = SharedMemoryStore::new(capacity);
    let manager = ChannelManager::new();
    let region = store.get_mutable_object(&object_id).expect("region");
    manager
        .register_channel(object_id, region, ChannelRole::Writer)
        .expect("register writer");
    let region = store.get_mutable_object(&object_id).expect("region");
    manager
        .register_channel(object_id, region, ChannelRole::Reader)
        .expect("register reader");
    (object_id, manager)
}

#[test]
fn single_writer_single_reader_three_versions() {
    let (object_id, manager) = fresh_channel(1024);

    let payloads: [&[u8]; 3] = [&[1, 2, 3, 4], &[5, 6, 7, 8], &[9, 10, 11, 12]];
    for (i, payload) in payloads.iter().enumerate() {
        let mut guard = manager
            .write_acquire(object_id, 4, Some(b"m"), 1, 1)
            .expect("write_acquire");
        guard.data_mut().copy_from_slice(payload);
        guard.release().expect("write_release");

        let guard = manager.read_acquire(object_id).expect("read_acquire");
        assert_eq!(guard.version(), (i + 1) as u64);
        assert_eq!(guard.data(), *payload);
        assert_eq!(guard.metadata(), b"m");
        guard.release().expect("read_release");
    }
}

#[test]
fn writer_blocks_on_outstanding_reader() {
    let (object_id, manager) = fresh_channel(1024);
    let manager = Arc::new(manager);

    let mut guard = manager
        .write_acquire(object_id, 4, None, 0, 1)
        .expect("write_acquire v1");
    guard.data_mut().copy_from_slice(&[1, 2, 3, 4]);
    guard.release().expect("write_release v1");

    let read_guard = manager.read_acquire(object_id).expect("read_acquire v1");

    let acquired_v2 = Arc::new(AtomicBool::new(false));
    let m = Arc::clone(&manager);
    let flag = Arc::clone(&acquired_v2);
    let writer = thread::spawn(move || {
        let mut guard = m
            .write_acquire(object_id, 4, None, 0, 1)
            .expect("write_acquire v2");
        flag.store(true, Ordering::SeqCst);
        guard.data_mut().copy_from_slice(&[5, 6, 7, 8]);
        guard.release().expect("write_release v2");
    });

    // With the v1 acknowledgement outstanding, the writer must stay
    // parked.
    thread::sleep(Duration::from_millis(100));
    assert!(!acquired_v2.load(Ordering::SeqCst));

    read_guard.release().expect("read_release v1");

    let start = Instant::now();
    writer.join().expect("join writer");
    assert!(acquired_v2.load(Ordering::SeqCst));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn broadcast_reader_observes_newest_version() {
    let (object_id, manager) = fresh_channel(1024);

    for value in [10u8, 20u8] {
        let mut guard = manager
            .write_acquire(object_id, 4, None, 0, BROADCAST_READERS)
            .expect("write_acquire");
        guard.data_mut().fill(value);
        guard.release().expect("write_release");
    }

    // Missing v1 is permitted; v2 must be what arrives.
    let guard = manager.read_acquire(object_id).expect("read_acquire");
    assert_eq!(guard.version(), 2);
    assert_eq!(guard.data(), &[20, 20, 20, 20]);
    guard.release().expect("read_release");
}

#[test]
fn oversized_payload_is_rejected_and_state_unchanged() {
    let (object_id, manager) = fresh_channel(64);

    let err = manager
        .write_acquire(object_id, 50, Some(&[0u8; 20]), 20, 1)
        .expect_err("payload exceeds region");
    assert!(matches!(err, ChannelError::InvalidArgument(_)));

    // The rejection must not leave the channel in the acquired state.
    let mut guard = manager
        .write_acquire(object_id, 30, Some(&[7u8; 20]), 20, 1)
        .expect("write_acquire within capacity");
    guard.data_mut().fill(1);
    guard.release().expect("write_release");

    let guard = manager.read_acquire(object_id).expect("read_acquire");
    assert_eq!(guard.data(), &[1u8; 30][..]);
    assert_eq!(guard.metadata(), &[7u8; 20][..]);
    guard.release().expect("read_release");
}

#[test]
fn teardown_unblocks_blocked_reader() {
    let (object_id, manager) = fresh_channel(1024);
    let manager = Arc::new(manager);

    let m = Arc::clone(&manager);
    let reader = thread::spawn(move || m.read_acquire(object_id).map(|_| ()));

    // Let the reader park: no version is ever published.
    thread::sleep(Duration::from_millis(50));
    let start = Instant::now();
    manager.shutdown();

    let result = reader.join().expect("join reader");
    assert!(matches!(result, Err(ChannelError::Io(_))));
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn double_role_registration_is_invalid() {
    let object_id = test_object_id();
    SharedMemoryStore::clear_storage(&object_id);
    let store = SharedMemoryStore::new(256);
    let manager = ChannelManager::new();

    let region = store.get_mutable_object(&object_id).expect("region");
    manager
        .register_channel(object_id, region, ChannelRole::Reader)
        .expect("first reader registration");

    let region = store.get_mutable_object(&object_id).expect("region");
    let err = manager
        .register_channel(object_id, region, ChannelRole::Reader)
        .expect_err("second reader registration");
    assert!(matches!(err, ChannelError::Invalid(_)));

    // Adding the other role still works.
    let region = store.get_mutable_object(&object_id).expect("region");
    manager
        .register_channel(object_id, region, ChannelRole::Writer)
        .expect("writer registration");
}

#[test]
fn operations_on_unregistered_channel_fail() {
    let manager = ChannelManager::new();
    let object_id = test_object_id();

    assert!(matches!(
        manager.read_acquire(object_id),
        Err(ChannelError::NotFound(_))
    ));
    assert!(matches!(
        manager.write_acquire(object_id, 4, None, 0, 1),
        Err(ChannelError::NotFound(_))
    ));
    assert!(matches!(
        manager.set_error(&object_id),
        Err(ChannelError::NotFound(_))
    ));
}

#[test]
fn role_is_enforced() {
    let object_id = test_object_id();
    SharedMemoryStore::clear_storage(&object_id);
    let store = SharedMemoryStore::new(256);
    let manager = ChannelManager::new();
    let region = store.get_mutable_object(&object_id).expect("region");
    manager
        .register_channel(object_id, region, ChannelRole::Reader)
        .expect("register reader");

    let err = manager
        .write_acquire(object_id, 4, None, 0, 1)
        .expect_err("writer role not set");
    assert!(matches!(err, ChannelError::Invalid(_)));
}

#[test]
fn second_write_acquire_while_one_is_in_flight_is_invalid() {
    let (object_id, manager) = fresh_channel(1024);

    let _guard = manager
        .write_acquire(object_id, 4, None, 0, BROADCAST_READERS)
        .expect("write_acquire");
    let err = manager
        .write_acquire(object_id, 4, None, 0, BROADCAST_READERS)
        .expect_err("second acquire while in flight");
    assert!(matches!(err, ChannelError::Invalid(_)));
}

#[test]
fn stale_semaphores_from_crashed_run_are_recovered() {
    let object_id = test_object_id();
    SharedMemoryStore::clear_storage(&object_id);

    // Simulate a previous run that crashed while holding both
    // semaphores: the names exist with value 0, so reusing them would
    // park the first acquire forever.
    let unique = names::unique_object_name(&object_id);
    let hdr_name = names::header_sem_name(&unique);
    let obj_name = names::object_sem_name(&unique);
    NamedSemaphore::unlink(&hdr_name);
    NamedSemaphore::unlink(&obj_name);
    drop(NamedSemaphore::create(&hdr_name, 0).expect("stale hdr"));
    drop(NamedSemaphore::create(&obj_name, 0).expect("stale obj"));

    let store = SharedMemoryStore::new(256);
    let manager = ChannelManager::new();
    let region = store.get_mutable_object(&object_id).expect("region");
    manager
        .register_channel(object_id, region, ChannelRole::Writer)
        .expect("register writer");
    let region = store.get_mutable_object(&object_id).expect("region");
    manager
        .register_channel(object_id, region, ChannelRole::Reader)
        .expect("register reader");

    // The first touch must have recreated both semaphores at value 1.
    let mut guard = manager
        .write_acquire(object_id, 4, None, 0, 1)
        .expect("write_acquire after recovery");
    guard.data_mut().copy_from_slice(&[9, 9, 9, 9]);
    guard.release().expect("write_release");

    let guard = manager.read_acquire(object_id).expect("read_acquire");
    assert_eq!(guard.data(), &[9, 9, 9, 9]);
    guard.release().expect("read_release");
}

#[test]
fn set_error_fails_subsequent_operations() {
    let (object_id, manager) = fresh_channel(1024);

    let mut guard = manager
        .write_acquire(object_id, 4, None, 0, 1)
        .expect("write_acquire");
    guard.data_mut().fill(3);
    guard.release().expect("write_release");

    manager.set_error(&object_id).expect("set_error");

    assert!(matches!(
        manager.read_acquire(object_id),
        Err(ChannelError::Io(_))
    ));
    assert!(matches!(
        manager.write_acquire(object_id, 4, None, 0, 1),
        Err(ChannelError::Io(_))
    ));
}
