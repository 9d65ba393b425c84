// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_writer <versions> <payload_size> <interval_ms>
//
// Two processes share one mutable object channel. The writer publishes
// <versions> versions of a <payload_size>-byte payload, one every
// <interval_ms> milliseconds, each declared for a single reader. Start
// the writer first (it clears stale storage), then demo_reader.
// Ctrl-C / SIGTERM stops the loop between publishes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use objchan::{ChannelManager, ChannelRole, ObjectId, ObjectStore, SharedMemoryStore};

const DEMO_CAPACITY: u64 = 1 << 20;

fn demo_object_id() -> ObjectId {
    ObjectId::from_bytes(*b"objchan-demo-001")
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: demo_writer <versions> <payload_size> <interval_ms>");
        std::process::exit(1);
    }
    let versions: u64 = args[1].parse().expect("versions");
    let payload_size: usize = args[2].parse().expect("payload_size");
    let interval: u64 = args[3].parse().expect("interval_ms");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        on_termination(move || q.store(true, Ordering::Release));
    }

    let object_id = demo_object_id();
    SharedMemoryStore::clear_storage(&object_id);

    let store = SharedMemoryStore::new(DEMO_CAPACITY);
    let region = store.get_mutable_object(&object_id).expect("region");
    let manager = ChannelManager::new();
    manager
        .register_channel(object_id, region, ChannelRole::Writer)
        .expect("register writer");

    println!("writer: publishing {versions} versions of {payload_size} bytes");
    for v in 1..=versions {
        if quit.load(Ordering::Acquire) {
            println!("writer: interrupted");
            break;
        }
        let metadata = v.to_le_bytes();
        let mut guard = manager
            .write_acquire(
                object_id,
                payload_size as u64,
                Some(&metadata),
                metadata.len() as u64,
                1,
            )
            .expect("write_acquire");
        guard.data_mut().fill((v % 251) as u8);
        guard.release().expect("write_release");
        println!("writer: published version {v}");
        thread::sleep(Duration::from_millis(interval));
    }
    println!("writer: done");
}

// Minimal signal hook: runs `f` on SIGINT / SIGTERM so the publish loop
// can wind down between versions.
fn on_termination(f: impl Fn() + Send + 'static) {
    #[cfg(unix)]
    {
        use std::sync::{Mutex, OnceLock};
        static CB: OnceLock<Mutex<Box<dyn Fn() + Send>>> = OnceLock::new();
        CB.get_or_init(|| Mutex::new(Box::new(f)));
        extern "C" fn handler(_: libc::c_int) {
            if let Some(cb) = CB.get() {
                if let Ok(g) = cb.lock() {
                    g();
                }
            }
        }
        unsafe {
            libc::signal(libc::SIGINT, handler as *const () as libc::sighandler_t);
            libc::signal(libc::SIGTERM, handler as *const () as libc::sighandler_t);
        }
    }
    #[cfg(not(unix))]
    {
        // Ctrl-C simply terminates the process elsewhere.
        let _ = f;
    }
}
