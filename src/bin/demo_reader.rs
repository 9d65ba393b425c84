// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Usage:
//   demo_reader <versions>
//
// Counterpart of demo_writer: attaches to the shared channel as the
// reader and prints each observed version until it has seen <versions>
// of them. Ctrl-C / SIGTERM stops the loop between reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use objchan::{ChannelManager, ChannelRole, ObjectId, ObjectStore, SharedMemoryStore};

const DEMO_CAPACITY: u64 = 1 << 20;

fn demo_object_id() -> ObjectId {
    ObjectId::from_bytes(*b"objchan-demo-001")
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("usage: demo_reader <versions>");
        std::process::exit(1);
    }
    let versions: u64 = args[1].parse().expect("versions");

    let quit = Arc::new(AtomicBool::new(false));
    {
        let q = Arc::clone(&quit);
        on_termination(move || q.store(true, Ordering::Release));
    }

    let object_id = demo_object_id();
    let store = SharedMemoryStore::new(DEMO_CAPACITY);
    let region = store.get_mutable_object(&object_id).expect("region");
    let manager = ChannelManager::new();
    manager
        .register_channel(object_id, region, ChannelRole::Reader)
        .expect("register reader");

    for _ in 0..versions {
        if quit.load(Ordering::Acquire) {
            println!("reader: interrupted");
            break;
        }
        let guard = manager.read_acquire(object_id).expect("read_acquire");
        let seq = u64::from_le_bytes(guard.metadata().try_into().expect("metadata"));
        println!(
            "reader: version {} ({} bytes, first byte {}, seq {seq})",
            guard.version(),
            guard.data().len(),
            guard.data().first().copied().unwrap_or(0)
        );
        guard.release().expect("read_release");
    }
    println!("reader: done");
}

// Minimal signal hook: runs `f` on SIGINT / SIGTERM so the read loop can
// wind down between versions.
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
