// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The object header: an in-place state machine at offset 0 of every
// mutable region, visible to all processes that map it. Carries the
// version counter, the outstanding-reader count for the current version,
// the published payload sizes, a sticky error flag, and the tri-state
// atomic that elects one process to create the region's semaphores.
//
// All cross-process coordination flows through the two named semaphores
// plus `semaphores_created`. Header fields are only mutated while holding
// `header_sem`; the one exception is the error flag, which teardown sets
// from outside the protocol and every waiter re-checks on wake.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::backoff::adaptive_yield;
use crate::error::{ChannelError, Result};
use crate::semaphore::{NamedSemaphore, SemaphorePair};

/// Capacity of the `unique_name` field, including the NUL terminator.
pub const UNIQUE_NAME_CAP: usize = 32;

/// Sentinel for an unbounded (broadcast) readership.
pub const BROADCAST_READERS: i64 = -1;

// Creation-level values for `semaphores_created`.
const SEM_UNINITIALIZED: u32 = 0;
const SEM_INITIALIZING: u32 = 1;
const SEM_DONE: u32 = 2;

/// Shared-memory-resident metadata at offset 0 of a mutable region.
///
/// A fresh region must be zero-filled (fresh `shm_open` + `ftruncate`
/// memory is); all fields then carry their correct initial values:
/// version 0 ("no version yet"), no outstanding readers, no error,
/// semaphores uncreated. The creator writes `unique_name` before sharing
/// the region.
#[repr(C)]
pub struct ObjectHeader {
    unique_name: [u8; UNIQUE_NAME_CAP],
    semaphores_created: AtomicU32,
    version: AtomicU64,
    num_readers: AtomicI64,
    max_readers: AtomicI64,
    data_size: AtomicU64,
    metadata_size: AtomicU64,
    error: AtomicBool,
}

impl ObjectHeader {
    /// The NUL-terminated semaphore base name.
    pub fn unique_name(&self) -> &str {
        let len = self
            .unique_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(UNIQUE_NAME_CAP);
        std::str::from_utf8(&self.unique_name[..len]).unwrap_or("")
    }

    /// Attempt to become the one process that creates the semaphores.
    /// At most one caller per region ever wins.
    pub fn try_elect_semaphore_creator(&self) -> bool {
        self.semaphores_created
            .compare_exchange(
                SEM_UNINITIALIZED,
                SEM_INITIALIZING,
                Ordering::Relaxed,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Publish that both semaphores exist. Release ordering makes every
    /// header write before this call visible to waiters.
    pub fn publish_semaphores_created(&self) {
        self.semaphores_created.store(SEM_DONE, Ordering::Release);
    }

    /// Spin until the creator publishes. Acquire ordering pairs with
    /// [`ObjectHeader::publish_semaphores_created`].
    pub fn wait_semaphores_created(&self) {
        let mut k = 0u32;
        while self.semaphores_created.load(Ordering::Acquire) != SEM_DONE {
            adaptive_yield(&mut k);
        }
    }

    /// Whether the sticky error flag is set.
    pub fn has_error(&self) -> bool {
        self.error.load(Ordering::Acquire)
    }

    /// Current version; 0 means nothing has been published yet.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Size of the currently published data payload.
    pub fn data_size(&self) -> u64 {
        self.data_size.load(Ordering::Acquire)
    }

    /// Size of the currently published metadata payload.
    pub fn metadata_size(&self) -> u64 {
        self.metadata_size.load(Ordering::Acquire)
    }

    /// Reader budget declared for the current version; `-1` is broadcast.
    pub fn max_readers(&self) -> i64 {
        self.max_readers.load(Ordering::Acquire)
    }

    /// Take `sem`, then re-check the error flag. On error the semaphore
    /// is re-posted (so the next waiter also wakes and observes the flag)
    /// and the call fails.
    fn try_acquire(&self, sem: &NamedSemaphore) -> Result<()> {
        sem.wait()?;
        if self.has_error() {
            let _ = sem.post();
            return Err(ChannelError::channel_failed());
        }
        Ok(())
    }

    /// Begin publishing a new version.
    ///
    /// Blocks until every acknowledgement owed for the previous version
    /// has arrived. On return the caller owns the buffer exclusively: no
    /// reader can observe it until [`ObjectHeader::write_release`]
    /// advances the version.
    pub fn write_acquire(
        &self,
        sem: &SemaphorePair,
        data_size: u64,
        metadata_size: u64,
        num_readers: i64,
    ) -> Result<()> {
        self.try_acquire(&sem.header_sem)?;

        if self.num_readers.load(Ordering::Acquire) != 0 {
            // The previous version still has outstanding readers. Park on
            // object_sem; the last reader to release re-posts it.
            sem.header_sem.post()?;
            self.try_acquire(&sem.object_sem)?;
            self.try_acquire(&sem.header_sem)?;
        }

        self.data_size.store(data_size, Ordering::Release);
        self.metadata_size.store(metadata_size, Ordering::Release);
        self.max_readers.store(num_readers, Ordering::Release);
        // A broadcast version owes no acknowledgements.
        let owed = if num_readers == BROADCAST_READERS {
            0
        } else {
            num_readers
        };
        self.num_readers.store(owed, Ordering::Release);

        sem.header_sem.post()?;
        Ok(())
    }

    /// Publish the version written since the matching
    /// [`ObjectHeader::write_acquire`].
    pub fn write_release(&self, sem: &SemaphorePair) -> Result<()> {
        self.try_acquire(&sem.header_sem)?;

        self.version.fetch_add(1, Ordering::AcqRel);

        // Drain object_sem to 0; the last reader's release re-posts it.
        // It may already be 0 when write_acquire consumed the previous
        // post, hence the non-blocking take.
        let _ = sem.object_sem.try_wait()?;
        if self.num_readers.load(Ordering::Acquire) == 0 {
            // No acknowledgements owed (broadcast or zero readers):
            // the next write_acquire must not block.
            sem.object_sem.post()?;
        }

        sem.header_sem.post()?;
        Ok(())
    }

    /// Block until a version `>= min_version` is published, then return
    /// the version observed. The caller must follow up with
    /// [`ObjectHeader::read_release`] carrying the same version.
    pub fn read_acquire(&self, sem: &SemaphorePair, min_version: u64) -> Result<u64> {
        self.try_acquire(&sem.header_sem)?;

        let mut k = 0u32;
        while self.version.load(Ordering::Acquire) < min_version {
            sem.header_sem.post()?;
            adaptive_yield(&mut k);
            self.try_acquire(&sem.header_sem)?;
        }

        let observed = self.version.load(Ordering::Acquire);
        sem.header_sem.post()?;
        Ok(observed)
    }

    /// Acknowledge the version returned by the matching
    /// [`ObjectHeader::read_acquire`]. The last acknowledgement of a
    /// bounded version unparks a writer waiting in `write_acquire`.
    pub fn read_release(&self, sem: &SemaphorePair, read_version: u64) -> Result<()> {
        self.try_acquire(&sem.header_sem)?;

        debug_assert!(self.version.load(Ordering::Acquire) >= read_version);
        if self.max_readers.load(Ordering::Acquire) != BROADCAST_READERS {
            let remaining = self.num_readers.fetch_sub(1, Ordering::AcqRel) - 1;
            if remaining == 0 {
                sem.object_sem.post()?;
            }
        }

        sem.header_sem.post()?;
        Ok(())
    }

    /// Set the sticky error flag and unblock everyone stuck inside the
    /// protocol. Each woken waiter observes the flag, re-posts the
    /// semaphore it woke on, and returns an I/O error, so one post per
    /// semaphore is enough to drain any number of waiters.
    pub fn set_error(&self, sem: &SemaphorePair) {
        self.error.store(true, Ordering::Release);
        let _ = sem.object_sem.post();
        let _ = sem.header_sem.post();
    }
}
