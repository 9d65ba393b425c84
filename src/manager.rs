// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-process channel registry and the public four-phase API.
//
// The manager owns one `Channel` per registered object id and the
// process's semaphore registry. The map lock only guards the map; the
// per-channel state machines rely on the header protocol plus a
// process-local reader gate that serializes this process's readers (two
// threads observing the same version would otherwise each consume an
// acknowledgement slot without coordinating `next_version_to_read`).
//
// `write_acquire` / `read_acquire` return scoped guards whose lifetimes
// bound the validity of the buffer views they expose; `release()` is the
// paired protocol call, and dropping a guard releases best-effort.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::error::{ChannelError, Result};
use crate::id::ObjectId;
use crate::region::MutableRegion;
use crate::registry::SemaphoreRegistry;
use crate::semaphore::SemaphorePair;

/// Which side of a channel a registration claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Writer,
    Reader,
}

/// State owned by the single local reader, protected by the reader gate.
#[derive(Debug)]
struct ReaderState {
    /// The minimum version the next read is willing to observe; starts
    /// at 1 and only grows.
    next_version_to_read: u64,
}

/// Per-process registration of one mutable region.
#[derive(Debug)]
struct Channel {
    region: MutableRegion,
    reader_registered: AtomicBool,
    writer_registered: AtomicBool,
    /// True between a successful write_acquire and its release.
    written: AtomicBool,
    reader_gate: Arc<Mutex<ReaderState>>,
}

impl Channel {
    fn new(region: MutableRegion) -> Self {
        Self {
            region,
            reader_registered: AtomicBool::new(false),
            writer_registered: AtomicBool::new(false),
            written: AtomicBool::new(false),
            reader_gate: Arc::new(Mutex::new(ReaderState {
                next_version_to_read: 1,
            })),
        }
    }
}

/// Registry of mutable object channels for this process.
pub struct ChannelManager {
    channels: Mutex<HashMap<ObjectId, Arc<Channel>>>,
    semaphores: SemaphoreRegistry,
    shut_down: AtomicBool,
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelManager {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            semaphores: SemaphoreRegistry::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Register a role on the channel for `object_id`, creating the
    /// channel from `region` if this is the first registration.
    ///
    /// Registering a role that is already held fails with `Invalid`.
    /// Adding the missing role to an existing channel succeeds and drops
    /// the freshly supplied region in favor of the one already held; a
    /// channel may legitimately carry both roles.
    pub fn register_channel(
        &self,
        object_id: ObjectId,
        region: MutableRegion,
        role: ChannelRole,
    ) -> Result<()> {
        let mut channels = self.channels.lock();

        if let Some(channel) = channels.get(&object_id) {
            let flag = match role {
                ChannelRole::Reader => &channel.reader_registered,
                ChannelRole::Writer => &channel.writer_registered,
            };
            if flag.load(Ordering::Acquire) {
                return Err(ChannelError::Invalid(format!(
                    "channel {object_id} already registered as {role:?}"
                )));
            }
            self.semaphores.open(&object_id, channel.region.header())?;
            flag.store(true, Ordering::Release);
            return Ok(());
        }

        self.semaphores.open(&object_id, region.header())?;
        let channel = Channel::new(region);
        match role {
            ChannelRole::Reader => channel.reader_registered.store(true, Ordering::Release),
            ChannelRole::Writer => channel.writer_registered.store(true, Ordering::Release),
        }
        channels.insert(object_id, Arc::new(channel));
        debug!("registered channel {object_id} as {role:?}");
        Ok(())
    }

    fn channel(&self, object_id: &ObjectId) -> Result<Arc<Channel>> {
        self.channels
            .lock()
            .get(object_id)
            .cloned()
            .ok_or(ChannelError::NotFound(*object_id))
    }

    fn semaphores(&self, object_id: &ObjectId) -> Result<Arc<SemaphorePair>> {
        self.semaphores
            .get(object_id)
            .ok_or(ChannelError::NotFound(*object_id))
    }

    /// Begin publishing a version of `data_size` data bytes plus
    /// `metadata_size` metadata bytes for `num_readers` readers
    /// (`-1` broadcasts without waiting for acknowledgements).
    ///
    /// Blocks until the previous version's readers have all released.
    /// When `metadata` is given it is copied into the metadata portion of
    /// the buffer before the guard is returned, so the caller only fills
    /// the data portion.
    pub fn write_acquire(
        &self,
        object_id: ObjectId,
        data_size: u64,
        metadata: Option<&[u8]>,
        metadata_size: u64,
        num_readers: i64,
    ) -> Result<WriteGuard> {
        let channel = self.channel(&object_id)?;
        if channel.region.header().has_error() {
            return Err(ChannelError::channel_failed());
        }
        if !channel.writer_registered.load(Ordering::Acquire) {
            return Err(ChannelError::Invalid(format!(
                "channel {object_id} has no writer registered"
            )));
        }
        if let Some(md) = metadata {
            if md.len() as u64 != metadata_size {
                return Err(ChannelError::InvalidArgument(format!(
                    "metadata slice is {} bytes but metadata_size is {metadata_size}",
                    md.len()
                )));
            }
        }
        let total_size = data_size + metadata_size;
        if total_size > channel.region.allocated_size() {
            return Err(ChannelError::InvalidArgument(format!(
                "data size ({data_size}) + metadata size ({metadata_size}) exceeds \
                 allocated buffer size ({})",
                channel.region.allocated_size()
            )));
        }
        if channel.written.swap(true, Ordering::AcqRel) {
            return Err(ChannelError::Invalid(format!(
                "channel {object_id} already has a write in flight"
            )));
        }

        let sem = match self.semaphores(&object_id) {
            Ok(sem) => sem,
            Err(e) => {
                channel.written.store(false, Ordering::Release);
                return Err(e);
            }
        };
        if let Err(e) =
            channel
                .region
                .header()
                .write_acquire(&sem, data_size, metadata_size, num_readers)
        {
            channel.written.store(false, Ordering::Release);
            return Err(e);
        }

        if let Some(md) = metadata {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    md.as_ptr(),
                    channel.region.buffer_ptr().add(data_size as usize),
                    md.len(),
                );
            }
        }

        Ok(WriteGuard {
            channel,
            sem,
            data_size,
            released: false,
        })
    }

    /// Block until a version newer than anything this process has read is
    /// published, then return a guard exposing its payload.
    ///
    /// At most one local reader is inside the protocol per channel; the
    /// guard holds the gate until released.
    pub fn read_acquire(&self, object_id: ObjectId) -> Result<ReadGuard> {
        let channel = self.channel(&object_id)?;
        if channel.region.header().has_error() {
            return Err(ChannelError::channel_failed());
        }
        if !channel.reader_registered.load(Ordering::Acquire) {
            return Err(ChannelError::Invalid(format!(
                "channel {object_id} has no reader registered"
            )));
        }
        let sem = self.semaphores(&object_id)?;

        let mut gate = channel.reader_gate.lock_arc();
        // The gate drops (and unlocks) on every early return below.
        let observed = channel
            .region
            .header()
            .read_acquire(&sem, gate.next_version_to_read)?;
        gate.next_version_to_read = observed;

        let header = channel.region.header();
        let data_size = header.data_size();
        let metadata_size = header.metadata_size();
        if data_size + metadata_size > channel.region.allocated_size() {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "published sizes exceed the allocated region",
            )));
        }

        Ok(ReadGuard {
            channel,
            sem,
            gate,
            data_size,
            metadata_size,
            version: observed,
            released: false,
        })
    }

    /// Force the channel into the sticky error state, unblocking every
    /// local and remote party, and drop both local roles.
    pub fn set_error(&self, object_id: &ObjectId) -> Result<()> {
        let channel = self.channel(object_id)?;
        let sem = self.semaphores(object_id)?;
        channel.region.header().set_error(&sem);
        channel.reader_registered.store(false, Ordering::Release);
        channel.writer_registered.store(false, Ordering::Release);
        Ok(())
    }

    /// Set the error state on every registered channel, best-effort.
    /// Returns the first error observed, if any.
    pub fn set_error_all(&self) -> Result<()> {
        let ids: Vec<ObjectId> = self.channels.lock().keys().copied().collect();
        let mut first_err = None;
        for id in ids {
            if let Err(e) = self.set_error(&id) {
                warn!("set_error on {id} failed: {e}");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Tear down every channel: set the error state so all blocked
    /// acquires return, then close and unlink the semaphores. Idempotent;
    /// also runs on drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        for id in self.semaphores.object_ids() {
            // Errors here mean the channel was already failing; the
            // semaphores still need destroying.
            if let Err(e) = self.set_error(&id) {
                debug!("teardown of {id}: {e}");
            }
            self.semaphores.destroy(&id);
        }
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Exclusive access to the data portion of the buffer between
/// `write_acquire` and the version's publication.
#[derive(Debug)]
pub struct WriteGuard {
    channel: Arc<Channel>,
    sem: Arc<SemaphorePair>,
    data_size: u64,
    released: bool,
}

impl WriteGuard {
    /// The writable data slice `[0, data_size)`. Metadata passed to
    /// `write_acquire` is already in place behind it.
    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe {
            std::slice::from_raw_parts_mut(self.channel.region.buffer_ptr(), self.data_size as usize)
        }
    }

    /// Publish the version. Readers can observe it from this point on.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let result = self.channel.region.header().write_release(&self.sem);
        self.channel.written.store(false, Ordering::Release);
        result
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            debug!("write release on drop: {e}");
        }
    }
}

/// A published version's payload, valid until released. Holds the
/// process-local reader gate for its lifetime.
pub struct ReadGuard {
    channel: Arc<Channel>,
    sem: Arc<SemaphorePair>,
    gate: ArcMutexGuard<RawMutex, ReaderState>,
    data_size: u64,
    metadata_size: u64,
    version: u64,
    released: bool,
}

impl ReadGuard {
    /// The data portion of the observed version.
    pub fn data(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(self.channel.region.buffer_ptr(), self.data_size as usize)
        }
    }

    /// The metadata portion of the observed version.
    pub fn metadata(&self) -> &[u8] {
        unsafe {
            std::slice::from_raw_parts(
                self.channel.region.buffer_ptr().add(self.data_size as usize),
                self.metadata_size as usize,
            )
        }
    }

    /// The version this guard observed.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Acknowledge the version. A later `read_acquire` on this channel
    /// only observes strictly newer versions.
    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.channel
            .region
            .header()
            .read_release(&self.sem, self.gate.next_version_to_read)?;
        self.gate.next_version_to_read += 1;
        Ok(())
    }
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        if let Err(e) = self.release_inner() {
            debug!("read release on drop: {e}");
        }
    }
}
