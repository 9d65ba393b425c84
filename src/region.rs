// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// A mutable region: `[ObjectHeader | buffer]` inside one shared memory
// segment. The object store creates regions and hands exclusive handles
// to the channel manager; the mapping stays alive for the lifetime of the
// handle.

use std::io;
use std::mem;

use crate::header::ObjectHeader;
use crate::shm::ShmHandle;

/// An exclusively-owned handle to one mutable shared-memory region.
#[derive(Debug)]
pub struct MutableRegion {
    shm: ShmHandle,
    allocated_size: u64,
}

impl MutableRegion {
    /// Size of the shm segment needed for a buffer of `allocated_size`
    /// bytes plus the leading header.
    pub fn required_size(allocated_size: u64) -> usize {
        mem::size_of::<ObjectHeader>() + allocated_size as usize
    }

    /// Wrap a mapped segment. The segment must hold at least an
    /// [`ObjectHeader`] followed by `allocated_size` buffer bytes.
    pub fn from_shm(shm: ShmHandle, allocated_size: u64) -> io::Result<Self> {
        if shm.user_size() < Self::required_size(allocated_size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "segment of {} bytes cannot hold a header plus {} buffer bytes",
                    shm.user_size(),
                    allocated_size
                ),
            ));
        }
        Ok(Self {
            shm,
            allocated_size,
        })
    }

    /// Stamp the semaphore base name into a freshly zeroed header. Must
    /// run before the region is shared with other parties.
    ///
    /// # Panics
    /// Panics when `unique_name` does not fit the header field. Callers
    /// derive the name from the object id, so this is a programming
    /// error.
    pub fn init_unique_name(&self, unique_name: &str) {
        let bytes = unique_name.as_bytes();
        assert!(
            bytes.len() < crate::header::UNIQUE_NAME_CAP,
            "unique name {unique_name:?} exceeds {} bytes",
            crate::header::UNIQUE_NAME_CAP - 1
        );
        // The name field sits at offset 0 of the header, which sits at
        // offset 0 of the segment.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.shm.as_mut_ptr(), bytes.len());
        }
    }

    /// The header at offset 0, shared with every process mapping the
    /// region.
    pub fn header(&self) -> &ObjectHeader {
        // The mapping outlives the returned reference (it is tied to
        // &self) and all header fields are atomics.
        unsafe { &*(self.shm.as_ptr() as *const ObjectHeader) }
    }

    /// Start of the data buffer, immediately after the header.
    pub fn buffer_ptr(&self) -> *mut u8 {
        unsafe { self.shm.as_mut_ptr().add(mem::size_of::<ObjectHeader>()) }
    }

    /// Capacity of the data buffer.
    pub fn allocated_size(&self) -> u64 {
        self.allocated_size
    }

    /// Whether this handle created the underlying segment.
    pub fn is_creator(&self) -> bool {
        self.shm.is_creator()
    }
}
