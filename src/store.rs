// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The object store seam. The surrounding runtime supplies mutable regions
// given an object id; `SharedMemoryStore` is a self-contained POSIX-shm
// implementation used by the relay, the demos, and the tests.

use std::sync::Arc;

use crate::error::Result;
use crate::id::ObjectId;
use crate::names;
use crate::region::MutableRegion;
use crate::shm::{ShmHandle, ShmOpenMode};

/// Supplies a mutable region for an object id. The region's lifetime must
/// outlast every channel referencing it; the store is responsible for
/// eventual unmapping.
pub trait ObjectStore: Send + Sync {
    fn get_mutable_object(&self, object_id: &ObjectId) -> Result<MutableRegion>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for Arc<S> {
    fn get_mutable_object(&self, object_id: &ObjectId) -> Result<MutableRegion> {
        (**self).get_mutable_object(object_id)
    }
}

/// An object store backed by named POSIX shared memory, one segment per
/// object id. Every process resolving the same id maps the same segment;
/// the first to touch it creates, zero-fills, and stamps the header's
/// semaphore base name.
pub struct SharedMemoryStore {
    /// Buffer capacity of each region this store hands out.
    capacity: u64,
}

impl SharedMemoryStore {
    pub fn new(capacity: u64) -> Self {
        Self { capacity }
    }

    /// Remove the backing segment for an object id, e.g. between test
    /// runs. Processes still mapping it are unaffected.
    pub fn clear_storage(object_id: &ObjectId) {
        ShmHandle::clear_storage(&names::region_shm_name(object_id));
    }
}

impl ObjectStore for SharedMemoryStore {
    fn get_mutable_object(&self, object_id: &ObjectId) -> Result<MutableRegion> {
        let name = names::region_shm_name(object_id);
        let size = MutableRegion::required_size(self.capacity);
        let shm = ShmHandle::acquire(&name, size, ShmOpenMode::CreateOrOpen)?;
        let region = MutableRegion::from_shm(shm, self.capacity)?;
        if region.is_creator() {
            // Fresh segments are zero-filled, which is exactly the
            // header's initial state; only the name needs stamping.
            region.init_unique_name(&names::unique_object_name(object_id));
        }
        Ok(region)
    }
}
