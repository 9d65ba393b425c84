// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Per-process registry mapping object ids to their opened semaphore
// pairs. The first process to touch a region wins a one-shot election
// through the header's creation-level atomic and creates both named
// semaphores; every other process waits for the publication and opens
// them by name.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::error::Result;
use crate::header::ObjectHeader;
use crate::id::ObjectId;
use crate::names;
use crate::semaphore::{NamedSemaphore, SemaphorePair};

#[derive(Default)]
pub struct SemaphoreRegistry {
    map: Mutex<HashMap<ObjectId, Arc<SemaphorePair>>>,
}

impl SemaphoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) the semaphore pair for a region and record it.
    /// Idempotent per object id within this process.
    pub fn open(&self, object_id: &ObjectId, header: &ObjectHeader) -> Result<Arc<SemaphorePair>> {
        let mut map = self.map.lock();
        if let Some(pair) = map.get(object_id) {
            return Ok(Arc::clone(pair));
        }

        let unique_name = header.unique_name().to_string();
        let object_name = names::object_sem_name(&unique_name);
        let header_name = names::header_sem_name(&unique_name);

        let pair = if header.try_elect_semaphore_creator() {
            // Unlink any stale semaphores left behind by a crashed run
            // before creating fresh ones at value 1.
            NamedSemaphore::unlink(&object_name);
            NamedSemaphore::unlink(&header_name);
            let object_sem = NamedSemaphore::create(&object_name, 1)?;
            let header_sem = NamedSemaphore::create(&header_name, 1)?;
            header.publish_semaphores_created();
            debug!("created semaphores for {object_id}: {object_name} {header_name}");
            SemaphorePair {
                object_sem,
                header_sem,
            }
        } else {
            header.wait_semaphores_created();
            SemaphorePair {
                object_sem: NamedSemaphore::open(&object_name)?,
                header_sem: NamedSemaphore::open(&header_name)?,
            }
        };

        let pair = Arc::new(pair);
        map.insert(*object_id, Arc::clone(&pair));
        Ok(pair)
    }

    /// The pair recorded for an object id, if any.
    pub fn get(&self, object_id: &ObjectId) -> Option<Arc<SemaphorePair>> {
        self.map.lock().get(object_id).cloned()
    }

    /// Close this process's handles and unlink both names. Unlinking only
    /// removes the names; other processes still holding open handles keep
    /// the kernel objects alive until they close.
    pub fn destroy(&self, object_id: &ObjectId) {
        let removed = self.map.lock().remove(object_id);
        if let Some(pair) = removed {
            NamedSemaphore::unlink(pair.object_sem.name());
            NamedSemaphore::unlink(pair.header_sem.name());
            // Dropping the last Arc closes both handles.
        }
    }

    /// Ids of every pair currently recorded.
    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.map.lock().keys().copied().collect()
    }
}
