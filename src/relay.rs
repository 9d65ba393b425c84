// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-node relay: makes a locally written mutable object visible on a
// remote node. For every writer-side channel the relay runs a pump
// thread that reads each published version locally and pushes it to the
// peer over RPC; on the peer, the handlers republish received versions
// into a local shadow channel.
//
// One pump thread per channel: the reader side of the protocol blocks on
// a semaphore, so multiplexing channels onto one thread would risk
// head-of-line blocking. Backpressure falls out of the channel semantics
// themselves: the next pump iteration can only acquire once the writer
// publishes a new version.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::error::{ChannelError, Result};
use crate::id::{NodeId, ObjectId};
use crate::manager::{ChannelManager, ChannelRole};
use crate::rpc::{
    MutableObjectPusher, PushMutableObjectRequest, PusherFactory, RegisterMutableObjectRequest,
};
use crate::store::ObjectStore;

/// Peer-side bookkeeping for one remote writer channel.
#[derive(Clone)]
struct LocalInfo {
    num_readers: i64,
    local_object_id: ObjectId,
}

/// Coordinates the transfer of mutable objects between nodes: pushes
/// locally written versions to remote readers and republishes versions
/// received from remote writers.
pub struct MutableObjectRelay {
    manager: Arc<ChannelManager>,
    store: Arc<dyn ObjectStore>,
    pusher_factory: PusherFactory,
    /// Maps the remote writer's object id to the local shadow channel it
    /// feeds.
    cross_node_map: Mutex<HashMap<ObjectId, LocalInfo>>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
}

impl MutableObjectRelay {
    pub fn new(store: Arc<dyn ObjectStore>, pusher_factory: PusherFactory) -> Self {
        Self {
            manager: Arc::new(ChannelManager::new()),
            store,
            pusher_factory,
            cross_node_map: Mutex::new(HashMap::new()),
            pumps: Mutex::new(Vec::new()),
        }
    }

    /// The channel manager backing this relay. Local writers and readers
    /// register and operate through it.
    pub fn manager(&self) -> &Arc<ChannelManager> {
        &self.manager
    }

    /// Start forwarding `object_id` to `node_id`: the relay registers as
    /// a local reader of the channel and pumps every version it observes
    /// to the peer.
    pub fn register_writer_channel(&self, object_id: ObjectId, node_id: &NodeId) -> Result<()> {
        let region = self.store.get_mutable_object(&object_id)?;
        self.manager
            .register_channel(object_id, region, ChannelRole::Reader)?;

        let pusher = (self.pusher_factory)(node_id);
        let manager = Arc::clone(&self.manager);
        let handle = std::thread::Builder::new()
            .name(format!("objchan-pump-{object_id}"))
            .spawn(move || poll_writer(manager, object_id, pusher))?;
        self.pumps.lock().push(handle);
        info!("pumping {object_id} to node {node_id}");
        Ok(())
    }

    /// Register a channel local consumers read from.
    pub fn register_reader_channel(&self, object_id: ObjectId) -> Result<()> {
        let region = self.store.get_mutable_object(&object_id)?;
        self.manager
            .register_channel(object_id, region, ChannelRole::Reader)
    }

    /// Peer-side endpoint: a remote node announces it will push versions
    /// of `writer_object_id` here, to be republished under
    /// `reader_object_id` for `num_readers` local readers.
    ///
    /// The shadow channel carries both roles: the handler writes into it,
    /// local consumers read from it.
    pub fn handle_register_mutable_object(
        &self,
        request: &RegisterMutableObjectRequest,
    ) -> Result<()> {
        let RegisterMutableObjectRequest {
            writer_object_id,
            num_readers,
            reader_object_id,
        } = *request;
        {
            let mut map = self.cross_node_map.lock();
            if map.contains_key(&writer_object_id) {
                return Err(ChannelError::Invalid(format!(
                    "remote object {writer_object_id} is already registered"
                )));
            }
            map.insert(
                writer_object_id,
                LocalInfo {
                    num_readers,
                    local_object_id: reader_object_id,
                },
            );
        }
        self.register_reader_channel(reader_object_id)?;
        let region = self.store.get_mutable_object(&reader_object_id)?;
        self.manager
            .register_channel(reader_object_id, region, ChannelRole::Writer)
    }

    /// Peer-side endpoint: a version arrived over the wire; republish it
    /// into the shadow channel.
    pub fn handle_push_mutable_object(&self, request: &PushMutableObjectRequest) -> Result<()> {
        let info = self
            .cross_node_map
            .lock()
            .get(&request.writer_object_id)
            .cloned()
            .ok_or(ChannelError::NotFound(request.writer_object_id))?;

        let total_size = request.data_size + request.metadata_size;
        if request.payload.len() as u64 != total_size {
            return Err(ChannelError::InvalidArgument(format!(
                "payload is {} bytes but data_size ({}) + metadata_size ({}) is {total_size}",
                request.payload.len(),
                request.data_size,
                request.metadata_size
            )));
        }

        let (data, metadata) = request.payload.split_at(request.data_size as usize);
        let mut guard = self.manager.write_acquire(
            info.local_object_id,
            request.data_size,
            Some(metadata),
            request.metadata_size,
            info.num_readers,
        )?;
        guard.data_mut().copy_from_slice(data);
        guard.release()
    }
}

impl Drop for MutableObjectRelay {
    fn drop(&mut self) {
        // Failing every channel unparks the pumps, which then observe the
        // error state and exit.
        let _ = self.manager.set_error_all();
        for handle in self.pumps.lock().drain(..) {
            if handle.join().is_err() {
                warn!("a relay pump thread panicked");
            }
        }
        info!("relay stopped");
    }
}

/// One pump: observe a version, push it to the peer, acknowledge, repeat.
/// An io error from the channel means the process is tearing down.
fn poll_writer(manager: Arc<ChannelManager>, object_id: ObjectId, pusher: Arc<dyn MutableObjectPusher>) {
    loop {
        let guard = match manager.read_acquire(object_id) {
            Ok(guard) => guard,
            Err(ChannelError::Io(_)) => {
                debug!("pump for {object_id} shutting down");
                return;
            }
            Err(e) => {
                // Anything else is a wiring mistake, not a runtime state.
                panic!("pump for {object_id} hit unexpected error: {e}");
            }
        };

        let data_size = guard.data().len() as u64;
        let metadata_size = guard.metadata().len() as u64;
        let mut payload = Vec::with_capacity((data_size + metadata_size) as usize);
        payload.extend_from_slice(guard.data());
        payload.extend_from_slice(guard.metadata());

        let request = PushMutableObjectRequest {
            writer_object_id: object_id,
            data_size,
            metadata_size,
            payload,
        };
        if let Err(e) = pusher.push_mutable_object(request) {
            // The next version supersedes the failed one; nothing to
            // retry.
            warn!("push of {object_id} v{} failed: {e}", guard.version());
        }

        match guard.release() {
            Ok(()) => {}
            Err(ChannelError::Io(_)) => {
                debug!("pump for {object_id} shutting down");
                return;
            }
            Err(e) => panic!("pump for {object_id} hit unexpected error: {e}"),
        }
    }
}
