// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// The wire surface between relays on different nodes. The RPC framework
// itself is an external collaborator: the relay only needs a client it
// can hand a request to and get a reply back from, resolved per peer
// node through a factory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::{NodeId, ObjectId};

/// One observed version pushed to the peer. `payload` is the data bytes
/// immediately followed by the metadata bytes, `data_size +
/// metadata_size` long.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushMutableObjectRequest {
    pub writer_object_id: ObjectId,
    pub data_size: u64,
    pub metadata_size: u64,
    pub payload: Vec<u8>,
}

/// Empty on success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushMutableObjectReply {}

/// Asks the peer to create a shadow channel: versions of
/// `writer_object_id` arriving over the wire are republished under
/// `reader_object_id` for `num_readers` local readers (`-1` broadcasts).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegisterMutableObjectRequest {
    pub writer_object_id: ObjectId,
    pub num_readers: i64,
    pub reader_object_id: ObjectId,
}

/// Client half of the push RPC, one per peer node.
pub trait MutableObjectPusher: Send + Sync {
    fn push_mutable_object(
        &self,
        request: PushMutableObjectRequest,
    ) -> Result<PushMutableObjectReply>;
}

/// Resolves a peer node id to an RPC client.
pub type PusherFactory = Box<dyn Fn(&NodeId) -> Arc<dyn MutableObjectPusher> + Send + Sync>;
