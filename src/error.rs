// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Error taxonomy for the channel subsystem.

use std::io;

use thiserror::Error;

use crate::id::ObjectId;

/// Errors surfaced by channel registration, the four-phase protocol, and
/// the relay.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The operation referenced an object id with no registered channel.
    #[error("channel not registered: {0}")]
    NotFound(ObjectId),

    /// Protocol misuse: double role registration, release without acquire,
    /// acquire while an acquire is already in flight.
    #[error("invalid channel operation: {0}")]
    Invalid(String),

    /// The payload does not fit the allocated region, or sizes disagree.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The region's error flag is set, or an OS primitive failed. Sticky:
    /// once a channel reports this, it stays unusable until re-registered
    /// on a fresh region.
    #[error("channel io error: {0}")]
    Io(io::Error),

    /// The platform has no named semaphores / shared memory.
    #[error("mutable object channels are not supported on this platform")]
    NotImplemented,
}

impl ChannelError {
    /// Shorthand for the sticky error-flag case.
    pub(crate) fn channel_failed() -> Self {
        ChannelError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "channel is in error state",
        ))
    }
}

impl From<io::Error> for ChannelError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::Unsupported {
            ChannelError::NotImplemented
        } else {
            ChannelError::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
