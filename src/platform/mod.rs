// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

#[cfg(unix)]
pub mod posix;

#[cfg(not(unix))]
pub mod unsupported;

// Re-export the platform-specific implementations under a uniform name.

#[cfg(unix)]
pub use posix::{PlatformSemaphore, PlatformShm, ShmMode};

#[cfg(not(unix))]
pub use unsupported::{PlatformSemaphore, PlatformShm, ShmMode};
