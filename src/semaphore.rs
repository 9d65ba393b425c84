// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Cross-platform named inter-process semaphore.
// Delegates to platform::PlatformSemaphore.

use std::io;

use crate::platform::PlatformSemaphore;

/// A named, inter-process counting semaphore.
///
/// On POSIX this is a kernel `sem_t` addressed by name. The handle closes
/// on drop; the name lives until [`NamedSemaphore::unlink`].
#[derive(Debug)]
pub struct NamedSemaphore {
    inner: PlatformSemaphore,
}

impl NamedSemaphore {
    /// Exclusively create a named semaphore with initial value `value`.
    pub fn create(name: &str, value: u32) -> io::Result<Self> {
        let inner = PlatformSemaphore::create(name, value)?;
        Ok(Self { inner })
    }

    /// Open an existing named semaphore.
    pub fn open(name: &str) -> io::Result<Self> {
        let inner = PlatformSemaphore::open(name)?;
        Ok(Self { inner })
    }

    /// Decrement, blocking until the value is positive.
    pub fn wait(&self) -> io::Result<()> {
        self.inner.wait()
    }

    /// Decrement without blocking; `Ok(false)` when the value is 0.
    pub fn try_wait(&self) -> io::Result<bool> {
        self.inner.try_wait()
    }

    /// Increment, waking one waiter.
    pub fn post(&self) -> io::Result<()> {
        self.inner.post()
    }

    /// The name this handle was opened with.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Remove a semaphore name from the system (static helper). Open
    /// handles keep the kernel object alive until they close.
    pub fn unlink(name: &str) {
        PlatformSemaphore::unlink(name);
    }
}

/// The two semaphores coordinating one shared region: `header_sem`
/// serializes header mutation, `object_sem` is the readers-pending
/// rendezvous the writer blocks on.
#[derive(Debug)]
pub struct SemaphorePair {
    pub object_sem: NamedSemaphore,
    pub header_sem: NamedSemaphore,
}
