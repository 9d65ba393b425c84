// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Stub platform layer for targets without POSIX named semaphores and
// shared memory. Every constructor fails with `Unsupported`, which the
// error layer surfaces as `NotImplemented` at the public API boundary.

use std::io;

fn unsupported() -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        "named semaphores and shared memory are not available on this platform",
    )
}

#[derive(Debug)]
pub struct PlatformSemaphore;

impl PlatformSemaphore {
    pub fn create(_name: &str, _value: u32) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn open(_name: &str) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn wait(&self) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn try_wait(&self) -> io::Result<bool> {
        Err(unsupported())
    }

    pub fn post(&self) -> io::Result<()> {
        Err(unsupported())
    }

    pub fn name(&self) -> &str {
        ""
    }

    pub fn unlink(_name: &str) {}
}

/// Open mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

#[derive(Debug)]
pub struct PlatformShm;

impl PlatformShm {
    pub fn acquire(_name: &str, _user_size: usize, _mode: ShmMode) -> io::Result<Self> {
        Err(unsupported())
    }

    pub fn as_ptr(&self) -> *const u8 {
        std::ptr::null()
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        std::ptr::null_mut()
    }

    pub fn visible_len(&self) -> usize {
        0
    }

    pub fn name(&self) -> &str {
        ""
    }

    pub fn created(&self) -> bool {
        false
    }

    pub fn unlink_by_name(_name: &str) {}
}
