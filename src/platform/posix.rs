// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// POSIX implementation of named semaphores and shared memory.
// Semaphores are kernel-resident `sem_t` objects addressed by name
// (`sem_open`); shared memory is `shm_open` + `mmap`.

use std::ffi::CString;
use std::io;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

use crate::names;

fn cstring(name: &str) -> io::Result<CString> {
    CString::new(name.as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

// ---------------------------------------------------------------------------
// PlatformSemaphore — POSIX named semaphore
// ---------------------------------------------------------------------------

/// A named, kernel-resident counting semaphore.
///
/// The handle closes itself on drop; the name persists until
/// [`PlatformSemaphore::unlink`] removes it.
#[derive(Debug)]
pub struct PlatformSemaphore {
    raw: *mut libc::sem_t,
    name: String,
}

// Safety: sem_t handles may be used from any thread; the kernel object is
// process-shared by design.
unsafe impl Send for PlatformSemaphore {}
unsafe impl Sync for PlatformSemaphore {}

impl PlatformSemaphore {
    /// Exclusively create a named semaphore with the given initial value.
    /// Fails with `AlreadyExists` if the name is taken.
    pub fn create(name: &str, value: u32) -> io::Result<Self> {
        let c_name = cstring(name)?;
        let raw = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o644 as libc::c_uint,
                value as libc::c_uint,
            )
        };
        if raw == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            raw,
            name: name.to_string(),
        })
    }

    /// Open an existing named semaphore.
    pub fn open(name: &str) -> io::Result<Self> {
        let c_name = cstring(name)?;
        let raw = unsafe { libc::sem_open(c_name.as_ptr(), 0) };
        if raw == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            raw,
            name: name.to_string(),
        })
    }

    /// Decrement, blocking until the value is positive. Retries on EINTR.
    pub fn wait(&self) -> io::Result<()> {
        loop {
            let rc = unsafe { libc::sem_wait(self.raw) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                return Err(err);
            }
        }
    }

    /// Decrement without blocking. Returns `Ok(false)` when the value is 0.
    pub fn try_wait(&self) -> io::Result<bool> {
        loop {
            let rc = unsafe { libc::sem_trywait(self.raw) };
            if rc == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }

    /// Increment, waking one waiter.
    pub fn post(&self) -> io::Result<()> {
        let rc = unsafe { libc::sem_post(self.raw) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// The name the semaphore was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove a semaphore name from the system. Open handles keep the
    /// kernel object alive until they close. Missing names are ignored.
    pub fn unlink(name: &str) {
        if let Ok(c_name) = CString::new(name.as_bytes()) {
            unsafe { libc::sem_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformSemaphore {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.raw) };
    }
}

// ---------------------------------------------------------------------------
// PlatformShm — POSIX shared memory
// ---------------------------------------------------------------------------

// Each mapped segment carries a live-mapping counter behind the bytes the
// caller sees. Every process that maps the segment increments it, every
// unmap decrements it, and whoever brings it to zero removes the name, so
// segments clean themselves up once the last participant is gone.

/// Total bytes to map for a segment exposing `visible_len` bytes: the
/// visible span rounded up to the counter's alignment, plus the counter.
fn segment_len(visible_len: usize) -> usize {
    let align = std::mem::align_of::<AtomicI32>();
    visible_len.div_ceil(align) * align + std::mem::size_of::<AtomicI32>()
}

/// The live-mapping counter at the tail of a segment.
///
/// # Safety
/// `base` must point to a live mapping of `mapped_len` bytes sized by
/// [`segment_len`].
unsafe fn mapping_count(base: *mut u8, mapped_len: usize) -> &'static AtomicI32 {
    let tail = base.add(mapped_len - std::mem::size_of::<AtomicI32>());
    &*(tail as *const AtomicI32)
}

/// Open mode flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmMode {
    Create,
    Open,
    CreateOrOpen,
}

/// A named POSIX shared memory segment mapped into this process.
#[derive(Debug)]
pub struct PlatformShm {
    base: *mut u8,
    mapped_len: usize,  // includes the trailing mapping counter
    visible_len: usize, // what the caller asked for
    posix_name: String, // name with leading '/'
    created: bool,      // this handle brought the segment into existence
}

// Safety: the segment is process-shared by design; nothing in the handle
// is tied to the opening thread.
unsafe impl Send for PlatformShm {}
unsafe impl Sync for PlatformShm {}

impl PlatformShm {
    /// Map a named segment of `visible_len` usable bytes.
    pub fn acquire(name: &str, visible_len: usize, mode: ShmMode) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shm name must not be empty",
            ));
        }
        if visible_len == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "shm size must be positive",
            ));
        }

        let posix_name = names::make_shm_name(name);
        let c_name = cstring(&posix_name)?;
        let mapped_len = segment_len(visible_len);

        let (fd, created) = Self::open_fd(&c_name, mode)?;
        if created {
            // A fresh object has zero length until sized; the kernel
            // zero-fills the new pages.
            if unsafe { libc::ftruncate(fd, mapped_len as libc::off_t) } != 0 {
                let err = io::Error::last_os_error();
                unsafe { libc::close(fd) };
                return Err(err);
            }
        }

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        unsafe { libc::close(fd) };
        if base == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = base as *mut u8;
        unsafe { mapping_count(base, mapped_len) }.fetch_add(1, Ordering::AcqRel);

        Ok(Self {
            base,
            mapped_len,
            visible_len,
            posix_name,
            created,
        })
    }

    /// Resolve `mode` to an open file descriptor plus whether this call
    /// brought the object into existence.
    fn open_fd(c_name: &CString, mode: ShmMode) -> io::Result<(libc::c_int, bool)> {
        const PERMS: libc::mode_t = 0o666;

        let create_excl = || unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
                PERMS as libc::c_uint,
            )
        };
        let open_existing =
            || unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, PERMS as libc::c_uint) };

        match mode {
            ShmMode::Create => {
                let fd = create_excl();
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok((fd, true))
            }
            ShmMode::Open => {
                let fd = open_existing();
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok((fd, false))
            }
            ShmMode::CreateOrOpen => {
                // Exclusive create first, so exactly one caller owns the
                // sizing step. Sizing an object another process already
                // sized can clobber its contents on some systems.
                let fd = create_excl();
                if fd != -1 {
                    return Ok((fd, true));
                }
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EEXIST) {
                    return Err(err);
                }
                let fd = open_existing();
                if fd == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok((fd, false))
            }
        }
    }

    /// Pointer to the caller-visible bytes.
    pub fn as_ptr(&self) -> *const u8 {
        self.base
    }

    /// Mutable pointer to the caller-visible bytes.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.base
    }

    /// The caller-visible length.
    pub fn visible_len(&self) -> usize {
        self.visible_len
    }

    /// POSIX name (with leading '/').
    pub fn name(&self) -> &str {
        &self.posix_name
    }

    /// Whether this handle brought the segment into existence (as opposed
    /// to mapping one that already existed).
    pub fn created(&self) -> bool {
        self.created
    }

    /// Unlink a named segment without an open handle. Missing names are
    /// ignored.
    pub fn unlink_by_name(name: &str) {
        Self::unlink_posix_name(&names::make_shm_name(name));
    }

    fn unlink_posix_name(posix_name: &str) {
        if let Ok(c_name) = CString::new(posix_name.as_bytes()) {
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }
}

impl Drop for PlatformShm {
    fn drop(&mut self) {
        let remaining =
            unsafe { mapping_count(self.base, self.mapped_len) }.fetch_sub(1, Ordering::AcqRel) - 1;
        unsafe { libc::munmap(self.base as *mut libc::c_void, self.mapped_len) };
        if remaining <= 0 {
            // Last one out removes the name.
            Self::unlink_posix_name(&self.posix_name);
        }
    }
}
