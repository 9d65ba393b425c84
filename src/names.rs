// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Name derivation for the OS-global objects backing a channel: the shared
// memory region and the two named semaphores. Semaphore names are built
// from the short `unique_name` stored in the object header so that every
// process mapping the region derives the same names.

use crate::id::ObjectId;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// 64-bit FNV-1a digest of `data`, rendered as 16 lowercase hex chars.
/// Short, stable across processes, and well distributed; nothing outside
/// this crate needs to reproduce it.
fn digest_hex(data: &[u8]) -> String {
    let hash = data
        .iter()
        .fold(FNV_OFFSET_BASIS, |h, &b| {
            (h ^ u64::from(b)).wrapping_mul(FNV_PRIME)
        });
    format!("{hash:016x}")
}

/// Maximum length for a POSIX semaphore name, including the leading '/'.
///
/// On macOS `PSEMNAMLEN` is 31. Linux allows `NAME_MAX - 4` (251).
#[cfg(target_os = "macos")]
pub const SEM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SEM_NAME_MAX: usize = 251;

/// Maximum length for a POSIX shm name. Set to 0 to disable truncation.
#[cfg(target_os = "macos")]
pub const SHM_NAME_MAX: usize = 31;

#[cfg(not(target_os = "macos"))]
pub const SHM_NAME_MAX: usize = 0; // 0 = no truncation

/// The short name stored in a region's header, from which both semaphore
/// names are derived. A 16-char digest of the object id keeps the derived
/// names under every platform's limit.
pub fn unique_object_name(id: &ObjectId) -> String {
    digest_hex(id.as_bytes())
}

/// Name of the header semaphore for a region whose header carries
/// `unique_name`.
///
/// # Panics
/// Panics when the derived name exceeds the platform semaphore-name
/// limit. A too-long `unique_name` is a programming error.
pub fn header_sem_name(unique_name: &str) -> String {
    sem_name("hdr", unique_name)
}

/// Name of the object semaphore, the readers-pending rendezvous.
///
/// # Panics
/// Same contract as [`header_sem_name`].
pub fn object_sem_name(unique_name: &str) -> String {
    sem_name("obj", unique_name)
}

fn sem_name(prefix: &str, unique_name: &str) -> String {
    let name = format!("/{prefix}{unique_name}");
    assert!(
        name.len() <= SEM_NAME_MAX,
        "semaphore name {name:?} exceeds the platform limit of {SEM_NAME_MAX}"
    );
    name
}

/// Shared-memory region name for an object id, used by the demo store.
pub fn region_shm_name(id: &ObjectId) -> String {
    make_shm_name(&format!("objchan_{}", id.hex()))
}

/// Produce a POSIX shm-safe name (with leading '/').
///
/// On platforms with a short shm-name limit, overlong names collapse to
/// `/<head>_<digest>`: the head keeps the name recognizable in shm
/// listings, the digest keeps it unique.
pub fn make_shm_name(name: &str) -> String {
    let full = if name.starts_with('/') {
        name.to_string()
    } else {
        format!("/{name}")
    };

    if SHM_NAME_MAX == 0 || full.len() <= SHM_NAME_MAX {
        return full;
    }

    let digest = digest_hex(full.as_bytes());
    // Room left for the head once '/', '_' and the digest are placed.
    let head_len = SHM_NAME_MAX.saturating_sub(digest.len() + 2);
    let head = &full[1..1 + head_len.min(full.len() - 1)];
    format!("/{head}_{digest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_name_is_16_hex_chars() {
        let id = ObjectId::from_bytes([7u8; 16]);
        let name = unique_object_name(&id);
        assert_eq!(name.len(), 16);
        assert!(name.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn unique_name_is_deterministic() {
        let id = ObjectId::from_bytes([42u8; 16]);
        assert_eq!(unique_object_name(&id), unique_object_name(&id));
    }

    #[test]
    fn distinct_ids_get_distinct_names() {
        let a = ObjectId::from_bytes([1u8; 16]);
        let b = ObjectId::from_bytes([2u8; 16]);
        assert_ne!(unique_object_name(&a), unique_object_name(&b));
    }

    #[test]
    fn sem_names_share_the_unique_part() {
        let id = ObjectId::from_bytes([1u8; 16]);
        let unique = unique_object_name(&id);
        let hdr = header_sem_name(&unique);
        let obj = object_sem_name(&unique);
        assert_eq!(hdr, format!("/hdr{unique}"));
        assert_eq!(obj, format!("/obj{unique}"));
        assert!(hdr.len() <= SEM_NAME_MAX);
    }

    #[test]
    #[should_panic]
    fn overlong_unique_name_fails_loudly() {
        let unique = "x".repeat(SEM_NAME_MAX + 1);
        let _ = header_sem_name(&unique);
    }

    #[test]
    fn region_name_is_shm_safe() {
        let id = ObjectId::from_bytes([0xab; 16]);
        let name = region_shm_name(&id);
        assert!(name.starts_with('/'));
        if SHM_NAME_MAX > 0 {
            assert!(name.len() <= SHM_NAME_MAX);
        }
    }
}
