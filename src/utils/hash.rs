//! Content hashing.
//!
//! The shader variant cache records a djb2 hash per source file and
//! re-hashes the files on load to detect edits. djb2 is not collision
//! resistant; it is used purely for change detection, and the hash value is
//! part of the on-disk cache format, so the algorithm must not change.

/// djb2 over raw bytes: `hash = hash * 33 + byte`, seeded with 5381.
#[must_use]
pub fn hash_djb2(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in bytes {
        hash = hash.wrapping_mul(33).wrapping_add(u32::from(byte));
    }
    hash
}
