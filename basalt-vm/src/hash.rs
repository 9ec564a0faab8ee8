//! Hashing primitives shared by value hashing and the name registries.
//!
//! Every value hash composes with a process-wide seed chosen pseudo-randomly
//! on first use, so hash values are not predictable across processes
//! (hash-flooding resistance). The seed is guaranteed non-zero and stable
//! for the life of the process.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::sync::locks::RawMutex;

/// Zero marks "not yet initialized"; the seed itself is never zero.
static SEED: AtomicU64 = AtomicU64::new(0);
static SEED_INIT: RawMutex = RawMutex::new();

/// The process-wide hash seed, initializing it on first use.
pub fn seed() -> u64 {
    let current = SEED.load(Ordering::Acquire);
    if current != 0 {
        return current;
    }

    loop {
        if !SEED_INIT.try_lock() {
            // Another thread is initializing; take its result once visible.
            let current = SEED.load(Ordering::Acquire);
            if current != 0 {
                return current;
            }
            continue;
        }

        let current = SEED.load(Ordering::Acquire);
        if current != 0 {
            SEED_INIT.unlock();
            return current;
        }

        let mut fresh: u64 = rand::random();
        while fresh == 0 {
            fresh = rand::random();
        }
        SEED.store(fresh, Ordering::Release);
        SEED_INIT.unlock();
        return fresh;
    }
}

/// Combine two hash values (64-bit boost-style combine).
pub const fn combine(a: u64, b: u64) -> u64 {
    b.wrapping_add(0x517c_c1b7_2722_0a95)
        .wrapping_add(a & !0xFC00_0000_0000_0000)
        .wrapping_add(a >> 2)
}

/// Seed-composed hash of a single 64-bit value.
pub fn hash_word(word: u64) -> u64 {
    combine(seed(), word)
}

/// FNV-1a over a byte string. Unseeded; the registries use it for name
/// lookup where cross-process stability does not matter.
pub const fn bytes_hash(bytes: &[u8]) -> u64 {
    let mut hash = 0xcbf2_9ce4_8422_2325u64;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// Group-selection bits of a name hash: the high 57 bits, used modulo the
/// registry's group count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupBitmask(pub u64);

impl GroupBitmask {
    /// Derive from a full hash code.
    pub const fn new(hash: u64) -> Self {
        Self((hash & !0x7f) >> 7)
    }
}

/// Fingerprint byte of a name hash: the low 7 bits with the high bit set to
/// mark an occupied registry entry. A zero byte therefore always means
/// "empty".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairBitmask(pub u8);

impl PairBitmask {
    /// Flag bit marking an occupied entry.
    pub const OCCUPIED: u8 = 0b1000_0000;

    /// Derive from a full hash code.
    pub const fn new(hash: u64) -> Self {
        Self(((hash & 0x7f) as u8) | Self::OCCUPIED)
    }
}
