//! Deterministic hashing for shard-key routing.
//!
//! Sticky routing promises that the same key maps to the same implementation
//! across calls, threads, processes, and platforms.  `std`'s default hasher
//! is randomly keyed per process, so everything here is built on a fixed
//! FNV-1a core with a SplitMix64 finalizer for bit diffusion.  None of it is
//! cryptographic; it is for repeatable placement, not integrity.

use std::hash::{Hash, Hasher};

/// A [`Hasher`] with a fixed key, stable across platforms and processes.
///
/// FNV-1a over the written bytes.  Use [`stable_hash_of`] rather than reading
/// `finish()` directly; the raw FNV state diffuses poorly in its low bits.
#[derive(Debug, Clone)]
pub struct StableHasher {
    state: u64,
}

impl Default for StableHasher {
    fn default() -> Self {
        Self {
            state: 14695981039346656037,
        }
    }
}

impl StableHasher {
    /// Fresh hasher at the FNV-1a offset basis.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state ^= u64::from(b);
            self.state = self.state.wrapping_mul(1099511628211);
        }
    }
}

/// Stable, well-diffused 64-bit hash of any hashable key.
#[must_use]
pub fn stable_hash_of<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = StableHasher::new();
    key.hash(&mut hasher);
    splitmix64(hasher.finish())
}

/// Order-sensitive combination of a router seed and a key hash.
///
/// `combine_ordered(a, b) != combine_ordered(b, a)` in general.  Distinct
/// seeds decorrelate the placements of different routers, so two experiments
/// sharding on the same user id do not segregate the same users.
#[must_use]
pub fn combine_ordered(seed: u64, hash: u64) -> u64 {
    splitmix64(seed.wrapping_mul(37) ^ hash)
}

/// Jump consistent hash (Lamping & Veach): map `key` onto `[0, buckets)`.
///
/// Growing the bucket count from `n` to `n + 1` moves roughly `1/(n+1)` of
/// keys, all of them into the new bucket — no key ever moves between two
/// surviving buckets.  For weighted routing this bounds remapping churn when
/// weights change to roughly the fraction of weight that moved.
#[must_use]
pub fn jump_hash(mut key: u64, buckets: u64) -> u64 {
    debug_assert!(buckets > 0, "jump_hash requires at least one bucket");
    let mut bucket: i64 = -1;
    let mut jump: i64 = 0;
    while jump < buckets as i64 {
        bucket = jump;
        key = key.wrapping_mul(2862933555777941757).wrapping_add(1);
        jump = ((bucket.wrapping_add(1) as f64)
            * ((1u64 << 31) as f64 / ((key >> 33).wrapping_add(1) as f64))) as i64;
    }
    bucket as u64
}

#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
