//! MurmurHash3 x64_128 implementation.
//!
//! Original algorithm by Austin Appleby. All rights to the original belong to the author.
//!
//! Besides the one-shot [`hash128`], this crate provides [`MurmurHash`], an
//! incremental accumulator: every `append` feeds the current 128-bit state in
//! as the seed of the next block, so the result depends on both the content
//! and the order of everything appended.

use std::fmt;

const C1: u64 = 0x87c37b91114253d5;
const C2: u64 = 0x4cf5ad432745937f;

/// Compute MurmurHash3 x64_128 with zero seeds.
/// Returns 128-bit hash as (h1, h2).
#[inline]
pub fn hash128(data: &[u8]) -> (u64, u64) {
    hash128_seeded(data, 0, 0)
}

/// Compute MurmurHash3 x64_128 starting from the given seed state.
pub fn hash128_seeded(data: &[u8], seed1: u64, seed2: u64) -> (u64, u64) {
    let len = data.len();
    let mut h1 = seed1;
    let mut h2 = seed2;

    let mut blocks = data.chunks_exact(16);
    for block in &mut blocks {
        let (lo, hi) = block.split_at(8);
        let k1 = u64::from_le_bytes(lo.try_into().unwrap_or([0; 8]));
        let k2 = u64::from_le_bytes(hi.try_into().unwrap_or([0; 8]));

        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(27);
        h1 = h1.wrapping_add(h2);
        h1 = h1.wrapping_mul(5).wrapping_add(0x52dce729);

        h2 ^= mix_k2(k2);
        h2 = h2.rotate_left(31);
        h2 = h2.wrapping_add(h1);
        h2 = h2.wrapping_mul(5).wrapping_add(0x38495ab5);
    }

    // Tail: little-endian accumulation of the remaining bytes, k2 takes bytes 8..15.
    let tail = blocks.remainder();
    let mut k1: u64 = 0;
    let mut k2: u64 = 0;
    for (i, &byte) in tail.iter().enumerate() {
        if i < 8 {
            k1 |= (byte as u64) << (8 * i);
        } else {
            k2 |= (byte as u64) << (8 * (i - 8));
        }
    }
    if tail.len() > 8 {
        h2 ^= mix_k2(k2);
    }
    if !tail.is_empty() {
        h1 ^= mix_k1(k1);
    }

    h1 ^= len as u64;
    h2 ^= len as u64;

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    h1 = fmix64(h1);
    h2 = fmix64(h2);

    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);

    (h1, h2)
}

#[inline]
fn mix_k1(k1: u64) -> u64 {
    k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2)
}

#[inline]
fn mix_k2(k2: u64) -> u64 {
    k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1)
}

/// Final mix function for 64-bit values.
#[inline]
fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

/// Incremental 128-bit hash.
///
/// Two accumulators compare equal only when the same sequence of values was
/// appended to both.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MurmurHash {
    h1: u64,
    h2: u64,
}

impl MurmurHash {
    /// Create an accumulator in its initial state.
    pub const fn new() -> Self {
        Self { h1: 0, h2: 0 }
    }

    /// Create from raw state.
    pub const fn from_parts(h1: u64, h2: u64) -> Self {
        Self { h1, h2 }
    }

    /// Raw state.
    pub const fn parts(&self) -> (u64, u64) {
        (self.h1, self.h2)
    }

    /// Append raw bytes.
    pub fn append_bytes(&mut self, data: &[u8]) -> &mut Self {
        let (h1, h2) = hash128_seeded(data, self.h1, self.h2);
        self.h1 = h1;
        self.h2 = h2;
        self
    }

    /// Append a string. The length is mixed in so `"ab" + "c"` differs from `"a" + "bc"`.
    pub fn append_str(&mut self, s: &str) -> &mut Self {
        self.append_u64(s.len() as u64);
        self.append_bytes(s.as_bytes())
    }

    pub fn append_u64(&mut self, v: u64) -> &mut Self {
        self.append_bytes(&v.to_le_bytes())
    }

    pub fn append_i64(&mut self, v: i64) -> &mut Self {
        self.append_bytes(&v.to_le_bytes())
    }

    pub fn append_f64(&mut self, v: f64) -> &mut Self {
        self.append_bytes(&v.to_le_bytes())
    }

    /// Append another hash.
    pub fn append_hash(&mut self, other: &MurmurHash) -> &mut Self {
        let mut buf = [0u8; 16];
        buf[0..8].copy_from_slice(&other.h1.to_le_bytes());
        buf[8..16].copy_from_slice(&other.h2.to_le_bytes());
        self.append_bytes(&buf)
    }

    /// Lowercase hex string of the 128-bit state.
    pub fn to_hex(&self) -> String {
        format!("{:016x}{:016x}", self.h1, self.h2)
    }
}

impl fmt::Display for MurmurHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for MurmurHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MurmurHash({})", self.to_hex())
    }
}
