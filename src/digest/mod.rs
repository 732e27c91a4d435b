// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Content digests for incremental metric evaluation
//!
//! Every fingerprintable entity mixes its members into a [`DigestAccumulator`]
//! in a fixed order. The byte discipline is pinned so digests compare equal
//! across process runs and machine architectures: 64-bit doubles are fed in
//! little-endian, integer counts and lengths in big-endian, type tags as a
//! single byte.

use sha2::{Digest, Sha256};

/// Length in bytes of a finished digest.
pub const DIGEST_LEN: usize = 32;

/// Additive SHA-256 accumulator with a pinned endian discipline.
pub struct DigestAccumulator {
    hasher: Sha256,
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Mix in a double as little-endian 8 bytes.
    pub fn add_f64(&mut self, v: f64) {
        self.hasher.update(v.to_le_bytes());
    }

    /// Mix in a count or length as big-endian 4 bytes.
    pub fn add_u32(&mut self, v: u32) {
        self.hasher.update(v.to_be_bytes());
    }

    /// Mix in a sample value as big-endian 4 bytes.
    pub fn add_i32(&mut self, v: i32) {
        self.hasher.update(v.to_be_bytes());
    }

    /// Mix in a single tag byte.
    pub fn add_u8(&mut self, v: u8) {
        self.hasher.update([v]);
    }

    /// Mix in raw bytes, e.g. a nested digest.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finish(self) -> Vec<u8> {
        self.hasher.finalize().to_vec()
    }
}

impl Default for DigestAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// An entity that contributes members to a digest.
pub trait Digestible {
    fn add_digest_members(&self, acc: &mut DigestAccumulator);

    fn digest(&self) -> Vec<u8> {
        let mut acc = DigestAccumulator::new();
        self.add_digest_members(&mut acc);
        acc.finish()
    }
}

/// Digest of a raw integer sample stream.
pub fn digest_samples(samples: &[i32]) -> Vec<u8> {
    let mut acc = DigestAccumulator::new();
    for &s in samples {
        acc.add_i32(s);
    }
    acc.finish()
}

/// Lowercase hex rendering, used for logs and the bulk dump.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
