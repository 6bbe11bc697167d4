//! A small serializable Bloom filter over primary-key encodings. Sized for
//! roughly 1% false positives at the expected key count; a false positive
//! suppresses an item on cursor resume, it never duplicates one.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bloom {
    bits: Vec<u8>,
    hashes: u32,
}

impl Bloom {
    /// Build a filter for about `expected` entries (~10 bits per entry,
    /// 7 hashes ≈ 1% false positives).
    pub fn with_capacity(expected: usize) -> Self {
        let bits = (expected.max(8) * 10).next_power_of_two();
        Bloom { bits: vec![0; bits / 8], hashes: 7 }
    }

    pub fn insert(&mut self, key: &[u8]) {
        for index in self.bit_indexes(key) {
            self.bits[index / 8] |= 1 << (index % 8);
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.bit_indexes(key).iter().all(|&index| self.bits[index / 8] & (1 << (index % 8)) != 0)
    }

    /// Double hashing: two independent hashes combine into `hashes` probe
    /// positions. The std hasher is keyed deterministically, so filters
    /// round-trip through serialization.
    fn bit_indexes(&self, key: &[u8]) -> Vec<usize> {
        let total_bits = self.bits.len() * 8;
        let h1 = seeded_hash(0x51_73_6d_71, key);
        let h2 = seeded_hash(0x64_79_6e_61, key) | 1;
        (0..self.hashes as u64)
            .map(|i| (h1.wrapping_add(i.wrapping_mul(h2)) % total_bits as u64) as usize)
            .collect()
    }
}

fn seeded_hash(seed: u64, key: &[u8]) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    seed.hash(&mut hasher);
    key.hash(&mut hasher);
    hasher.finish()
}
