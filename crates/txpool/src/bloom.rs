// Path: crates/txpool/src/bloom.rs
//! Per-block bloom filters over transaction hashes.
//!
//! The duplicate check walks the head's ancestor records and probes one
//! filter per block. Transaction hashes are already uniform, so the probe
//! indexes are read straight out of the hash bytes.

use kaon_types::Hash;

/// Filter width in bits. Sized for a few thousand entries per block at a
/// negligible false-positive rate.
const BITS: usize = 1 << 14;
/// Number of probes per entry.
const PROBES: usize = 4;

/// A fixed-size bloom filter keyed by 32-byte hashes.
#[derive(Debug, Clone)]
pub struct BlockBloom {
    words: Vec<u64>,
}

impl BlockBloom {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self {
            words: vec![0u64; BITS / 64],
        }
    }

    fn indexes(hash: &Hash) -> [usize; PROBES] {
        let mut out = [0usize; PROBES];
        for (probe, slot) in out.iter_mut().enumerate() {
            let offset = probe * 4;
            let word = u32::from_le_bytes([
                hash[offset],
                hash[offset + 1],
                hash[offset + 2],
                hash[offset + 3],
            ]);
            *slot = word as usize % BITS;
        }
        out
    }

    /// Records a hash.
    pub fn insert(&mut self, hash: &Hash) {
        for index in Self::indexes(hash) {
            if let Some(word) = self.words.get_mut(index / 64) {
                *word |= 1u64 << (index % 64);
            }
        }
    }

    /// True when the hash may have been recorded (no false negatives).
    pub fn contains(&self, hash: &Hash) -> bool {
        Self::indexes(hash).into_iter().all(|index| {
            self.words
                .get(index / 64)
                .is_some_and(|word| word & (1u64 << (index % 64)) != 0)
        })
    }
}

impl Default for BlockBloom {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_of(n: u8) -> Hash {
        kaon_crypto::sha256(&[n])
    }

    #[test]
    fn inserted_hashes_are_found() {
        let mut bloom = BlockBloom::new();
        for n in 0..100 {
            bloom.insert(&hash_of(n));
        }
        for n in 0..100 {
            assert!(bloom.contains(&hash_of(n)));
        }
    }

    #[test]
    fn absent_hashes_are_mostly_rejected() {
        let mut bloom = BlockBloom::new();
        for n in 0..50 {
            bloom.insert(&hash_of(n));
        }
        let false_positives = (50..250).filter(|n| bloom.contains(&hash_of(*n))).count();
        assert!(false_positives < 3, "{false_positives} false positives");
    }
}
