//! BIP37 bloom filter: the probabilistic watchlist installed on the peer so
//! it forwards only potentially relevant transactions and blocks.

use crate::constants::BIP37_SEED_MULTIPLIER;
use crate::encoding::write_varint;
use crate::hashes::murmur3_32;

/// Fixed-size bit array with `hash_count` murmur3 rounds, each salted with
/// `round * 0xfba4c795 + tweak`. Items can only be added; membership answers
/// are "definitely not" or "possibly" — false positives are acceptable
/// noise, false negatives would lose funds and must never occur.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    size: u32,
    bits: Vec<u8>,
    hash_count: u32,
    tweak: u32,
}

impl BloomFilter {
    /// `size` is the bit-array length in bytes. A zero size is clamped to
    /// one byte: the degenerate filter still answers membership instead of
    /// dividing by zero.
    pub fn new(size: u32, hash_count: u32, tweak: u32) -> Self {
        let size = size.max(1);
        Self {
            size,
            bits: vec![0u8; size as usize],
            hash_count,
            tweak,
        }
    }

    fn bit_index(&self, item: &[u8], round: u32) -> usize {
        let seed = round
            .wrapping_mul(BIP37_SEED_MULTIPLIER)
            .wrapping_add(self.tweak);
        (murmur3_32(item, seed) % (self.size * 8)) as usize
    }

    /// Mark every round's bit for `item`.
    pub fn add(&mut self, item: &[u8]) {
        for round in 0..self.hash_count {
            let bit = self.bit_index(item, round);
            self.bits[bit / 8] |= 1 << (bit % 8);
        }
    }

    /// True if every round's bit is set: the item is possibly present.
    /// False means the item was definitely never added.
    pub fn contains(&self, item: &[u8]) -> bool {
        (0..self.hash_count).all(|round| {
            let bit = self.bit_index(item, round);
            self.bits[bit / 8] & (1 << (bit % 8)) != 0
        })
    }

    /// The packed bit array.
    pub fn bit_field(&self) -> &[u8] {
        &self.bits
    }

    /// Payload of the `filterload` message installing this filter on a
    /// peer: varint size, bit field, hash-round count, tweak, and the
    /// matched-item update flag.
    pub fn filterload_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bits.len() + 10);
        write_varint(&mut out, self.size as u64);
        out.extend_from_slice(&self.bits);
        out.extend_from_slice(&self.hash_count.to_le_bytes());
        out.extend_from_slice(&self.tweak.to_le_bytes());
        out.push(1);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_bit_field() {
        // BIP37 reference vectors: 10-byte filter, 5 rounds, tweak 99
        let mut filter = BloomFilter::new(10, 5, 99);
        filter.add(b"Hello World");
        assert_eq!(hex::encode(filter.bit_field()), "0000000a080000000140");

        filter.add(b"Goodbye!");
        assert_eq!(hex::encode(filter.bit_field()), "4000600a080000010940");
    }

    #[test]
    fn test_reference_filterload_payload() {
        let mut filter = BloomFilter::new(10, 5, 99);
        filter.add(b"Hello World");
        filter.add(b"Goodbye!");
        assert_eq!(
            hex::encode(filter.filterload_payload()),
            "0a4000600a080000010940050000006300000001"
        );
    }

    #[test]
    fn test_no_false_negatives_across_tweaks() {
        for tweak in 0..50u32 {
            let mut filter = BloomFilter::new(30, 5, tweak);
            for i in 0..20u32 {
                filter.add(&i.to_le_bytes());
            }
            for i in 0..20u32 {
                assert!(filter.contains(&i.to_le_bytes()), "tweak {} item {}", tweak, i);
            }
        }
    }

    #[test]
    fn test_absent_items_mostly_rejected() {
        let mut filter = BloomFilter::new(30, 5, 912);
        for i in 0..10u64 {
            filter.add(&i.to_le_bytes());
        }
        // Theoretical false-positive rate for m=240 bits, k=5, n=10 is
        // about 0.02%; allow generous slack
        let trials = 10_000u64;
        let hits = (1_000_000..1_000_000 + trials)
            .filter(|i| filter.contains(&i.to_le_bytes()))
            .count();
        assert!(hits < 100, "false positive rate too high: {}/{}", hits, trials);
    }

    #[test]
    fn test_empty_filter_contains_nothing() {
        let filter = BloomFilter::new(30, 5, 0);
        assert!(!filter.contains(b"anything"));
    }

    #[test]
    fn test_zero_size_is_clamped_to_one_byte() {
        let mut filter = BloomFilter::new(0, 5, 912);
        filter.add(b"item");
        assert!(filter.contains(b"item"));
        assert_eq!(filter.bit_field().len(), 1);
        // The advertised size in the payload matches the clamped bit field
        assert_eq!(filter.filterload_payload()[0], 1);
    }
}
