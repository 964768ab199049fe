//! Hash primitives: double SHA-256, SHA-256 + RIPEMD-160, and the BIP37
//! murmur3 used by the bloom filter

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::{Hash, Hash160};

/// Double round of SHA-256. Block hashes, txids, checksums, and sighash
/// digests all go through this.
pub fn hash256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// SHA-256 followed by RIPEMD-160; the public-key-hash digest behind
/// p2pkh addresses.
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    let ripe = Ripemd160::digest(sha);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripe);
    out
}

/// 32-bit murmur3, the hash BIP37 bloom filters are defined over.
///
/// Interoperability note: peers recompute the same bit positions, so this
/// must match the reference algorithm bit for bit.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k ^= (b as u32) << (8 * i);
        }
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash256_is_double_sha() {
        let once = Sha256::digest(b"hello world");
        let twice = hash256(b"hello world");
        assert_ne!(&twice[..], &once[..]);
        assert_eq!(twice, hash256(b"hello world"));
    }

    #[test]
    fn test_hash160_length_and_determinism() {
        let a = hash160(b"some pubkey bytes");
        let b = hash160(b"some pubkey bytes");
        assert_eq!(a, b);
        assert_ne!(a, hash160(b"other pubkey bytes"));
    }

    #[test]
    fn test_murmur3_reference_vectors() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e28b7);
        assert_eq!(murmur3_32(b"hello", 0), 0x248bfa47);
    }

    #[test]
    fn test_murmur3_seed_changes_output() {
        assert_ne!(murmur3_32(b"abcd", 0), murmur3_32(b"abcd", 1));
    }
}
