//! Cross-module protocol validation tests: generated merkle proofs,
//! header batch acceptance, and bloom filter statistics.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spv_spend::bloom::BloomFilter;
use spv_spend::hashes::hash256;
use spv_spend::headers::{check_pow, header_hash, HeaderChain};
use spv_spend::merkle::{merkle_parent, MerkleBlock};
use spv_spend::types::{BlockHeader, Hash};
use spv_spend::SpvError;

// ---------------------------------------------------------------------
// Merkle proof generation
// ---------------------------------------------------------------------

fn level_width(total: u32, height: u32) -> u32 {
    let denom = 1u64 << height;
    ((total as u64 + denom - 1) / denom) as u32
}

fn tree_height(total: u32) -> u32 {
    let mut height = 0;
    while level_width(total, height) > 1 {
        height += 1;
    }
    height
}

/// Hash of the subtree rooted at (`height`, `pos`), big-endian.
fn subtree_hash(leaves: &[Hash], height: u32, pos: u32) -> Hash {
    if height == 0 {
        return leaves[pos as usize];
    }
    let left = subtree_hash(leaves, height - 1, pos * 2);
    let right = if pos * 2 + 1 < level_width(leaves.len() as u32, height - 1) {
        subtree_hash(leaves, height - 1, pos * 2 + 1)
    } else {
        left
    };
    merkle_parent(&left, &right)
}

/// Emit the proof streams for the subtree at (`height`, `pos`), preorder.
fn emit_proof(
    leaves: &[Hash],
    matched: &HashSet<u32>,
    height: u32,
    pos: u32,
    flags: &mut Vec<bool>,
    hashes: &mut Vec<Hash>,
) {
    let total = leaves.len() as u32;
    let first_leaf = (pos as u64) << height;
    let last_leaf = ((pos as u64 + 1) << height).min(total as u64);
    let contains_match = (first_leaf..last_leaf).any(|i| matched.contains(&(i as u32)));

    if height == 0 {
        flags.push(contains_match);
        let mut wire = leaves[pos as usize];
        wire.reverse();
        hashes.push(wire);
        return;
    }
    if contains_match {
        flags.push(true);
        emit_proof(leaves, matched, height - 1, pos * 2, flags, hashes);
        if pos * 2 + 1 < level_width(total, height - 1) {
            emit_proof(leaves, matched, height - 1, pos * 2 + 1, flags, hashes);
        }
    } else {
        flags.push(false);
        let mut wire = subtree_hash(leaves, height, pos);
        wire.reverse();
        hashes.push(wire);
    }
}

fn pack_flags(flags: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; flags.len().div_ceil(8)];
    for (i, &flag) in flags.iter().enumerate() {
        if flag {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Build a merkle block over `total` synthetic transactions where the
/// transactions at `matched` indices were relayed through the filter.
/// Also returns how many flag bits the proof actually uses.
fn generate(total: u32, matched: &[u32]) -> (MerkleBlock, usize) {
    let leaves: Vec<Hash> = (0..total).map(|i| hash256(&i.to_le_bytes())).collect();
    let matched: HashSet<u32> = matched.iter().copied().collect();

    let height = tree_height(total);
    let mut flags = Vec::new();
    let mut hashes = Vec::new();
    emit_proof(&leaves, &matched, height, 0, &mut flags, &mut hashes);

    let mut merkle_root = subtree_hash(&leaves, height, 0);
    merkle_root.reverse();

    let block = MerkleBlock {
        header: BlockHeader {
            version: 1,
            prev_block_hash: [0u8; 32],
            merkle_root,
            timestamp: 1_600_000_000,
            bits: 0x207fffff,
            nonce: 0,
        },
        total,
        hashes,
        flags: pack_flags(&flags),
    };
    (block, flags.len())
}

fn generate_block(total: u32, matched: &[u32]) -> MerkleBlock {
    generate(total, matched).0
}

#[test]
fn generated_proofs_verify() {
    for total in [1u32, 2, 3, 5, 16] {
        for matched in [vec![0], vec![total - 1], vec![total / 2], vec![0, total - 1]] {
            let block = generate_block(total, &matched);
            assert!(
                block.is_valid(),
                "proof rejected: total={} matched={:?}",
                total,
                matched
            );
        }
    }
}

#[test]
fn corrupted_proof_hash_is_rejected() {
    for total in [1u32, 2, 3, 5, 16] {
        let block = generate_block(total, &[total / 2]);
        for i in 0..block.hashes.len() {
            let mut corrupted = block.clone();
            corrupted.hashes[i][7] ^= 0x01;
            assert!(
                !corrupted.is_valid(),
                "corrupted hash {} accepted at total={}",
                i,
                total
            );
        }
    }
}

#[test]
fn leftover_proof_hash_is_rejected() {
    for total in [1u32, 3, 16] {
        let mut block = generate_block(total, &[0]);
        block.hashes.push(hash256(b"stray"));
        assert!(!block.is_valid(), "leftover hash accepted at total={}", total);
    }
}

#[test]
fn set_padding_flag_bit_is_rejected() {
    for total in [2u32, 5, 16] {
        let (block, used_bits) = generate(total, &[0]);
        if used_bits == block.flags.len() * 8 {
            continue; // no padding to flip
        }
        let mut forged = block.clone();
        forged.flags[used_bits / 8] |= 1 << (used_bits % 8);
        assert!(!forged.is_valid(), "set padding bit accepted at total={}", total);
    }
}

#[test]
fn wire_roundtrip_of_generated_block() {
    let block = generate_block(5, &[2]);
    let parsed = MerkleBlock::parse(&mut std::io::Cursor::new(block.serialize())).unwrap();
    assert_eq!(parsed, block);
    assert!(parsed.is_valid());
}

// ---------------------------------------------------------------------
// Header batches
// ---------------------------------------------------------------------

fn mine(mut header: BlockHeader) -> BlockHeader {
    while !check_pow(&header).unwrap() {
        header.nonce += 1;
    }
    header
}

fn easy_chain(start: Hash, len: usize) -> Vec<BlockHeader> {
    let mut headers = Vec::with_capacity(len);
    let mut prev = start;
    for i in 0..len {
        let header = mine(BlockHeader {
            version: 1,
            prev_block_hash: prev,
            merkle_root: hash256(&[i as u8]),
            timestamp: 1_600_000_000 + i as u32,
            bits: 0x207fffff,
            nonce: 0,
        });
        prev = header_hash(&header);
        headers.push(header);
    }
    headers
}

#[test]
fn long_linked_batch_is_accepted_in_order() {
    let start = [0x11; 32];
    let headers = easy_chain(start, 12);

    let mut chain = HeaderChain::new(Some(start));
    let fetch = chain.extend(&headers).unwrap();
    assert_eq!(fetch.len(), 12);
    for (hash, header) in fetch.iter().zip(&headers) {
        assert_eq!(*hash, header_hash(header));
    }
    assert_eq!(chain.tip(), Some(header_hash(&headers[11])));
}

#[test]
fn tampered_header_mid_batch_fails_at_its_index() {
    let start = [0x11; 32];
    let mut headers = easy_chain(start, 8);
    headers[5].prev_block_hash = [0xee; 32];

    let mut chain = HeaderChain::new(Some(start));
    match chain.extend(&headers) {
        Err(SpvError::BrokenHeaderChain(index)) => assert_eq!(index, 5),
        other => panic!("expected linkage break, got {:?}", other),
    }
}

#[test]
fn batches_chain_across_calls() {
    let start = [0x11; 32];
    let headers = easy_chain(start, 6);

    let mut chain = HeaderChain::new(Some(start));
    chain.extend(&headers[..3]).unwrap();
    chain.extend(&headers[3..]).unwrap();
    assert_eq!(chain.tip(), Some(header_hash(&headers[5])));

    // Replaying the first half no longer links
    assert!(matches!(
        chain.extend(&headers[..3]),
        Err(SpvError::BrokenHeaderChain(0))
    ));
}

// ---------------------------------------------------------------------
// Bloom statistics
// ---------------------------------------------------------------------

#[test]
fn bloom_has_no_false_negatives_for_any_tweak() {
    let items: Vec<Vec<u8>> = (0..25u32).map(|i| format!("item-{}", i).into_bytes()).collect();
    for tweak in 0..50 {
        let mut filter = BloomFilter::new(30, 5, tweak);
        for item in &items {
            filter.add(item);
        }
        for item in &items {
            assert!(filter.contains(item), "false negative at tweak {}", tweak);
        }
    }
}

#[test]
fn bloom_false_positive_rate_is_near_theory() {
    // 240 bits, 5 rounds, 30 inserted items: theoretical rate
    // (1 - e^(-5*30/240))^5 ~ 2.2%
    let mut filter = BloomFilter::new(30, 5, 912);
    for i in 0..30u32 {
        filter.add(format!("member-{}", i).as_bytes());
    }

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let trials = 20_000;
    let mut positives = 0;
    for _ in 0..trials {
        let candidate: [u8; 16] = rng.gen();
        if filter.contains(&candidate) {
            positives += 1;
        }
    }
    let rate = positives as f64 / trials as f64;
    assert!(rate > 0.005, "false positive rate {} implausibly low", rate);
    assert!(rate < 0.06, "false positive rate {} implausibly high", rate);
}
