//! Merkle inclusion verification for bloom-filtered blocks.

use std::io::Read;

use crate::encoding::{display_hex, read_hash, read_u32_le, read_varint, write_varint};
use crate::error::Result;
use crate::hashes::hash256;
use crate::headers::{header_hash, parse_header, serialize_header};
use crate::types::{BlockHeader, Hash};

/// Parent of two merkle tree nodes. Operates on big-endian (display-order)
/// hashes; an odd node at any level is paired with itself by the caller.
pub fn merkle_parent(left: &Hash, right: &Hash) -> Hash {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left);
    concat[32..].copy_from_slice(right);
    hash256(&concat)
}

/// A bloom-filtered block: header, total transaction count, and the
/// compressed inclusion proof (proof hashes + traversal flag bits).
///
/// Invariant checked by [`MerkleBlock::is_valid`]: reconstructing the
/// merkle root from the proof must reproduce `header.merkle_root`, with
/// both the hash and flag streams consumed exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlock {
    pub header: BlockHeader,
    pub total: u32,
    pub hashes: Vec<Hash>,
    pub flags: Vec<u8>,
}

impl MerkleBlock {
    /// Parse the wire form: header, total count, proof hashes, flag bytes.
    pub fn parse(r: &mut impl Read) -> Result<Self> {
        let header = parse_header(r)?;
        let total = read_u32_le(r)?;
        let hash_count = read_varint(r)?;
        let mut hashes = Vec::with_capacity(crate::encoding::bounded_capacity(hash_count, 32));
        for _ in 0..hash_count {
            hashes.push(read_hash(r)?);
        }
        let flag_len = read_varint(r)? as usize;
        let flags = crate::encoding::read_bytes(r, flag_len)?;
        Ok(Self {
            header,
            total,
            hashes,
            flags,
        })
    }

    /// Serialize back to the wire form.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&serialize_header(&self.header));
        out.extend_from_slice(&self.total.to_le_bytes());
        write_varint(&mut out, self.hashes.len() as u64);
        for hash in &self.hashes {
            out.extend_from_slice(hash);
        }
        write_varint(&mut out, self.flags.len() as u64);
        out.extend_from_slice(&self.flags);
        out
    }

    /// Block hash of the embedded header, internal order.
    pub fn block_hash(&self) -> Hash {
        header_hash(&self.header)
    }

    /// Verify the inclusion proof.
    ///
    /// Walks the implied tree depth-first: a set flag bit on an internal
    /// node means "descend, this node is computed from its children"; a
    /// clear flag bit means "consume one proof hash for this whole
    /// subtree". Every leaf consumes a hash regardless of its flag (the
    /// flag there only marks the transaction as matched). The proof is
    /// valid iff the reconstructed root equals the header's merkle root
    /// and both streams are consumed exactly — leftover hashes or stray
    /// set flag bits make the proof invalid, never "probably fine".
    pub fn is_valid(&self) -> bool {
        if self.total == 0 {
            return false;
        }

        // Merkle arithmetic runs on big-endian hashes; the wire carries
        // them reversed
        let hashes_be: Vec<Hash> = self
            .hashes
            .iter()
            .map(|h| {
                let mut be = *h;
                be.reverse();
                be
            })
            .collect();

        let mut cursor = ProofCursor {
            flags: &self.flags,
            flag_pos: 0,
            hashes: &hashes_be,
            hash_pos: 0,
        };

        let height = tree_height(self.total);
        let root_be = match compute_node(&mut cursor, height, 0, self.total) {
            Some(root) => root,
            None => {
                tracing::debug!(block = %display_hex(&self.block_hash()), "proof stream underran");
                return false;
            }
        };

        if cursor.hash_pos != hashes_be.len() {
            tracing::debug!(block = %display_hex(&self.block_hash()), "unconsumed proof hashes");
            return false;
        }
        if !cursor.remaining_flags_clear() {
            tracing::debug!(block = %display_hex(&self.block_hash()), "unconsumed flag bits set");
            return false;
        }

        let mut root = root_be;
        root.reverse();
        root == self.header.merkle_root
    }
}

/// Height of a merkle tree over `total` leaves (0 for a single leaf).
fn tree_height(total: u32) -> u32 {
    let mut height = 0;
    while level_width(total, height) > 1 {
        height += 1;
    }
    height
}

/// Number of nodes at `height` levels above the leaves.
fn level_width(total: u32, height: u32) -> u32 {
    let denom = 1u64 << height;
    ((total as u64 + denom - 1) / denom) as u32
}

struct ProofCursor<'a> {
    flags: &'a [u8],
    flag_pos: usize,
    hashes: &'a [Hash],
    hash_pos: usize,
}

impl ProofCursor<'_> {
    fn next_flag(&mut self) -> Option<bool> {
        let byte = *self.flags.get(self.flag_pos / 8)?;
        let bit = byte & (1 << (self.flag_pos % 8)) != 0;
        self.flag_pos += 1;
        Some(bit)
    }

    fn next_hash(&mut self) -> Option<Hash> {
        let hash = *self.hashes.get(self.hash_pos)?;
        self.hash_pos += 1;
        Some(hash)
    }

    /// Padding bits after the consumed prefix must all be zero.
    fn remaining_flags_clear(&self) -> bool {
        (self.flag_pos..self.flags.len() * 8).all(|pos| {
            self.flags[pos / 8] & (1 << (pos % 8)) == 0
        })
    }
}

fn compute_node(cursor: &mut ProofCursor, height: u32, pos: u32, total: u32) -> Option<Hash> {
    let flag = cursor.next_flag()?;
    if height == 0 || !flag {
        // Terminal: a leaf hash (matched or not) or a pruned subtree hash
        return cursor.next_hash();
    }
    let left = compute_node(cursor, height - 1, pos * 2, total)?;
    let right = if pos * 2 + 1 < level_width(total, height - 1) {
        compute_node(cursor, height - 1, pos * 2 + 1, total)?
    } else {
        // Odd node count at this level: pair the last node with itself
        left
    };
    Some(merkle_parent(&left, &right))
}
