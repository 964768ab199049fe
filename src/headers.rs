//! Block header codec, proof-of-work checking, and the rolling header-chain
//! validator.

use std::io::Read;

use crate::constants::MAX_HEADERS_PER_BATCH;
use crate::encoding::{display_hex, read_hash, read_u32_le};
use crate::error::{Result, SpvError};
use crate::hashes::hash256;
use crate::types::{BlockHeader, Hash};

/// Serialize a header to its 80-byte wire form.
pub fn serialize_header(header: &BlockHeader) -> [u8; 80] {
    let mut out = [0u8; 80];
    out[0..4].copy_from_slice(&header.version.to_le_bytes());
    out[4..36].copy_from_slice(&header.prev_block_hash);
    out[36..68].copy_from_slice(&header.merkle_root);
    out[68..72].copy_from_slice(&header.timestamp.to_le_bytes());
    out[72..76].copy_from_slice(&header.bits.to_le_bytes());
    out[76..80].copy_from_slice(&header.nonce.to_le_bytes());
    out
}

/// Parse an 80-byte header from the wire.
pub fn parse_header(r: &mut impl Read) -> Result<BlockHeader> {
    let version = read_u32_le(r)?;
    let prev_block_hash = read_hash(r)?;
    let merkle_root = read_hash(r)?;
    let timestamp = read_u32_le(r)?;
    let bits = read_u32_le(r)?;
    let nonce = read_u32_le(r)?;
    Ok(BlockHeader {
        version,
        prev_block_hash,
        merkle_root,
        timestamp,
        bits,
        nonce,
    })
}

/// Block hash in internal (wire) order: hash256 of the serialized header.
pub fn header_hash(header: &BlockHeader) -> Hash {
    hash256(&serialize_header(header))
}

/// Expand the compact `bits` field into a 256-bit big-endian target.
///
/// Compact form: high byte is the exponent, low three bytes the
/// coefficient; target = coefficient * 256^(exponent - 3). Rejects negative
/// coefficients (sign bit set) and targets that overflow 256 bits.
pub fn bits_to_target(bits: u32) -> Result<[u8; 32]> {
    let exponent = (bits >> 24) as i32;
    let coefficient = bits & 0x00ff_ffff;

    if coefficient & 0x0080_0000 != 0 {
        return Err(SpvError::Malformed(format!(
            "negative compact target {:#010x}",
            bits
        )));
    }

    let mut target = [0u8; 32];
    let coeff_bytes = [
        (coefficient >> 16) as u8,
        (coefficient >> 8) as u8,
        coefficient as u8,
    ];
    for (i, &byte) in coeff_bytes.iter().enumerate() {
        let pos = 32 - exponent + i as i32;
        if pos < 0 {
            if byte != 0 {
                return Err(SpvError::Malformed(format!(
                    "compact target {:#010x} overflows 256 bits",
                    bits
                )));
            }
        } else if pos < 32 {
            target[pos as usize] = byte;
        }
        // Positions past the end shift the byte out entirely (exponent < 3)
    }
    Ok(target)
}

/// True iff the header's hash, read as a 256-bit number, is below the
/// target implied by its `bits` field.
pub fn check_pow(header: &BlockHeader) -> Result<bool> {
    let target = bits_to_target(header.bits)?;
    let mut hash_be = header_hash(header);
    hash_be.reverse();
    Ok(hash_be < target)
}

/// Batch of block hashes to fetch as filtered blocks after a header batch
/// was accepted.
pub type FetchList = Vec<Hash>;

/// Validates ordered header batches against a rolling last-accepted hash.
///
/// Holds only the single most recent accepted hash, not the chain, so a
/// peer reorganizing deeper than one step mid-sync surfaces as a linkage
/// break rather than being tracked.
#[derive(Debug, Clone)]
pub struct HeaderChain {
    tip: Option<Hash>,
}

impl HeaderChain {
    /// `tip` is the last accepted hash, or None before the first batch
    /// (the very first header's linkage is then not checked).
    pub fn new(tip: Option<Hash>) -> Self {
        Self { tip }
    }

    /// The last accepted block hash.
    pub fn tip(&self) -> Option<Hash> {
        self.tip
    }

    /// Validate one `getheaders` response batch in order.
    ///
    /// Every header must carry valid proof of work and link to the running
    /// tip; the first failure aborts the whole batch with the failing
    /// index. On success the tip advances and the accepted block hashes are
    /// returned as the fetch list for a batched filtered-block request.
    pub fn extend(&mut self, headers: &[BlockHeader]) -> Result<FetchList> {
        if headers.len() > MAX_HEADERS_PER_BATCH {
            return Err(SpvError::Malformed(format!(
                "header batch of {} exceeds the {} limit",
                headers.len(),
                MAX_HEADERS_PER_BATCH
            )));
        }
        let mut fetch = Vec::with_capacity(headers.len());
        for (index, header) in headers.iter().enumerate() {
            if !check_pow(header)? {
                return Err(SpvError::InvalidProofOfWork(index));
            }
            if let Some(tip) = self.tip {
                if header.prev_block_hash != tip {
                    return Err(SpvError::BrokenHeaderChain(index));
                }
            }
            let hash = header_hash(header);
            tracing::debug!(block = %display_hex(&hash), index, "header accepted");
            self.tip = Some(hash);
            fetch.push(hash);
        }
        Ok(fetch)
    }
}
