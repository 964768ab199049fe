//! Encoding helpers: varints, base58check, little-endian readers, and
//! display-order hex for hashes

use std::io::Read;

use crate::error::{Result, SpvError};
use crate::hashes::hash256;
use crate::types::Hash;

/// Append a Bitcoin-style variable-length integer.
pub fn write_varint(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

/// Read a variable-length integer.
pub fn read_varint(r: &mut impl Read) -> Result<u64> {
    let prefix = read_u8(r)?;
    match prefix {
        0xfd => Ok(u16::from_le_bytes(read_array::<2>(r)?) as u64),
        0xfe => Ok(u32::from_le_bytes(read_array::<4>(r)?) as u64),
        0xff => Ok(u64::from_le_bytes(read_array::<8>(r)?)),
        n => Ok(n as u64),
    }
}

pub fn read_u8(r: &mut impl Read) -> Result<u8> {
    Ok(read_array::<1>(r)?[0])
}

pub fn read_u32_le(r: &mut impl Read) -> Result<u32> {
    Ok(u32::from_le_bytes(read_array::<4>(r)?))
}

pub fn read_u64_le(r: &mut impl Read) -> Result<u64> {
    Ok(u64::from_le_bytes(read_array::<8>(r)?))
}

/// Read exactly N bytes or report a truncated message.
pub fn read_array<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)
        .map_err(|e| SpvError::Malformed(format!("truncated read of {} bytes: {}", N, e)))?;
    Ok(buf)
}

/// Read a variable number of bytes or report a truncated message.
///
/// Lengths decoded from the wire cannot legitimately exceed the largest
/// accepted payload, so anything bigger is rejected before allocating.
pub fn read_bytes(r: &mut impl Read, len: usize) -> Result<Vec<u8>> {
    if len > crate::constants::MAX_PAYLOAD_SIZE {
        return Err(SpvError::Malformed(format!(
            "declared length of {} bytes exceeds the {} limit",
            len,
            crate::constants::MAX_PAYLOAD_SIZE
        )));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)
        .map_err(|e| SpvError::Malformed(format!("truncated read of {} bytes: {}", len, e)))?;
    Ok(buf)
}

/// Read a 32-byte hash in wire order.
pub fn read_hash(r: &mut impl Read) -> Result<Hash> {
    read_array::<32>(r)
}

/// Pre-allocation size for `count` elements of at least `element_size`
/// bytes each. Counts come off the wire and are attacker-controlled: a
/// count claiming more elements than the largest accepted payload could
/// carry is clamped, so a lying peer gets a truncated-read error from the
/// parse loop instead of panicking the allocator.
pub fn bounded_capacity(count: u64, element_size: usize) -> usize {
    let most = (crate::constants::MAX_PAYLOAD_SIZE / element_size.max(1)) as u64;
    count.min(most) as usize
}

/// Encode payload with a trailing 4-byte double-SHA checksum (base58check).
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = hash256(payload);
    let mut data = payload.to_vec();
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decode a base58check string, verifying the 4-byte checksum. Returns the
/// payload without the checksum.
pub fn base58check_decode(s: &str) -> Result<Vec<u8>> {
    let decoded = bs58::decode(s)
        .into_vec()
        .map_err(|e| SpvError::Malformed(format!("invalid base58: {}", e)))?;
    if decoded.len() < 5 {
        return Err(SpvError::Malformed("base58check data too short".into()));
    }
    let (payload, checksum) = decoded.split_at(decoded.len() - 4);
    let expected = hash256(payload);
    if checksum != &expected[..4] {
        return Err(SpvError::Malformed("base58check checksum mismatch".into()));
    }
    Ok(payload.to_vec())
}

/// Hex of a hash in display order (byte-reversed from the internal/wire
/// representation).
pub fn display_hex(hash: &Hash) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse a display-order hex string into an internal-order hash.
pub fn hash_from_display_hex(s: &str) -> Result<Hash> {
    let bytes = hex::decode(s).map_err(|e| SpvError::Malformed(format!("invalid hex: {}", e)))?;
    if bytes.len() != 32 {
        return Err(SpvError::Malformed(format!(
            "expected 32-byte hash, got {} bytes",
            bytes.len()
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    hash.reverse();
    Ok(hash)
}
