//! Minimal script model: just enough to build p2pkh locking scripts, build
//! signature unlocking scripts, and resolve locking scripts back to
//! addresses. No interpreter — this client never executes scripts.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::encoding::{base58check_encode, read_bytes, read_u8, read_varint, write_varint};
use crate::error::{Result, SpvError};
use crate::types::{Hash160, Network};

pub const OP_DUP: u8 = 0x76;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_CHECKSIG: u8 = 0xac;

const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;

/// One script element: either an opcode or a data push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cmd {
    Op(u8),
    Push(Vec<u8>),
}

/// An ordered sequence of script elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub cmds: Vec<Cmd>,
}

impl Script {
    pub fn empty() -> Self {
        Self { cmds: Vec::new() }
    }

    /// Standard pay-to-pubkey-hash locking script:
    /// `OP_DUP OP_HASH160 <h160> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(h160: &Hash160) -> Self {
        Self {
            cmds: vec![
                Cmd::Op(OP_DUP),
                Cmd::Op(OP_HASH160),
                Cmd::Push(h160.to_vec()),
                Cmd::Op(OP_EQUALVERIFY),
                Cmd::Op(OP_CHECKSIG),
            ],
        }
    }

    /// Unlocking script for a p2pkh input: `<sig> <sec pubkey>`.
    pub fn unlocking(signature: Vec<u8>, sec_pubkey: Vec<u8>) -> Self {
        Self {
            cmds: vec![Cmd::Push(signature), Cmd::Push(sec_pubkey)],
        }
    }

    /// Raw script bytes without the length prefix.
    pub fn raw(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for cmd in &self.cmds {
            match cmd {
                Cmd::Op(op) => out.push(*op),
                Cmd::Push(data) => {
                    let len = data.len();
                    if len <= 75 {
                        out.push(len as u8);
                    } else if len <= 0xff {
                        out.push(OP_PUSHDATA1);
                        out.push(len as u8);
                    } else {
                        out.push(OP_PUSHDATA2);
                        out.extend_from_slice(&(len as u16).to_le_bytes());
                    }
                    out.extend_from_slice(data);
                }
            }
        }
        out
    }

    /// Wire form: varint length followed by the raw bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let raw = self.raw();
        let mut out = Vec::with_capacity(raw.len() + 3);
        write_varint(&mut out, raw.len() as u64);
        out.extend_from_slice(&raw);
        out
    }

    /// Parse a length-prefixed script from the wire.
    pub fn parse(r: &mut impl Read) -> Result<Self> {
        let len = read_varint(r)? as usize;
        let raw = read_bytes(r, len)?;
        let mut cmds = Vec::new();
        let mut cursor = std::io::Cursor::new(&raw);
        let mut consumed = 0usize;
        while consumed < len {
            let byte = read_u8(&mut cursor)?;
            consumed += 1;
            match byte {
                1..=75 => {
                    cmds.push(Cmd::Push(read_bytes(&mut cursor, byte as usize)?));
                    consumed += byte as usize;
                }
                OP_PUSHDATA1 => {
                    let n = read_u8(&mut cursor)? as usize;
                    cmds.push(Cmd::Push(read_bytes(&mut cursor, n)?));
                    consumed += 1 + n;
                }
                OP_PUSHDATA2 => {
                    let n = u16::from_le_bytes(crate::encoding::read_array::<2>(&mut cursor)?) as usize;
                    cmds.push(Cmd::Push(read_bytes(&mut cursor, n)?));
                    consumed += 2 + n;
                }
                op => cmds.push(Cmd::Op(op)),
            }
        }
        if consumed != len {
            return Err(SpvError::Malformed("script overran its declared length".into()));
        }
        Ok(Self { cmds })
    }

    /// Extract the pubkey hash if this is a p2pkh locking script.
    pub fn p2pkh_hash160(&self) -> Option<Hash160> {
        match self.cmds.as_slice() {
            [Cmd::Op(OP_DUP), Cmd::Op(OP_HASH160), Cmd::Push(h), Cmd::Op(OP_EQUALVERIFY), Cmd::Op(OP_CHECKSIG)]
                if h.len() == 20 =>
            {
                let mut h160 = [0u8; 20];
                h160.copy_from_slice(h);
                Some(h160)
            }
            _ => None,
        }
    }

    /// Resolve a p2pkh locking script to its network address. Returns None
    /// for any other script shape.
    pub fn address(&self, network: Network) -> Option<String> {
        let h160 = self.p2pkh_hash160()?;
        Some(address_from_h160(&h160, network))
    }
}

/// Base58check address for a pubkey hash on the given network.
pub fn address_from_h160(h160: &Hash160, network: Network) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(network.address_prefix());
    payload.extend_from_slice(h160);
    base58check_encode(&payload)
}

/// Decode an address back to its 20-byte pubkey hash, checking the version
/// byte matches the expected network.
pub fn decode_address(address: &str, network: Network) -> Result<Hash160> {
    let payload = crate::encoding::base58check_decode(address)?;
    if payload.len() != 21 {
        return Err(SpvError::Malformed(format!(
            "address payload is {} bytes, expected 21",
            payload.len()
        )));
    }
    if payload[0] != network.address_prefix() {
        return Err(SpvError::Config(format!(
            "address version byte {:#04x} does not match network",
            payload[0]
        )));
    }
    let mut h160 = [0u8; 20];
    h160.copy_from_slice(&payload[1..]);
    Ok(h160)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_h160() -> Hash160 {
        crate::hashes::hash160(b"sample pubkey")
    }

    #[test]
    fn test_p2pkh_serialization_shape() {
        let script = Script::p2pkh(&sample_h160());
        let raw = script.raw();
        assert_eq!(raw.len(), 25);
        assert_eq!(raw[0], OP_DUP);
        assert_eq!(raw[1], OP_HASH160);
        assert_eq!(raw[2], 20);
        assert_eq!(raw[23], OP_EQUALVERIFY);
        assert_eq!(raw[24], OP_CHECKSIG);

        let serialized = script.serialize();
        assert_eq!(serialized[0], 25);
        assert_eq!(&serialized[1..], &raw[..]);
    }

    #[test]
    fn test_parse_roundtrip() {
        let script = Script::p2pkh(&sample_h160());
        let bytes = script.serialize();
        let parsed = Script::parse(&mut std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(parsed, script);
    }

    #[test]
    fn test_unlocking_roundtrip_with_long_push() {
        // A 76-byte push exercises the PUSHDATA1 path
        let script = Script::unlocking(vec![7u8; 76], vec![2u8; 33]);
        let parsed = Script::parse(&mut std::io::Cursor::new(script.serialize())).unwrap();
        assert_eq!(parsed, script);
    }

    #[test]
    fn test_address_resolution() {
        let h160 = sample_h160();
        let script = Script::p2pkh(&h160);
        let addr = script.address(Network::Testnet).unwrap();
        assert!(addr.starts_with('m') || addr.starts_with('n'));
        assert_eq!(decode_address(&addr, Network::Testnet).unwrap(), h160);

        let mainnet = script.address(Network::Mainnet).unwrap();
        assert!(mainnet.starts_with('1'));
        assert_ne!(mainnet, addr);
    }

    #[test]
    fn test_non_p2pkh_has_no_address() {
        let script = Script::unlocking(vec![1, 2, 3], vec![4, 5, 6]);
        assert!(script.address(Network::Testnet).is_none());
        assert!(Script::empty().address(Network::Mainnet).is_none());
    }

    #[test]
    fn test_decode_address_wrong_network() {
        let addr = address_from_h160(&sample_h160(), Network::Testnet);
        assert!(decode_address(&addr, Network::Mainnet).is_err());
    }

    #[test]
    fn test_parse_rejects_truncated_push() {
        // Declares a 10-byte script whose push runs past the end
        let bytes = vec![0x0a, 0x4b, 1, 2, 3];
        assert!(Script::parse(&mut std::io::Cursor::new(bytes)).is_err());
    }
}
