//! Core data model for the SPV sync-and-spend workflow

use serde::{Deserialize, Serialize};

use crate::script::Script;

/// Hash type: 256-bit hash, stored in internal (hash-output / wire) byte
/// order. Display hex is the byte-reversed form; see [`crate::encoding`].
pub type Hash = [u8; 32];

/// 160-bit public-key hash
pub type Hash160 = [u8; 20];

/// Which Bitcoin network the workflow talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Wire magic prefixing every message envelope.
    pub fn magic(&self) -> [u8; 4] {
        match self {
            Network::Mainnet => crate::constants::MAINNET_MAGIC,
            Network::Testnet => crate::constants::TESTNET_MAGIC,
        }
    }

    /// Version byte for base58check p2pkh addresses.
    pub fn address_prefix(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    /// Default peer port.
    pub fn default_port(&self) -> u16 {
        match self {
            Network::Mainnet => 8333,
            Network::Testnet => 18333,
        }
    }
}

/// Block header: the 80-byte chain commitment this client validates.
///
/// Invariant: `hash256(serialized header)`, read as a little-endian 256-bit
/// number, must be below the target decoded from `bits` (valid proof of
/// work). Headers link into a chain through `prev_block_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// Reference to a transaction output: txid (internal order) + output index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub index: u32,
}

/// Transaction input: previous output reference + unlocking script.
///
/// The unlocking script stays empty until [`crate::tx`] signing installs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TransactionInput {
    /// Input referencing `prevout` with an empty unlocking script.
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            script_sig: Script::empty(),
            sequence: crate::constants::SEQUENCE_FINAL,
        }
    }
}

/// Transaction output: amount in satoshis + locking script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_pubkey: Script,
}

/// Transaction: version, ordered inputs/outputs, locktime, network flag.
///
/// The network flag never hits the wire; it only selects the address
/// encoding when outputs are resolved back to addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
    pub network: Network,
}

/// The funding output the scanner discovered: everything the spend step
/// needs to consume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingOutput {
    pub outpoint: OutPoint,
    pub amount: u64,
    pub script_pubkey: Script,
}
