//! Protocol constants for the SPV client

/// Wire magic for mainnet message envelopes
pub const MAINNET_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

/// Wire magic for testnet message envelopes
pub const TESTNET_MAGIC: [u8; 4] = [0x0b, 0x11, 0x09, 0x07];

/// Protocol version advertised in the handshake
pub const PROTOCOL_VERSION: u32 = 70015;

/// User agent advertised in the handshake
pub const USER_AGENT: &str = "/spv-spend:0.1.0/";

/// Inventory type tag requesting a full transaction
pub const INV_TX: u32 = 1;

/// Inventory type tag requesting a bloom-filtered block
pub const INV_FILTERED_BLOCK: u32 = 3;

/// Sighash flag: signature commits to all inputs and outputs
pub const SIGHASH_ALL: u32 = 1;

/// BIP37 per-round seed multiplier for bloom filter hashing
pub const BIP37_SEED_MULTIPLIER: u32 = 0xfba4c795;

/// Sequence number for a final (non-replaceable) input
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Maximum headers a peer may return for one getheaders request
pub const MAX_HEADERS_PER_BATCH: usize = 2000;

/// Maximum payload size accepted from a peer: 4MB
pub const MAX_PAYLOAD_SIZE: usize = 4_000_000;
