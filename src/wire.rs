//! Wire codec: the message envelope and the typed messages the workflow
//! exchanges with a peer.

use std::io::Read;

use crate::bloom::BloomFilter;
use crate::constants::{
    INV_FILTERED_BLOCK, INV_TX, MAX_HEADERS_PER_BATCH, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION,
    USER_AGENT,
};
use crate::encoding::{read_bytes, read_u32_le, read_u64_le, read_u8, read_varint, write_varint};
use crate::error::{Result, SpvError};
use crate::hashes::hash256;
use crate::headers::parse_header;
use crate::merkle::MerkleBlock;
use crate::types::{BlockHeader, Hash, Network, Transaction};

/// An outgoing message: a command string plus a serialized payload.
pub trait WireMessage {
    fn command(&self) -> &'static str;
    fn payload(&self) -> Vec<u8>;
}

/// Message envelope framing every exchange: network magic, NUL-padded
/// command, payload length, double-SHA checksum, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub command: String,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(command: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            command: command.into(),
            payload,
        }
    }

    pub fn for_message(message: &impl WireMessage) -> Self {
        Self::new(message.command(), message.payload())
    }

    /// Frame for the wire under the given network magic.
    pub fn serialize(&self, magic: [u8; 4]) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.payload.len());
        out.extend_from_slice(&magic);
        let mut command = [0u8; 12];
        command[..self.command.len()].copy_from_slice(self.command.as_bytes());
        out.extend_from_slice(&command);
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&hash256(&self.payload)[..4]);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Read one envelope off the wire, validating magic and checksum.
    ///
    /// Socket-level failures surface as connectivity/timeout errors;
    /// framing violations are protocol violations.
    pub fn read(r: &mut impl Read, magic: [u8; 4]) -> Result<Self> {
        let received_magic = read_exact_io::<4>(r)?;
        if received_magic != magic {
            return Err(SpvError::Malformed(format!(
                "wrong network magic {}",
                hex::encode(received_magic)
            )));
        }
        let command_bytes = read_exact_io::<12>(r)?;
        let end = command_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(command_bytes.len());
        let command = std::str::from_utf8(&command_bytes[..end])
            .map_err(|_| SpvError::Malformed("non-ascii command".into()))?
            .to_string();
        let length = u32::from_le_bytes(read_exact_io::<4>(r)?) as usize;
        if length > MAX_PAYLOAD_SIZE {
            return Err(SpvError::Malformed(format!(
                "payload of {} bytes exceeds the {} limit",
                length, MAX_PAYLOAD_SIZE
            )));
        }
        let checksum = read_exact_io::<4>(r)?;
        let mut payload = vec![0u8; length];
        r.read_exact(&mut payload).map_err(SpvError::from)?;
        if hash256(&payload)[..4] != checksum {
            return Err(SpvError::Malformed("envelope checksum mismatch".into()));
        }
        Ok(Self { command, payload })
    }
}

fn read_exact_io<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf).map_err(SpvError::from)?;
    Ok(buf)
}

/// Handshake message advertising our version to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: u32,
    pub services: u64,
    pub timestamp: u64,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: u32,
    pub relay: bool,
}

impl VersionMessage {
    /// Our advertisement. `relay: false` so the peer holds transactions
    /// back until the bloom filter is loaded.
    pub fn new() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            services: 0,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            nonce: rand::random(),
            user_agent: USER_AGENT.to_string(),
            start_height: 0,
            relay: false,
        }
    }

    pub fn parse(r: &mut impl Read) -> Result<Self> {
        let version = read_u32_le(r)?;
        let services = read_u64_le(r)?;
        let timestamp = read_u64_le(r)?;
        // Receiver and sender address blocks: services + ip + port
        let _ = read_bytes(r, 26)?;
        let _ = read_bytes(r, 26)?;
        let nonce = read_u64_le(r)?;
        let agent_len = read_varint(r)? as usize;
        let user_agent = String::from_utf8(read_bytes(r, agent_len)?)
            .map_err(|_| SpvError::Malformed("non-utf8 user agent".into()))?;
        let start_height = read_u32_le(r)?;
        // The relay flag is optional in old protocol versions
        let relay = matches!(read_u8(r), Ok(b) if b != 0);
        Ok(Self {
            version,
            services,
            timestamp,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

impl Default for VersionMessage {
    fn default() -> Self {
        Self::new()
    }
}

fn write_net_address(out: &mut Vec<u8>, services: u64) {
    out.extend_from_slice(&services.to_le_bytes());
    // IPv4-mapped 0.0.0.0
    let mut ip = [0u8; 16];
    ip[10] = 0xff;
    ip[11] = 0xff;
    out.extend_from_slice(&ip);
    out.extend_from_slice(&0u16.to_be_bytes());
}

impl WireMessage for VersionMessage {
    fn command(&self) -> &'static str {
        "version"
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        write_net_address(&mut out, self.services);
        write_net_address(&mut out, self.services);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        write_varint(&mut out, self.user_agent.len() as u64);
        out.extend_from_slice(self.user_agent.as_bytes());
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out.push(self.relay as u8);
        out
    }
}

/// Handshake acknowledgement; empty payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerackMessage;

impl WireMessage for VerackMessage {
    fn command(&self) -> &'static str {
        "verack"
    }

    fn payload(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// Keepalive response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMessage(pub u64);

impl WireMessage for PongMessage {
    fn command(&self) -> &'static str {
        "pong"
    }

    fn payload(&self) -> Vec<u8> {
        self.0.to_le_bytes().to_vec()
    }
}

impl WireMessage for BloomFilter {
    fn command(&self) -> &'static str {
        "filterload"
    }

    fn payload(&self) -> Vec<u8> {
        self.filterload_payload()
    }
}

impl WireMessage for Transaction {
    fn command(&self) -> &'static str {
        "tx"
    }

    fn payload(&self) -> Vec<u8> {
        self.serialize()
    }
}

/// Request for headers following `start_block` (internal order), with no
/// stop hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetHeadersMessage {
    pub start_block: Hash,
}

impl WireMessage for GetHeadersMessage {
    fn command(&self) -> &'static str {
        "getheaders"
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(69);
        out.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
        write_varint(&mut out, 1);
        out.extend_from_slice(&self.start_block);
        out.extend_from_slice(&[0u8; 32]);
        out
    }
}

/// Batched data request: filtered blocks and/or full transactions by hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetDataMessage {
    pub items: Vec<(u32, Hash)>,
}

impl GetDataMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_filtered_block(&mut self, hash: Hash) {
        self.items.push((INV_FILTERED_BLOCK, hash));
    }

    pub fn add_transaction(&mut self, hash: Hash) {
        self.items.push((INV_TX, hash));
    }
}

impl WireMessage for GetDataMessage {
    fn command(&self) -> &'static str {
        "getdata"
    }

    fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_varint(&mut out, self.items.len() as u64);
        for (item_type, hash) in &self.items {
            out.extend_from_slice(&item_type.to_le_bytes());
            out.extend_from_slice(hash);
        }
        out
    }
}

/// The kinds of incoming traffic `wait_for` can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Version,
    Verack,
    Ping,
    Pong,
    Headers,
    MerkleBlock,
    Tx,
    Unknown,
}

/// A parsed incoming message.
#[derive(Debug, Clone)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Ping(u64),
    Pong(u64),
    Headers(Vec<BlockHeader>),
    MerkleBlock(MerkleBlock),
    Tx(Transaction),
    Unknown { command: String },
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Version(_) => MessageKind::Version,
            Message::Verack => MessageKind::Verack,
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::Headers(_) => MessageKind::Headers,
            Message::MerkleBlock(_) => MessageKind::MerkleBlock,
            Message::Tx(_) => MessageKind::Tx,
            Message::Unknown { .. } => MessageKind::Unknown,
        }
    }

    /// Decode an envelope into a typed message. Commands this client does
    /// not consume parse to `Unknown` and are discarded upstream.
    pub fn from_envelope(envelope: Envelope, network: Network) -> Result<Self> {
        let mut cursor = std::io::Cursor::new(&envelope.payload);
        match envelope.command.as_str() {
            "version" => Ok(Message::Version(VersionMessage::parse(&mut cursor)?)),
            "verack" => Ok(Message::Verack),
            "ping" => Ok(Message::Ping(read_u64_le(&mut cursor)?)),
            "pong" => Ok(Message::Pong(read_u64_le(&mut cursor)?)),
            "headers" => {
                let count = read_varint(&mut cursor)?;
                if count > MAX_HEADERS_PER_BATCH as u64 {
                    return Err(SpvError::Malformed(format!(
                        "headers count of {} exceeds the {} limit",
                        count, MAX_HEADERS_PER_BATCH
                    )));
                }
                let mut headers = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    headers.push(parse_header(&mut cursor)?);
                    let tx_count = read_varint(&mut cursor)?;
                    if tx_count != 0 {
                        return Err(SpvError::Malformed(
                            "headers entry carries a non-zero tx count".into(),
                        ));
                    }
                }
                Ok(Message::Headers(headers))
            }
            "merkleblock" => Ok(Message::MerkleBlock(MerkleBlock::parse(&mut cursor)?)),
            "tx" => Ok(Message::Tx(Transaction::parse(&mut cursor, network)?)),
            _ => Ok(Message::Unknown {
                command: envelope.command,
            }),
        }
    }
}
