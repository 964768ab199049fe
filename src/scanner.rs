//! UTXO discovery: consumes the filtered-block / transaction stream until
//! the one output paying the watched address is found.

use std::time::{Duration, Instant};

use crate::encoding::display_hex;
use crate::error::{Result, SpvError};
use crate::peer::PeerSession;
use crate::types::{FundingOutput, Network, OutPoint};
use crate::wire::{Message, MessageKind};

/// Scans merkleblock/tx messages for an output locked to one address.
///
/// Merkle blocks failing their inclusion proof are fatal for the whole
/// session. The first matching output wins; later messages are ignored.
#[derive(Debug, Clone)]
pub struct UtxoScanner {
    address: String,
    network: Network,
}

impl UtxoScanner {
    pub fn new(address: impl Into<String>, network: Network) -> Self {
        Self {
            address: address.into(),
            network,
        }
    }

    /// Inspect one message. Returns the funding output when a transaction
    /// pays the watched address, `None` when the message is valid but
    /// carries no match, and an error on a rejected inclusion proof.
    pub fn inspect(&self, message: &Message) -> Result<Option<FundingOutput>> {
        match message {
            Message::MerkleBlock(block) => {
                if !block.is_valid() {
                    return Err(SpvError::InvalidMerkleProof(display_hex(&block.block_hash())));
                }
                tracing::debug!(block = %display_hex(&block.block_hash()), "inclusion proof ok");
                Ok(None)
            }
            Message::Tx(tx) => {
                for (index, output) in tx.outputs.iter().enumerate() {
                    if output.script_pubkey.address(self.network).as_deref()
                        == Some(self.address.as_str())
                    {
                        let found = FundingOutput {
                            outpoint: OutPoint {
                                txid: tx.txid(),
                                index: index as u32,
                            },
                            amount: output.value,
                            script_pubkey: output.script_pubkey.clone(),
                        };
                        tracing::info!(
                            txid = %tx.id_hex(),
                            vout = index,
                            amount = output.value,
                            "funding output found"
                        );
                        return Ok(Some(found));
                    }
                }
                Ok(None)
            }
            other => Err(SpvError::Malformed(format!(
                "scanner fed unexpected message kind {:?}",
                other.kind()
            ))),
        }
    }

    /// Drive the peer until a funding output appears or `deadline` worth
    /// of waiting has elapsed. The per-message wait is already bounded by
    /// the session timeout; this bounds the loop as a whole.
    pub fn scan(&self, peer: &mut PeerSession, deadline: Duration) -> Result<FundingOutput> {
        let cutoff = Instant::now() + deadline;
        loop {
            if Instant::now() >= cutoff {
                return Err(SpvError::Timeout(format!(
                    "no output paying {} within {:?}",
                    self.address, deadline
                )));
            }
            let message = peer.wait_for(&[MessageKind::MerkleBlock, MessageKind::Tx])?;
            if let Some(found) = self.inspect(&message)? {
                return Ok(found);
            }
        }
    }
}
