//! The end-to-end spend workflow: handshake, filter load, header sync,
//! filtered-block scan, spend construction, broadcast, and echo
//! confirmation, driven as an explicit state machine.

use std::thread;

use serde::{Deserialize, Serialize};

use crate::bloom::BloomFilter;
use crate::config::Config;
use crate::encoding::display_hex;
use crate::error::{Result, SpvError};
use crate::headers::HeaderChain;
use crate::keys::PrivateKey;
use crate::peer::PeerSession;
use crate::scanner::UtxoScanner;
use crate::script::{decode_address, Script};
use crate::types::Transaction;
use crate::wire::{GetDataMessage, GetHeadersMessage, Message, MessageKind};

/// Where a run currently stands. Transitions are strictly forward and
/// every run ends in one of the three terminal states: `Confirmed`,
/// `Unconfirmed` (broadcast but never echoed back), or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    Disconnected,
    Handshaking,
    FilterLoaded,
    AwaitingHeaders,
    RequestingBlocks,
    ScanningForUtxo,
    Spending,
    Broadcast,
    AwaitingConfirmation,
    Confirmed,
    Unconfirmed,
    Failed,
}

/// Whether the peer echoed the broadcast transaction back.
///
/// `Unconfirmed` is a soft outcome, not an error: the spend was built,
/// signed, and sent, but the peer did not return the same transaction id
/// within the settle window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    Confirmed,
    Unconfirmed,
}

/// The result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendOutcome {
    /// Transaction id of the spend, display-order hex.
    pub txid: String,
    /// Hex of the signed transaction as broadcast.
    pub raw_tx: String,
    pub confirmation: Confirmation,
    /// Transaction id of the discovered funding output, display-order hex.
    pub funding_txid: String,
    pub funding_vout: u32,
    pub funding_amount: u64,
}

/// One spend, one peer, one run.
pub struct SpendWorkflow {
    config: Config,
    key: PrivateKey,
    state: WorkflowState,
}

impl SpendWorkflow {
    /// Validate the configuration and derive the wallet key.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let key = PrivateKey::from_seed(config.seed.as_bytes())?;
        tracing::info!(
            address = %key.address(config.network),
            "wallet key derived"
        );
        Ok(Self {
            config,
            key,
            state: WorkflowState::Disconnected,
        })
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// The address whose funds this run spends.
    pub fn wallet_address(&self) -> String {
        self.key.address(self.config.network)
    }

    fn transition(&mut self, next: WorkflowState) {
        tracing::info!(from = ?self.state, to = ?next, "state");
        self.state = next;
    }

    /// Run the workflow to completion. Any error transitions to `Failed`
    /// before propagating; `Unconfirmed` is reported in the outcome, not
    /// as an error.
    pub fn run(&mut self) -> Result<SpendOutcome> {
        match self.run_inner() {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.transition(WorkflowState::Failed);
                Err(e)
            }
        }
    }

    fn run_inner(&mut self) -> Result<SpendOutcome> {
        let network = self.config.network;

        self.transition(WorkflowState::Handshaking);
        let mut peer = PeerSession::connect(
            &self.config.peer_host,
            self.config.peer_port,
            network,
            self.config.response_timeout,
        )?;
        peer.handshake()?;

        // Watch our pubkey hash so the peer relays matching transactions
        let mut filter = BloomFilter::new(
            self.config.filter_size,
            self.config.filter_hash_count,
            self.config.filter_tweak,
        );
        filter.add(&self.key.hash160());
        peer.send(&filter)?;
        self.transition(WorkflowState::FilterLoaded);

        self.transition(WorkflowState::AwaitingHeaders);
        peer.send(&GetHeadersMessage {
            start_block: self.config.start_block,
        })?;
        let headers = match peer.wait_for(&[MessageKind::Headers])? {
            Message::Headers(headers) => headers,
            other => {
                return Err(SpvError::Malformed(format!(
                    "expected headers, got {:?}",
                    other.kind()
                )))
            }
        };
        tracing::info!(count = headers.len(), "headers received");

        let mut chain = HeaderChain::new(Some(self.config.start_block));
        let fetch = chain.extend(&headers)?;
        if fetch.is_empty() {
            return Err(SpvError::Connectivity(
                "peer returned no headers past the start block".to_string(),
            ));
        }

        self.transition(WorkflowState::RequestingBlocks);
        let mut getdata = GetDataMessage::new();
        for hash in &fetch {
            getdata.add_filtered_block(*hash);
        }
        peer.send(&getdata)?;

        self.transition(WorkflowState::ScanningForUtxo);
        let scanner = UtxoScanner::new(self.wallet_address(), network);
        let funding = scanner.scan(&mut peer, self.config.scan_timeout)?;

        self.transition(WorkflowState::Spending);
        let target_h160 = decode_address(&self.config.target_address, network)?;
        let mut tx = Transaction::spend(
            &funding,
            self.config.fee,
            Script::p2pkh(&target_h160),
            network,
        )?;
        tx.sign_input(0, &self.key, &funding.script_pubkey)?;
        let txid = tx.txid();
        tracing::info!(
            txid = %tx.id_hex(),
            amount = funding.amount - self.config.fee,
            fee = self.config.fee,
            "spend signed"
        );

        peer.send(&tx)?;
        self.transition(WorkflowState::Broadcast);

        thread::sleep(self.config.broadcast_delay);

        self.transition(WorkflowState::AwaitingConfirmation);
        let mut echo_request = GetDataMessage::new();
        echo_request.add_transaction(txid);
        peer.send(&echo_request)?;

        let confirmation = match peer.wait_for(&[MessageKind::Tx]) {
            Ok(Message::Tx(echoed)) if echoed.txid() == txid => Confirmation::Confirmed,
            Ok(Message::Tx(echoed)) => {
                tracing::warn!(echoed = %echoed.id_hex(), "peer echoed a different transaction");
                Confirmation::Unconfirmed
            }
            Ok(other) => {
                return Err(SpvError::Malformed(format!(
                    "expected tx echo, got {:?}",
                    other.kind()
                )))
            }
            // A peer that never echoes is a soft failure: the spend was
            // still broadcast
            Err(SpvError::Timeout(_)) => {
                tracing::warn!("peer did not echo the transaction in time");
                Confirmation::Unconfirmed
            }
            Err(e) => return Err(e),
        };

        match confirmation {
            Confirmation::Confirmed => {
                self.transition(WorkflowState::Confirmed);
                tracing::info!(txid = %tx.id_hex(), "spend confirmed by peer echo");
            }
            Confirmation::Unconfirmed => self.transition(WorkflowState::Unconfirmed),
        }

        Ok(SpendOutcome {
            txid: tx.id_hex(),
            raw_tx: hex::encode(tx.serialize()),
            confirmation,
            funding_txid: display_hex(&funding.outpoint.txid),
            funding_vout: funding.outpoint.index,
            funding_amount: funding.amount,
        })
    }
}
