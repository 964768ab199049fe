//! Single-peer session: blocking TCP transport with typed send and a
//! type-filtered, timeout-bounded wait.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::error::{Result, SpvError};
use crate::types::Network;
use crate::wire::{Envelope, Message, MessageKind, PongMessage, VerackMessage, VersionMessage, WireMessage};

/// One connection to one peer, owned exclusively for the lifetime of a
/// workflow run. All calls block; `wait_for` is the sole suspension point
/// and is bounded by `timeout` so a silent or malicious peer cannot hang
/// the process.
pub struct PeerSession {
    stream: TcpStream,
    network: Network,
    timeout: Duration,
    handshake_complete: bool,
}

impl PeerSession {
    /// Connect to `host` (default port for the network if none is given).
    pub fn connect(
        host: &str,
        port: Option<u16>,
        network: Network,
        timeout: Duration,
    ) -> Result<Self> {
        let port = port.unwrap_or_else(|| network.default_port());
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| SpvError::Connectivity(format!("cannot resolve {}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| {
                SpvError::Connectivity(format!("no addresses for {}:{}", host, port))
            })?;
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| SpvError::Connectivity(format!("connect to {} failed: {}", addr, e)))?;
        stream.set_read_timeout(Some(timeout)).map_err(SpvError::from)?;
        stream.set_write_timeout(Some(timeout)).map_err(SpvError::from)?;
        tracing::info!(peer = %addr, ?network, "connected");
        Ok(Self {
            stream,
            network,
            timeout,
            handshake_complete: false,
        })
    }

    /// Exchange version/verack. Blocks until the peer acknowledges or the
    /// timeout expires.
    pub fn handshake(&mut self) -> Result<()> {
        self.send(&VersionMessage::new())?;
        self.wait_for(&[MessageKind::Verack])?;
        self.handshake_complete = true;
        tracing::info!("handshake complete");
        Ok(())
    }

    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_complete
    }

    /// Send one framed message.
    pub fn send(&mut self, message: &impl WireMessage) -> Result<()> {
        let envelope = Envelope::for_message(message);
        tracing::debug!(command = message.command(), bytes = envelope.payload.len(), "send");
        self.stream
            .write_all(&envelope.serialize(self.network.magic()))
            .map_err(SpvError::from)
    }

    /// Block until a message whose kind is in `kinds` arrives.
    ///
    /// Session housekeeping happens transparently: pings are answered with
    /// pongs and an incoming version is acknowledged with verack. Anything
    /// else outside the filter is logged and dropped. Errors out if the
    /// deadline passes before a matching message arrives.
    pub fn wait_for(&mut self, kinds: &[MessageKind]) -> Result<Message> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if Instant::now() >= deadline {
                return Err(SpvError::Timeout(format!("{:?}", kinds)));
            }
            let envelope = Envelope::read(&mut self.stream, self.network.magic())?;
            let message = Message::from_envelope(envelope, self.network)?;
            if kinds.contains(&message.kind()) {
                tracing::debug!(kind = ?message.kind(), "received");
                return Ok(message);
            }
            match &message {
                Message::Ping(nonce) => self.send(&PongMessage(*nonce))?,
                Message::Version(version) => {
                    tracing::debug!(agent = %version.user_agent, "peer version");
                    self.send(&VerackMessage)?;
                }
                other => {
                    tracing::debug!(kind = ?other.kind(), "discarding unrequested message");
                }
            }
        }
    }
}
