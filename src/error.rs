//! Error types for the SPV sync-and-spend workflow

use thiserror::Error;

/// Failure taxonomy for one synchronization/spend run.
///
/// Protocol violations (bad proof of work, broken linkage, rejected merkle
/// proofs, malformed messages) indicate a byzantine or buggy peer and are
/// never retried: the whole session aborts. Connectivity and timeout
/// failures are surfaced separately so a caller may choose a different peer.
/// Precondition failures are caller errors and fatal to the spend step.
#[derive(Error, Debug)]
pub enum SpvError {
    #[error("invalid proof of work at header index {0}")]
    InvalidProofOfWork(usize),

    #[error("broken header chain at index {0}: prev_block_hash does not match accepted tip")]
    BrokenHeaderChain(usize),

    #[error("merkle inclusion proof rejected for block {0}")]
    InvalidMerkleProof(String),

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("connectivity failure: {0}")]
    Connectivity(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SpvError {
    /// True for failures that mean the peer fed us unverifiable or forged
    /// data. These abort the session and must never be retried against the
    /// same peer.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            SpvError::InvalidProofOfWork(_)
                | SpvError::BrokenHeaderChain(_)
                | SpvError::InvalidMerkleProof(_)
                | SpvError::Malformed(_)
        )
    }
}

impl From<std::io::Error> for SpvError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
                SpvError::Timeout(err.to_string())
            }
            _ => SpvError::Connectivity(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SpvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_violations_are_flagged() {
        assert!(SpvError::InvalidProofOfWork(0).is_protocol_violation());
        assert!(SpvError::BrokenHeaderChain(3).is_protocol_violation());
        assert!(SpvError::InvalidMerkleProof("00".into()).is_protocol_violation());
        assert!(SpvError::Malformed("bad varint".into()).is_protocol_violation());
    }

    #[test]
    fn test_soft_failures_are_not_protocol_violations() {
        assert!(!SpvError::Connectivity("refused".into()).is_protocol_violation());
        assert!(!SpvError::Timeout("headers".into()).is_protocol_violation());
        assert!(!SpvError::Precondition("fee too high".into()).is_protocol_violation());
    }

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        assert!(matches!(SpvError::from(io), SpvError::Timeout(_)));

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(SpvError::from(io), SpvError::Connectivity(_)));
    }
}
