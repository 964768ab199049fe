//! Run configuration: peer endpoint, wallet seed, spend parameters, bloom
//! filter shape, and the timeouts bounding every wait in the workflow.

use std::time::Duration;

use crate::error::{Result, SpvError};
use crate::script::decode_address;
use crate::types::{Hash, Network};

/// Everything a [`crate::workflow::SpendWorkflow`] run needs, injected up
/// front so nothing is read from the environment mid-run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Peer hostname or address.
    pub peer_host: String,
    /// Peer port; the network's default port when absent.
    pub peer_port: Option<u16>,
    pub network: Network,
    /// Passphrase the wallet key is derived from.
    pub seed: String,
    /// Address the spend pays to.
    pub target_address: String,
    /// Fee in satoshis; the spend output is funding amount minus this.
    pub fee: u64,
    /// Last known block hash, internal order. Header sync starts after it.
    pub start_block: Hash,
    /// Bloom filter size in bytes.
    pub filter_size: u32,
    /// Hash functions per bloom filter element.
    pub filter_hash_count: u32,
    /// Bloom filter tweak, folded into every murmur3 seed.
    pub filter_tweak: u32,
    /// Cap on each single wait for a peer response.
    pub response_timeout: Duration,
    /// Cap on the whole merkleblock/tx scan after filtered blocks are
    /// requested.
    pub scan_timeout: Duration,
    /// Grace period between broadcasting the spend and asking for it back.
    pub broadcast_delay: Duration,
}

// "0000000000004ffbc4098514044473c1df118c2de621decb5f8d33262f483677"
// in internal byte order.
const DEFAULT_START_BLOCK: Hash = [
    0x77, 0x36, 0x48, 0x2f, 0x26, 0x33, 0x8d, 0x5f, 0xcb, 0xde, 0x21, 0xe6, 0x2d, 0x8c, 0x11,
    0xdf, 0xc1, 0x73, 0x44, 0x04, 0x14, 0x85, 0x09, 0xc4, 0xfb, 0x4f, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00,
];

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_host: "testnet.programmingbitcoin.com".to_string(),
            peer_port: None,
            network: Network::Testnet,
            seed: "banana_lick_gtkhhz@gmail.com".to_string(),
            target_address: "mv4rnyY3Su5gjcDNzbMLKBQkBicCtHUtFB".to_string(),
            fee: 696,
            start_block: DEFAULT_START_BLOCK,
            filter_size: 30,
            filter_hash_count: 5,
            filter_tweak: 912,
            response_timeout: Duration::from_secs(20),
            scan_timeout: Duration::from_secs(60),
            broadcast_delay: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Reject configurations that would only fail deep inside the workflow.
    pub fn validate(&self) -> Result<()> {
        if self.peer_host.is_empty() {
            return Err(SpvError::Config("peer host is empty".to_string()));
        }
        if self.seed.is_empty() {
            return Err(SpvError::Config("wallet seed is empty".to_string()));
        }
        if self.fee == 0 {
            return Err(SpvError::Config("fee must be positive".to_string()));
        }
        if self.filter_size == 0 || self.filter_hash_count == 0 {
            return Err(SpvError::Config(
                "bloom filter size and hash count must be positive".to_string(),
            ));
        }
        decode_address(&self.target_address, self.network).map_err(|e| {
            SpvError::Config(format!(
                "target address {} invalid for {:?}: {}",
                self.target_address, self.network, e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{display_hex, hash_from_display_hex};

    #[test]
    fn test_default_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_default_start_block_matches_display_form() {
        let expected =
            hash_from_display_hex("0000000000004ffbc4098514044473c1df118c2de621decb5f8d33262f483677")
                .unwrap();
        assert_eq!(DEFAULT_START_BLOCK, expected);
        assert_eq!(
            display_hex(&DEFAULT_START_BLOCK),
            "0000000000004ffbc4098514044473c1df118c2de621decb5f8d33262f483677"
        );
    }

    #[test]
    fn test_validate_rejects_zero_fee() {
        let config = Config {
            fee: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(SpvError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_filter() {
        let config = Config {
            filter_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_address_for_wrong_network() {
        let config = Config {
            network: Network::Mainnet,
            // Mainnet peer but a testnet address
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(SpvError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_mangled_address() {
        let mut config = Config::default();
        config.target_address.push('x');
        assert!(config.validate().is_err());
    }
}
