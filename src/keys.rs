//! Wallet key: a secp256k1 scalar derived deterministically from a
//! passphrase seed, plus the address/signing operations the workflow needs.

use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};

use crate::error::{Result, SpvError};
use crate::hashes::{hash160, hash256};
use crate::script::address_from_h160;
use crate::types::{Hash, Hash160, Network};

/// Private scalar and derived public point. Generated once at startup and
/// immutable for the life of the process.
pub struct PrivateKey {
    secp: Secp256k1<All>,
    secret: SecretKey,
    public: PublicKey,
}

impl PrivateKey {
    /// Derive the key from a passphrase: secret = hash256(seed) as scalar.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        let secp = Secp256k1::new();
        let digest = hash256(seed);
        let secret = SecretKey::from_slice(&digest)
            .map_err(|e| SpvError::Config(format!("seed does not derive a valid key: {}", e)))?;
        let public = PublicKey::from_secret_key(&secp, &secret);
        Ok(Self { secp, secret, public })
    }

    /// Compressed SEC encoding of the public point.
    pub fn public_sec(&self) -> [u8; 33] {
        self.public.serialize()
    }

    /// hash160 of the compressed public key; the value the bloom filter
    /// watches and p2pkh scripts lock to.
    pub fn hash160(&self) -> Hash160 {
        hash160(&self.public_sec())
    }

    /// Network address string for this key.
    pub fn address(&self, network: Network) -> String {
        address_from_h160(&self.hash160(), network)
    }

    /// Sign a 32-byte digest, returning the DER-encoded signature.
    /// Deterministic (RFC 6979); signing the same digest twice yields the
    /// same bytes.
    pub fn sign(&self, digest: &Hash) -> Result<Vec<u8>> {
        let message = Message::from_digest_slice(digest)
            .map_err(|e| SpvError::Signing(e.to_string()))?;
        let signature = self.secp.sign_ecdsa(&message, &self.secret);
        Ok(signature.serialize_der().to_vec())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret scalar
        f.debug_struct("PrivateKey")
            .field("public", &hex::encode(self.public_sec()))
            .finish()
    }
}
