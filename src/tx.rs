//! Transaction codec, identifiers, sighash computation, signing, and the
//! single-input single-output spend builder.

use std::io::Read;

use crate::constants::SIGHASH_ALL;
use crate::encoding::{
    bounded_capacity, display_hex, read_hash, read_u32_le, read_u64_le, read_varint, write_varint,
};
use crate::error::{Result, SpvError};
use crate::hashes::hash256;
use crate::keys::PrivateKey;
use crate::script::Script;
use crate::types::{
    FundingOutput, Hash, Network, OutPoint, Transaction, TransactionInput, TransactionOutput,
};

impl Transaction {
    /// Build the spend: one input consuming `funding`, one output of
    /// `funding.amount - fee` locked by `target_script`. No change output.
    ///
    /// Requires `funding.amount > fee`; a fee that meets or exceeds the
    /// funding amount is a precondition failure, never a silently negative
    /// or zero-value output.
    pub fn spend(
        funding: &FundingOutput,
        fee: u64,
        target_script: Script,
        network: Network,
    ) -> Result<Self> {
        if fee >= funding.amount {
            return Err(SpvError::Precondition(format!(
                "fee {} must be below the funding amount {}",
                fee, funding.amount
            )));
        }
        Ok(Self {
            version: 1,
            inputs: vec![TransactionInput::new(funding.outpoint.clone())],
            outputs: vec![TransactionOutput {
                value: funding.amount - fee,
                script_pubkey: target_script,
            }],
            lock_time: 0,
            network,
        })
    }

    /// Serialize to the legacy wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.prevout.txid);
            out.extend_from_slice(&input.prevout.index.to_le_bytes());
            out.extend_from_slice(&input.script_sig.serialize());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            out.extend_from_slice(&output.script_pubkey.serialize());
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Parse from the legacy wire format.
    pub fn parse(r: &mut impl Read, network: Network) -> Result<Self> {
        let version = read_u32_le(r)?;
        let input_count = read_varint(r)?;
        // Outpoint + empty script + sequence is the smallest encodable input
        let mut inputs = Vec::with_capacity(bounded_capacity(input_count, 41));
        for _ in 0..input_count {
            let txid = read_hash(r)?;
            let index = read_u32_le(r)?;
            let script_sig = Script::parse(r)?;
            let sequence = read_u32_le(r)?;
            inputs.push(TransactionInput {
                prevout: OutPoint { txid, index },
                script_sig,
                sequence,
            });
        }
        let output_count = read_varint(r)?;
        let mut outputs = Vec::with_capacity(bounded_capacity(output_count, 9));
        for _ in 0..output_count {
            let value = read_u64_le(r)?;
            let script_pubkey = Script::parse(r)?;
            outputs.push(TransactionOutput { value, script_pubkey });
        }
        let lock_time = read_u32_le(r)?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
            network,
        })
    }

    /// Transaction id in internal (wire) order: the double-hash of the
    /// serialization. Mutating the transaction after signing changes this.
    pub fn txid(&self) -> Hash {
        hash256(&self.serialize())
    }

    /// Transaction id as display-order hex.
    pub fn id_hex(&self) -> String {
        display_hex(&self.txid())
    }

    /// Legacy SIGHASH_ALL digest for one input: the transaction serialized
    /// with that input's script replaced by the funding output's locking
    /// script, every other input script empty, and the hash type appended.
    pub fn sig_hash(&self, input_index: usize, prev_script: &Script) -> Result<Hash> {
        if input_index >= self.inputs.len() {
            return Err(SpvError::Precondition(format!(
                "input index {} out of range for {} inputs",
                input_index,
                self.inputs.len()
            )));
        }
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for (i, input) in self.inputs.iter().enumerate() {
            out.extend_from_slice(&input.prevout.txid);
            out.extend_from_slice(&input.prevout.index.to_le_bytes());
            if i == input_index {
                out.extend_from_slice(&prev_script.serialize());
            } else {
                out.extend_from_slice(&Script::empty().serialize());
            }
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            out.extend_from_slice(&output.script_pubkey.serialize());
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out.extend_from_slice(&SIGHASH_ALL.to_le_bytes());
        Ok(hash256(&out))
    }

    /// Sign one input with `key` and install the unlocking script in place.
    ///
    /// Inputs and outputs must be frozen before this call: any mutation
    /// afterwards invalidates both the signature and the transaction id.
    pub fn sign_input(
        &mut self,
        input_index: usize,
        key: &PrivateKey,
        prev_script: &Script,
    ) -> Result<()> {
        let digest = self.sig_hash(input_index, prev_script)?;
        let mut signature = key.sign(&digest)?;
        signature.push(SIGHASH_ALL as u8);
        self.inputs[input_index].script_sig =
            Script::unlocking(signature, key.public_sec().to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SEQUENCE_FINAL;
    use crate::script::decode_address;

    fn funding(amount: u64) -> (PrivateKey, FundingOutput) {
        let key = PrivateKey::from_seed(b"tx test key").unwrap();
        let funding = FundingOutput {
            outpoint: OutPoint {
                txid: [0x11; 32],
                index: 1,
            },
            amount,
            script_pubkey: Script::p2pkh(&key.hash160()),
        };
        (key, funding)
    }

    fn target_script() -> Script {
        let target = PrivateKey::from_seed(b"tx test target").unwrap();
        Script::p2pkh(&target.hash160())
    }

    #[test]
    fn test_spend_arithmetic() {
        let (_, funding) = funding(10_000);
        let tx = Transaction::spend(&funding, 696, target_script(), Network::Testnet).unwrap();
        assert_eq!(tx.outputs.len(), 1);
        assert_eq!(tx.outputs[0].value, 9_304);
        assert_eq!(tx.inputs.len(), 1);
        assert_eq!(tx.inputs[0].prevout, funding.outpoint);
        assert_eq!(tx.inputs[0].sequence, SEQUENCE_FINAL);
    }

    #[test]
    fn test_spend_precondition_fee_too_high() {
        let (_, funding) = funding(500);
        for fee in [500u64, 501, u64::MAX] {
            let result = Transaction::spend(&funding, fee, target_script(), Network::Testnet);
            assert!(matches!(result, Err(SpvError::Precondition(_))), "fee {}", fee);
        }
    }

    #[test]
    fn test_parse_rejects_absurd_claimed_input_count() {
        // Four bytes of version, then a count no real payload could hold
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        write_varint(&mut bytes, u64::MAX);
        let result = Transaction::parse(&mut std::io::Cursor::new(bytes), Network::Testnet);
        assert!(matches!(result, Err(SpvError::Malformed(_))));
    }

    #[test]
    fn test_serialize_parse_roundtrip_is_byte_identical() {
        let (key, funding) = funding(10_000);
        let mut tx = Transaction::spend(&funding, 696, target_script(), Network::Testnet).unwrap();
        tx.sign_input(0, &key, &funding.script_pubkey).unwrap();

        let first = tx.serialize();
        let parsed =
            Transaction::parse(&mut std::io::Cursor::new(&first), Network::Testnet).unwrap();
        let second = parsed.serialize();
        assert_eq!(first, second);
        assert_eq!(parsed.txid(), tx.txid());
    }

    #[test]
    fn test_txid_changes_after_signing() {
        let (key, funding) = funding(10_000);
        let mut tx = Transaction::spend(&funding, 696, target_script(), Network::Testnet).unwrap();
        let unsigned_id = tx.txid();
        tx.sign_input(0, &key, &funding.script_pubkey).unwrap();
        assert_ne!(tx.txid(), unsigned_id);
        // Signing is deterministic, so the id is stable across re-signs
        let id = tx.txid();
        tx.sign_input(0, &key, &funding.script_pubkey).unwrap();
        assert_eq!(tx.txid(), id);
    }

    #[test]
    fn test_signature_verifies_against_sighash() {
        use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1};

        let (key, funding) = funding(10_000);
        let mut tx = Transaction::spend(&funding, 696, target_script(), Network::Testnet).unwrap();
        tx.sign_input(0, &key, &funding.script_pubkey).unwrap();

        // The installed unlocking script must carry a DER signature (plus
        // hash type byte) that verifies over the sighash digest
        let cmds = &tx.inputs[0].script_sig.cmds;
        let (sig_bytes, sec_bytes) = match cmds.as_slice() {
            [crate::script::Cmd::Push(sig), crate::script::Cmd::Push(sec)] => (sig, sec),
            other => panic!("unexpected unlocking script shape: {:?}", other),
        };
        assert_eq!(*sig_bytes.last().unwrap(), SIGHASH_ALL as u8);
        assert_eq!(sec_bytes.len(), 33);

        let digest = tx.sig_hash(0, &funding.script_pubkey).unwrap();
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(&digest).unwrap();
        let signature = Signature::from_der(&sig_bytes[..sig_bytes.len() - 1]).unwrap();
        let public = PublicKey::from_slice(sec_bytes).unwrap();
        assert!(secp.verify_ecdsa(&message, &signature, &public).is_ok());
    }

    #[test]
    fn test_sig_hash_rejects_bad_index() {
        let (_, funding) = funding(10_000);
        let tx = Transaction::spend(&funding, 696, target_script(), Network::Testnet).unwrap();
        assert!(tx.sig_hash(1, &funding.script_pubkey).is_err());
    }

    #[test]
    fn test_output_resolves_to_target_address() {
        let (_, funding) = funding(10_000);
        let script = target_script();
        let expected_h160 = script.p2pkh_hash160().unwrap();
        let tx = Transaction::spend(&funding, 696, script, Network::Testnet).unwrap();
        let addr = tx.outputs[0].script_pubkey.address(Network::Testnet).unwrap();
        assert_eq!(decode_address(&addr, Network::Testnet).unwrap(), expected_h160);
    }
}
