//! TransactionAssembler - PSBT from a selection, signed and finalized.
//!
//! Inputs are spent from the source key only. P2WPKH and P2PKH previous
//! outputs are supported; anything else is refused before signing.

use super::selection::Selection;
use crate::chain::RawTransaction;
use crate::config::Network;
use crate::error::{Error, Result};
use crate::keys::{Address, CurveContext};
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::psbt::Psbt;
use bitcoin::script::{Builder, PushBytesBuf};
use bitcoin::secp256k1::{Message, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, CompressedPublicKey, PublicKey, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness};
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpendKind {
    WitnessPubkeyHash,
    PubkeyHash,
}

pub struct TransactionAssembler {
    secp: CurveContext,
    network: Network,
}

impl TransactionAssembler {
    pub fn new(secp: CurveContext, network: Network) -> Self {
        Self { secp, network }
    }

    /// Pay `selection.target` to `destination`, return any surplus to
    /// `source`, sign every input with `source`'s key.
    pub fn build(&self, selection: &Selection, source: &Address, destination: &str) -> Result<RawTransaction> {
        let destination = self.parse_address(destination)?;
        let change_script = self.parse_address(&source.hash)?.script_pubkey();

        let required = selection
            .target
            .checked_add(selection.fee)
            .ok_or(Error::AmountOverflow { target: selection.target, fee: selection.fee })?;
        let change = selection.total.checked_sub(required).ok_or(Error::InsufficientBalance {
            available: selection.total,
            required,
            shortfall: required.saturating_sub(selection.total),
        })?;

        let sk = source.secret_key()?;
        let pk = PublicKey::new(sk.public_key(&*self.secp));
        let cpk = CompressedPublicKey(pk.inner);
        let p2wpkh = ScriptBuf::new_p2wpkh(&cpk.wpubkey_hash());
        let p2pkh = ScriptBuf::new_p2pkh(&pk.pubkey_hash());

        let mut spends = Vec::with_capacity(selection.inputs.len());
        for utxo in &selection.inputs {
            let spent = utxo.txout().cloned().ok_or_else(|| {
                Error::MalformedTransaction(format!("{} has no output {}", utxo.transaction_hash, utxo.output_index))
            })?;
            let kind = if spent.script_pubkey == p2wpkh {
                SpendKind::WitnessPubkeyHash
            } else if spent.script_pubkey == p2pkh {
                SpendKind::PubkeyHash
            } else {
                return Err(Error::UnsupportedOperation(format!(
                    "{}:{} is not a P2WPKH or P2PKH output of the source key",
                    utxo.transaction_hash, utxo.output_index
                )));
            };
            spends.push((kind, spent));
        }

        let mut output = vec![TxOut { value: Amount::from_sat(selection.target), script_pubkey: destination.script_pubkey() }];
        if change > 0 {
            output.push(TxOut { value: Amount::from_sat(change), script_pubkey: change_script });
        }
        let unsigned = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: selection
                .inputs
                .iter()
                .map(|utxo| TxIn {
                    previous_output: utxo.outpoint(),
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::MAX,
                    witness: Witness::new(),
                })
                .collect(),
            output,
        };

        let mut psbt = Psbt::from_unsigned_tx(unsigned).map_err(|e| Error::MalformedTransaction(e.to_string()))?;
        for ((input, utxo), (kind, spent)) in psbt.inputs.iter_mut().zip(&selection.inputs).zip(&spends) {
            input.non_witness_utxo = Some((*utxo.owning_transaction).clone());
            if *kind == SpendKind::WitnessPubkeyHash {
                input.witness_utxo = Some(spent.clone());
            }
        }

        self.sign(&mut psbt, &spends, &sk, &pk)?;
        let tx = psbt.extract_tx_unchecked_fee_rate();
        let raw = RawTransaction::from_transaction(&tx);
        debug!(txid = %raw.hash, inputs = tx.input.len(), outputs = tx.output.len(), change, "Transaction assembled");
        Ok(raw)
    }

    fn sign(&self, psbt: &mut Psbt, spends: &[(SpendKind, TxOut)], sk: &SecretKey, pk: &PublicKey) -> Result<()> {
        let unsigned_tx = psbt.unsigned_tx.clone();
        let mut cache = SighashCache::new(&unsigned_tx);

        for (index, (kind, spent)) in spends.iter().enumerate() {
            let digest = match kind {
                SpendKind::WitnessPubkeyHash => cache
                    .p2wpkh_signature_hash(index, &spent.script_pubkey, spent.value, EcdsaSighashType::All)
                    .map_err(|e| Error::MalformedTransaction(e.to_string()))?
                    .to_byte_array(),
                SpendKind::PubkeyHash => cache
                    .legacy_signature_hash(index, &spent.script_pubkey, EcdsaSighashType::All.to_u32())
                    .map_err(|e| Error::MalformedTransaction(e.to_string()))?
                    .to_byte_array(),
            };
            let signature = bitcoin::ecdsa::Signature {
                signature: self.secp.sign_ecdsa(&Message::from_digest(digest), sk),
                sighash_type: EcdsaSighashType::All,
            };

            let input = &mut psbt.inputs[index];
            match kind {
                SpendKind::WitnessPubkeyHash => {
                    let mut witness = Witness::new();
                    witness.push(signature.to_vec());
                    witness.push(pk.to_bytes());
                    input.final_script_witness = Some(witness);
                }
                SpendKind::PubkeyHash => {
                    let sig_push = PushBytesBuf::try_from(signature.to_vec())
                        .map_err(|e| Error::MalformedTransaction(e.to_string()))?;
                    input.final_script_sig = Some(Builder::new().push_slice(sig_push).push_key(pk).into_script());
                }
            }
        }
        Ok(())
    }

    fn parse_address(&self, address: &str) -> Result<bitcoin::Address> {
        bitcoin::Address::from_str(address)
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?
            .require_network(self.network.to_bitcoin())
            .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::selection::select;
    use crate::chain::UnspentOutput;
    use crate::config::DEFAULT_DERIVATION_PATH;
    use crate::keys::{curve_context, KeyDeriver};
    use bitcoin::{OutPoint, Txid};
    use std::sync::Arc;

    const TEST_MNEMONIC: &str = "radar blur cabbage chef fix engine embark joy scheme fiction master release";

    struct Fixture {
        secp: CurveContext,
        source: Address,
        destination: String,
        pk: PublicKey,
    }

    fn fixture() -> Fixture {
        let secp = curve_context();
        let deriver = KeyDeriver::from_mnemonic(secp.clone(), TEST_MNEMONIC, Network::Bitcoin, DEFAULT_DERIVATION_PATH).unwrap();
        let source = deriver.derive(0, 0).unwrap();
        let destination = deriver.derive(0, 1).unwrap().hash.clone();
        let pk = PublicKey::new(source.secret_key().unwrap().public_key(&*secp));
        Fixture { secp, source, destination, pk }
    }

    /// One funding transaction with an output per `(script, value)`.
    fn funding(outputs: &[(ScriptBuf, u64)]) -> Vec<UnspentOutput> {
        let tx = Arc::new(Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint { txid: Txid::from_byte_array([7; 32]), vout: 0 },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: outputs
                .iter()
                .map(|(script, value)| TxOut { value: Amount::from_sat(*value), script_pubkey: script.clone() })
                .collect(),
        });
        let txid = tx.compute_txid();
        outputs
            .iter()
            .enumerate()
            .map(|(i, (_, value))| UnspentOutput {
                transaction_hash: txid,
                output_index: i as u32,
                value: *value,
                owning_transaction: tx.clone(),
            })
            .collect()
    }

    fn p2wpkh(pk: &PublicKey) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&CompressedPublicKey(pk.inner).wpubkey_hash())
    }

    #[test]
    fn test_payment_and_change_outputs() {
        let f = fixture();
        let utxos = funding(&[(p2wpkh(&f.pk), 100_000), (p2wpkh(&f.pk), 30_000)]);
        let selection = select(&utxos, 60_000, 500).unwrap();
        assert_eq!(selection.inputs.len(), 1);

        let assembler = TransactionAssembler::new(f.secp.clone(), Network::Bitcoin);
        let raw = assembler.build(&selection, &f.source, &f.destination).unwrap();
        let tx = raw.transaction().unwrap();

        assert_eq!(tx.version, Version::TWO);
        assert_eq!(tx.lock_time, LockTime::ZERO);
        assert_eq!(tx.input.len(), 1);
        assert_eq!(tx.input[0].sequence, Sequence::MAX);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[0].value.to_sat(), 60_000);
        assert_eq!(tx.output[1].value.to_sat(), 39_500);
        assert_eq!(tx.output[1].script_pubkey, p2wpkh(&f.pk));
        let paid: u64 = tx.output.iter().map(|o| o.value.to_sat()).sum();
        assert_eq!(selection.total - paid, 500);
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let f = fixture();
        let utxos = funding(&[(p2wpkh(&f.pk), 10_500)]);
        let selection = select(&utxos, 10_000, 500).unwrap();
        let raw = TransactionAssembler::new(f.secp, Network::Bitcoin).build(&selection, &f.source, &f.destination).unwrap();
        assert_eq!(raw.transaction().unwrap().output.len(), 1);
    }

    #[test]
    fn test_hash_matches_serialized_data() {
        let f = fixture();
        let utxos = funding(&[(p2wpkh(&f.pk), 80_000)]);
        let selection = select(&utxos, 1_000, 1).unwrap();
        let raw = TransactionAssembler::new(f.secp, Network::Bitcoin).build(&selection, &f.source, &f.destination).unwrap();
        raw.verify_hash().unwrap();
        assert_eq!(raw.hash, raw.transaction().unwrap().compute_txid().to_string());
    }

    #[test]
    fn test_deterministic() {
        let f = fixture();
        let utxos = funding(&[(p2wpkh(&f.pk), 5_000), (ScriptBuf::new_p2pkh(&f.pk.pubkey_hash()), 7_000)]);
        let selection = select(&utxos, 11_000, 100).unwrap();
        let assembler = TransactionAssembler::new(f.secp, Network::Bitcoin);
        let a = assembler.build(&selection, &f.source, &f.destination).unwrap();
        let b = assembler.build(&selection, &f.source, &f.destination).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_signatures_verify() {
        let f = fixture();
        let witness_script = p2wpkh(&f.pk);
        let legacy_script = ScriptBuf::new_p2pkh(&f.pk.pubkey_hash());
        let utxos = funding(&[(witness_script.clone(), 40_000), (legacy_script.clone(), 25_000)]);
        let selection = select(&utxos, 50_000, 1_000).unwrap();
        assert_eq!(selection.inputs.len(), 2);

        let raw = TransactionAssembler::new(f.secp.clone(), Network::Bitcoin)
            .build(&selection, &f.source, &f.destination)
            .unwrap();
        let tx = raw.transaction().unwrap();
        let mut cache = SighashCache::new(&tx);

        // input 0: witness spend of the 40k output
        let witness: Vec<&[u8]> = tx.input[0].witness.iter().collect();
        assert_eq!(witness.len(), 2);
        assert_eq!(witness[1], f.pk.to_bytes().as_slice());
        assert!(tx.input[0].script_sig.is_empty());
        let sig = bitcoin::ecdsa::Signature::from_slice(witness[0]).unwrap();
        assert_eq!(sig.sighash_type, EcdsaSighashType::All);
        let digest = cache
            .p2wpkh_signature_hash(0, &witness_script, Amount::from_sat(40_000), EcdsaSighashType::All)
            .unwrap();
        f.secp.verify_ecdsa(&Message::from_digest(digest.to_byte_array()), &sig.signature, &f.pk.inner).unwrap();

        // input 1: legacy spend of the 25k output
        assert!(tx.input[1].witness.is_empty());
        let pushes: Vec<Vec<u8>> = tx.input[1]
            .script_sig
            .instructions()
            .map(|i| match i.unwrap() {
                bitcoin::script::Instruction::PushBytes(b) => b.as_bytes().to_vec(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[1], f.pk.to_bytes());
        let sig = bitcoin::ecdsa::Signature::from_slice(&pushes[0]).unwrap();
        let digest = cache.legacy_signature_hash(1, &legacy_script, EcdsaSighashType::All.to_u32()).unwrap();
        f.secp.verify_ecdsa(&Message::from_digest(digest.to_byte_array()), &sig.signature, &f.pk.inner).unwrap();
    }

    #[test]
    fn test_foreign_output_rejected() {
        let f = fixture();
        let other = PublicKey::new(SecretKey::from_slice(&[0x22; 32]).unwrap().public_key(&*f.secp));
        let utxos = funding(&[(p2wpkh(&other), 90_000)]);
        let selection = select(&utxos, 1_000, 10).unwrap();
        let err = TransactionAssembler::new(f.secp, Network::Bitcoin).build(&selection, &f.source, &f.destination).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }

    #[test]
    fn test_destination_checked_against_network() {
        let f = fixture();
        let utxos = funding(&[(p2wpkh(&f.pk), 90_000)]);
        let selection = select(&utxos, 1_000, 10).unwrap();
        let assembler = TransactionAssembler::new(f.secp, Network::Bitcoin);
        let testnet_dest = "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx";
        assert!(matches!(assembler.build(&selection, &f.source, testnet_dest), Err(Error::InvalidAddress(_))));
        assert!(matches!(assembler.build(&selection, &f.source, "garbage"), Err(Error::InvalidAddress(_))));
    }

    #[test]
    fn test_underfunded_selection_refused() {
        let f = fixture();
        let utxos = funding(&[(p2wpkh(&f.pk), 1_000)]);
        let selection = Selection { inputs: utxos, total: 1_000, target: 5_000, fee: 10 };
        let err = TransactionAssembler::new(f.secp, Network::Bitcoin).build(&selection, &f.source, &f.destination).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { shortfall: 4_010, .. }));
    }
}
