//! AddressResolver - who owns an input or an output.
//!
//! Coinbase inputs resolve to [`BLOCK_REWARD`]. Other inputs are tried against
//! unlocking-script templates (P2SH, then P2PKH). Anything else costs a round
//! trip: fetch the previous transaction and resolve the spent output.
//! Outputs never depend on other transactions, so the recursion is one hop.

use super::types::{CoinTransaction, TransactionInput, TransactionOutput};
use crate::config::Network;
use crate::error::{Error, Result};
use crate::node::NodeClient;
use bitcoin::hashes::Hash;
use bitcoin::script::Instruction;
use bitcoin::{Address, PublicKey, Script, TxIn, TxOut, Txid};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Owner reported for coinbase inputs.
pub const BLOCK_REWARD: &str = "Block Reward";

#[derive(Clone)]
pub struct AddressResolver {
    node: Arc<dyn NodeClient>,
    network: Network,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedInput {
    pub index: usize,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedOutput {
    pub index: usize,
    pub value: u64,
    pub address: Option<String>,
}

/// A transaction with every owner resolved where possible.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedTransaction {
    pub hash: String,
    pub inputs: Vec<ResolvedInput>,
    pub outputs: Vec<ResolvedOutput>,
}

impl AddressResolver {
    pub fn new(node: Arc<dyn NodeClient>, network: Network) -> Self {
        Self { node, network }
    }

    pub async fn resolve_input_address(&self, input: &TransactionInput) -> Result<String> {
        let txin = &input.txin;
        // Coinbase script_sigs are arbitrary pushes and would pass as P2SH.
        if txin.previous_output.txid == Txid::all_zeros() {
            return Ok(BLOCK_REWARD.to_string());
        }
        if let Some(address) = self.p2sh_from_script_sig(txin).or_else(|| self.p2pkh_from_script_sig(txin)) {
            return Ok(address);
        }

        let prev = txin.previous_output;
        let tx = self.node.raw_transaction(&prev.txid).await?;
        let spent = tx.output.get(prev.vout as usize).ok_or_else(|| {
            Error::MalformedTransaction(format!("{} has no output {} (spent by input {})", prev.txid, prev.vout, input.index))
        })?;
        self.resolve_txout_address(spent)
    }

    pub fn resolve_output_address(&self, output: &TransactionOutput) -> Result<String> {
        self.resolve_txout_address(&output.txout)
    }

    /// Canonical address, then pay-to-pubkey as P2PKH, then the script hex.
    pub fn resolve_txout_address(&self, txout: &TxOut) -> Result<String> {
        let script = &txout.script_pubkey;
        if let Ok(address) = Address::from_script(script, self.network.to_bitcoin()) {
            return Ok(address.to_string());
        }

        let bytes = script.as_bytes();
        if bytes.len() > 2 {
            if let Ok(pk) = PublicKey::from_slice(&bytes[1..bytes.len() - 1]) {
                return Ok(Address::p2pkh(pk.pubkey_hash(), self.network.to_bitcoin()).to_string());
            }
        }

        if !script.is_empty() {
            return Ok(hex::encode(bytes));
        }
        Err(Error::UnresolvableAddress("empty locking script".into()))
    }

    /// Resolve every input and output. Per-item failures are recorded as
    /// `None`; only a malformed transaction stops the scan.
    pub async fn scan_transaction(&self, tx: &CoinTransaction) -> Result<ScannedTransaction> {
        let mut inputs = Vec::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let address = match self.resolve_input_address(input).await {
                Ok(address) => Some(address),
                Err(e) if e.aborts_scan() => return Err(e),
                Err(e) => {
                    debug!(tx = %tx.hash, input = input.index, "Unresolved input: {}", e);
                    None
                }
            };
            inputs.push(ResolvedInput { index: input.index, address });
        }

        let outputs = tx
            .outputs
            .iter()
            .map(|output| {
                let address = match self.resolve_output_address(output) {
                    Ok(address) => Some(address),
                    Err(e) => {
                        debug!(tx = %tx.hash, output = output.index, "Unresolved output: {}", e);
                        None
                    }
                };
                ResolvedOutput { index: output.index, value: output.value, address }
            })
            .collect();

        Ok(ScannedTransaction { hash: tx.hash.to_string(), inputs, outputs })
    }

    /// Push-only unlocking script whose last push is a redeem script. A bare
    /// redeem push (P2SH-wrapped segwit) only counts when a witness is present.
    fn p2sh_from_script_sig(&self, txin: &TxIn) -> Option<String> {
        let pushes = push_data(&txin.script_sig)?;
        let (redeem, rest) = pushes.split_last()?;
        if redeem.is_empty() || PublicKey::from_slice(redeem).is_ok() {
            return None;
        }
        let redeem = Script::from_bytes(redeem);
        if redeem.instructions().any(|i| i.is_err()) {
            return None;
        }
        if rest.is_empty() && txin.witness.is_empty() {
            return None;
        }
        Address::p2sh(redeem, self.network.to_bitcoin()).ok().map(|a| a.to_string())
    }

    /// `<signature> <pubkey>`.
    fn p2pkh_from_script_sig(&self, txin: &TxIn) -> Option<String> {
        let pushes = push_data(&txin.script_sig)?;
        let [sig, pubkey] = pushes.as_slice() else {
            return None;
        };
        bitcoin::ecdsa::Signature::from_slice(sig).ok()?;
        let pk = PublicKey::from_slice(pubkey).ok()?;
        Some(Address::p2pkh(pk.pubkey_hash(), self.network.to_bitcoin()).to_string())
    }
}

/// Data of every push, or `None` if the script is empty or does anything but
/// push.
fn push_data(script: &Script) -> Option<Vec<&[u8]>> {
    if script.is_empty() {
        return None;
    }
    script
        .instructions()
        .map(|instruction| match instruction {
            Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes()),
            _ => None,
        })
        .collect()
}
