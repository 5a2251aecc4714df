//! Value objects produced by the resolvers and consumed by the builder.

use crate::error::{Error, Result};
use bitcoin::consensus;
use bitcoin::{Transaction, TxIn, TxOut, Txid};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;

/// Decode consensus-serialized transaction hex.
pub fn decode_transaction_hex(data: &str) -> Result<Transaction> {
    let bytes = hex::decode(data.trim()).map_err(|e| Error::MalformedTransaction(format!("hex: {}", e)))?;
    consensus::deserialize(&bytes).map_err(|e| Error::MalformedTransaction(e.to_string()))
}

pub fn encode_transaction_hex(tx: &Transaction) -> String {
    hex::encode(consensus::serialize(tx))
}

pub fn parse_txid(value: &str) -> Result<Txid> {
    Txid::from_str(value).map_err(|e| Error::Protocol(format!("txid '{}': {}", value, e)))
}

/// A spendable output together with the transaction that created it.
#[derive(Debug, Clone)]
pub struct UnspentOutput {
    pub transaction_hash: Txid,
    pub output_index: u32,
    pub value: u64,
    pub owning_transaction: Arc<Transaction>,
}

impl UnspentOutput {
    pub fn outpoint(&self) -> bitcoin::OutPoint {
        bitcoin::OutPoint { txid: self.transaction_hash, vout: self.output_index }
    }

    /// The output being spent. `None` when the index is out of range.
    pub fn txout(&self) -> Option<&TxOut> {
        self.owning_transaction.output.get(self.output_index as usize)
    }
}

#[derive(Debug, Clone)]
pub struct TransactionInput {
    pub index: usize,
    pub txin: TxIn,
}

#[derive(Debug, Clone)]
pub struct TransactionOutput {
    pub index: usize,
    pub value: u64,
    pub txout: TxOut,
}

/// Serialized transaction plus its txid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawTransaction {
    pub hash: String,
    pub data: String,
}

impl RawTransaction {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self { hash: tx.compute_txid().to_string(), data: encode_transaction_hex(tx) }
    }

    pub fn transaction(&self) -> Result<Transaction> {
        decode_transaction_hex(&self.data)
    }

    /// `hash` must be the txid of `data`. Not enforced on construction.
    pub fn verify_hash(&self) -> Result<()> {
        let computed = self.transaction()?.compute_txid().to_string();
        if computed != self.hash {
            return Err(Error::MalformedTransaction(format!("hash {} does not match data ({})", self.hash, computed)));
        }
        Ok(())
    }
}

/// A coin transaction with its inputs and outputs broken out.
#[derive(Debug, Clone)]
pub struct CoinTransaction {
    pub hash: Txid,
    pub data: String,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
}

impl CoinTransaction {
    pub fn from_transaction(tx: &Transaction) -> Self {
        let inputs = tx
            .input
            .iter()
            .enumerate()
            .map(|(index, txin)| TransactionInput { index, txin: txin.clone() })
            .collect();
        let outputs = tx
            .output
            .iter()
            .enumerate()
            .map(|(index, txout)| TransactionOutput { index, value: txout.value.to_sat(), txout: txout.clone() })
            .collect();
        Self { hash: tx.compute_txid(), data: encode_transaction_hex(tx), inputs, outputs }
    }

    pub fn from_hex(data: &str) -> Result<Self> {
        Ok(Self::from_transaction(&decode_transaction_hex(data)?))
    }

    pub fn raw(&self) -> RawTransaction {
        RawTransaction { hash: self.hash.to_string(), data: self.data.clone() }
    }

    pub fn transaction(&self) -> Result<Transaction> {
        decode_transaction_hex(&self.data)
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub transactions: Vec<CoinTransaction>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Mempool {
    pub transaction_hashes: Vec<String>,
}
