//! UnspentResolver - spendable outputs of an address, with their bodies.

use super::types::{parse_txid, UnspentOutput};
use crate::config::Network;
use crate::electrum::scripthash::{address_script, script_hash};
use crate::electrum::{ElectrumClient, ScripthashBalance};
use crate::error::{Error, Result};
use bitcoin::{OutPoint, Txid};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct UnspentResolver {
    electrum: ElectrumClient,
    network: Network,
}

impl UnspentResolver {
    pub fn new(electrum: ElectrumClient, network: Network) -> Self {
        Self { electrum, network }
    }

    /// `listunspent` for the address's scripthash, then one batch of
    /// `transaction.get` for the distinct transactions it names. Order
    /// follows the index server; a repeated outpoint is listed once.
    pub async fn list_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>> {
        let script = address_script(address, self.network)?;
        let entries = self.electrum.list_unspent(&script_hash(&script)).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut txids: Vec<Txid> = Vec::new();
        for entry in &entries {
            let txid = parse_txid(&entry.tx_hash)?;
            if !txids.contains(&txid) {
                txids.push(txid);
            }
        }
        let bodies = self.electrum.get_transactions(&txids).await?;
        let by_id: HashMap<Txid, _> = txids.into_iter().zip(bodies.into_iter().map(Arc::new)).collect();

        let mut seen: HashSet<OutPoint> = HashSet::with_capacity(entries.len());
        let mut unspent = Vec::with_capacity(entries.len());
        for entry in entries {
            let txid = parse_txid(&entry.tx_hash)?;
            if !seen.insert(OutPoint { txid, vout: entry.tx_pos }) {
                warn!(%txid, vout = entry.tx_pos, "Index server listed an output twice, keeping the first");
                continue;
            }
            let tx = by_id
                .get(&txid)
                .ok_or_else(|| Error::Protocol(format!("body for {} missing", txid)))?;
            let txout = tx.output.get(entry.tx_pos as usize).ok_or_else(|| {
                Error::MalformedTransaction(format!("{} has no output {}", txid, entry.tx_pos))
            })?;
            if txout.script_pubkey != script {
                return Err(Error::Protocol(format!("{}:{} does not pay {}", txid, entry.tx_pos, address)));
            }
            let value = txout.value.to_sat();
            if value != entry.value {
                warn!(%txid, vout = entry.tx_pos, reported = entry.value, actual = value, "Index server value differs from body");
            }
            unspent.push(UnspentOutput {
                transaction_hash: txid,
                output_index: entry.tx_pos,
                value,
                owning_transaction: tx.clone(),
            });
        }

        debug!(address, count = unspent.len(), "Unspent outputs resolved");
        Ok(unspent)
    }

    pub async fn balance(&self, address: &str) -> Result<ScripthashBalance> {
        let script = address_script(address, self.network)?;
        self.electrum.get_balance(&script_hash(&script)).await
    }
}
