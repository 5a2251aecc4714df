//! ElectrumClient - one connection per logical operation.
//!
//! Every call dials, negotiates, sends its request(s), collects the answers
//! and closes, all bounded by the configured request timeout.

use super::transport::RpcTransport;
use super::types::{HeaderNotification, ListUnspentEntry, ScripthashBalance};
use crate::chain::types::decode_transaction_hex;
use crate::config::ElectrumConfig;
use crate::error::{Error, Result, TransportError};
use bitcoin::{Transaction, Txid};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ElectrumClient {
    config: ElectrumConfig,
}

impl ElectrumClient {
    pub fn new(config: ElectrumConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ElectrumConfig {
        &self.config
    }

    pub async fn get_balance(&self, scripthash: &str) -> Result<ScripthashBalance> {
        self.call("blockchain.scripthash.get_balance", json!([scripthash])).await
    }

    pub async fn list_unspent(&self, scripthash: &str) -> Result<Vec<ListUnspentEntry>> {
        self.call("blockchain.scripthash.listunspent", json!([scripthash])).await
    }

    pub async fn tip(&self) -> Result<HeaderNotification> {
        self.call("blockchain.headers.subscribe", json!([])).await
    }

    /// Raw 80-byte header hex at `height`.
    pub async fn block_header(&self, height: u64) -> Result<String> {
        self.call("blockchain.block.header", json!([height])).await
    }

    pub async fn get_transaction(&self, txid: &Txid) -> Result<Transaction> {
        let mut txs = self.get_transactions(std::slice::from_ref(txid)).await?;
        txs.pop().ok_or_else(|| Error::Protocol(format!("no body for {}", txid)))
    }

    /// Full bodies for `txids`, fetched as one batch on one connection.
    /// Returned in the order asked for.
    pub async fn get_transactions(&self, txids: &[Txid]) -> Result<Vec<Transaction>> {
        if txids.is_empty() {
            return Ok(Vec::new());
        }
        let calls = txids
            .iter()
            .map(|txid| ("blockchain.transaction.get", json!([txid.to_string()])))
            .collect();
        let results = self.exchange(calls).await?;

        txids
            .iter()
            .zip(results)
            .map(|(txid, value)| {
                let data = value
                    .as_str()
                    .ok_or_else(|| Error::Protocol(format!("transaction {} is not a hex string", txid)))?;
                let tx = decode_transaction_hex(data)?;
                if tx.compute_txid() != *txid {
                    return Err(Error::Protocol(format!("asked for {}, got {}", txid, tx.compute_txid())));
                }
                Ok(tx)
            })
            .collect()
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T> {
        let value = self
            .exchange(vec![(method, params)])
            .await?
            .pop()
            .ok_or_else(|| Error::Protocol(format!("{}: empty reply", method)))?;
        serde_json::from_value(value).map_err(|e| Error::Protocol(format!("{}: {}", method, e)))
    }

    async fn exchange(&self, calls: Vec<(&str, Value)>) -> Result<Vec<Value>> {
        let limit = self.config.request_timeout;
        let count = calls.len();
        let mut transport = RpcTransport::new(self.config.clone());
        let host = self.config.endpoint.host.clone();
        transport.on_timeout(move || warn!(host = %host, "Electrum server went quiet"));
        transport.on_error(|e| warn!("Electrum transport: {}", e));

        let outcome = tokio::time::timeout(limit, async {
            match transport.connect().await {
                Ok(()) => transport.batch(calls).await,
                Err(e) => Err(e),
            }
        })
        .await;
        transport.close().await;

        match outcome {
            Ok(result) => {
                debug!(requests = count, ok = result.is_ok(), "Electrum exchange finished");
                result
            }
            Err(_) => Err(TransportError::RequestTimeout(limit).into()),
        }
    }
}
