use super::types::{BlockVerbose, BlockchainInfo, RawTransactionVerbose};
use super::NodeClient;
use crate::chain::types::decode_transaction_hex;
use crate::error::{Error, Result};
use crate::jsonrpc::{Request, Response};
use async_trait::async_trait;
use bitcoin::{Transaction, Txid};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC over HTTP(S). Credentials in the URL become basic auth and are
/// stripped from the URL we keep.
#[derive(Debug, Clone)]
pub struct HttpNodeClient {
    http: reqwest::Client,
    url: url::Url,
    auth: Option<(String, Option<String>)>,
}

impl HttpNodeClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let mut url = url::Url::parse(url).map_err(|e| Error::Config(format!("node URL: {}", e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!("node URL scheme must be http or https, got {}", url.scheme())));
        }
        let auth = match url.username() {
            "" => None,
            user => Some((user.to_string(), url.password().map(str::to_string))),
        };
        // set_username/set_password only fail for cannot-be-a-base URLs
        let _ = url.set_username("");
        let _ = url.set_password(None);

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, url, auth })
    }

    /// URL without credentials.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = Request::new(0, method, params);
        let mut request = self.http.post(self.url.clone()).json(&body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, password.as_ref());
        }

        // bitcoind answers RPC errors with a non-2xx status and a JSON body,
        // so the body is read regardless of status.
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(method, %status, bytes = text.len(), "Node RPC");

        let value: Value = serde_json::from_str(&text)
            .map_err(|_| Error::Protocol(format!("malformed response to {} (HTTP {})", method, status)))?;
        let result = match Response::from_value(value) {
            Ok(Response::Notification { .. }) | Err(_) => {
                return Err(Error::Protocol(format!("malformed response to {}", method)));
            }
            Ok(response) => response.into_result()?,
        };
        serde_json::from_value(result).map_err(|e| Error::Protocol(format!("{}: {}", method, e)))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn blockchain_info(&self) -> Result<BlockchainInfo> {
        self.call("getblockchaininfo", json!([])).await
    }

    async fn block_hash(&self, height: u64) -> Result<String> {
        self.call("getblockhash", json!([height])).await
    }

    async fn block(&self, hash: &str) -> Result<BlockVerbose> {
        self.call("getblock", json!([hash, 2])).await
    }

    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        let verbose: RawTransactionVerbose = self.call("getrawtransaction", json!([txid.to_string(), true])).await?;
        let tx = decode_transaction_hex(&verbose.hex)?;
        let got = tx.compute_txid();
        if got != *txid || verbose.txid != txid.to_string() {
            return Err(Error::Protocol(format!("asked for {}, node returned {} ({})", txid, verbose.txid, got)));
        }
        Ok(tx)
    }

    async fn raw_mempool(&self) -> Result<Vec<String>> {
        self.call("getrawmempool", json!([false, false])).await
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        self.call("sendrawtransaction", json!([hex, 0])).await
    }
}
