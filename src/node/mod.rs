//! Node - full-node JSON-RPC used for blocks, previous transactions and
//! broadcasting.

mod http;
pub mod types;

pub use http::HttpNodeClient;
pub use types::{BlockTransaction, BlockVerbose, BlockchainInfo, RawTransactionVerbose};

use crate::error::Result;
use async_trait::async_trait;
use bitcoin::{Transaction, Txid};

/// Calls the wallet makes against a full node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn blockchain_info(&self) -> Result<BlockchainInfo>;
    async fn block_hash(&self, height: u64) -> Result<String>;
    async fn block(&self, hash: &str) -> Result<BlockVerbose>;
    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction>;
    async fn raw_mempool(&self) -> Result<Vec<String>>;
    /// Returns the txid the node reports.
    async fn send_raw_transaction(&self, hex: &str) -> Result<String>;
}
