//! Full-node RPC result shapes (only the fields we read).

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BlockchainInfo {
    pub blocks: u64,
    #[serde(default)]
    pub chain: Option<String>,
}

/// `getrawtransaction <txid> true`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransactionVerbose {
    pub txid: String,
    pub hex: String,
}

/// `getblock <hash> 2`.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockVerbose {
    pub hash: String,
    pub height: u64,
    pub tx: Vec<BlockTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockTransaction {
    pub txid: String,
    pub hex: String,
}
