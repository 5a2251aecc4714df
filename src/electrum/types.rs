//! Result shapes of the Electrum methods we call.

use serde::{Deserialize, Serialize};

/// `blockchain.scripthash.get_balance`. Unconfirmed may be negative when
/// mempool transactions spend confirmed coins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScripthashBalance {
    pub confirmed: u64,
    pub unconfirmed: i64,
}

/// One row of `blockchain.scripthash.listunspent`. Height 0 means mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListUnspentEntry {
    pub height: u64,
    pub tx_pos: u32,
    pub tx_hash: String,
    pub value: u64,
}

/// `blockchain.headers.subscribe` reply: the current tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderNotification {
    pub height: u64,
    pub hex: String,
}
