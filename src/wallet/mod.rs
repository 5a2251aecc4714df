//! Wallet - the scan-capable wallet surface handed to higher layers.
//!
//! ```text
//! BitcoinWallet (ScanWallet)
//!     │
//!     ├── keys ─────────── KeyDeriver (BIP84 receive addresses)
//!     ├── reads ────────── NodeClient (height, blocks, mempool, tx)
//!     │                    ElectrumClient (balance, unspent, batched tx bodies)
//!     ├── send ─────────── UnspentResolver → select → TransactionAssembler
//!     └── broadcast ────── NodeClient::send_raw_transaction
//! ```
//!
//! Wallets for chains without a scan model live outside this crate; they do
//! not implement [`ScanWallet`].

mod btc;

pub use btc::BitcoinWallet;

use crate::chain::{Block, CoinTransaction, Mempool, RawTransaction};
use crate::error::Result;
use crate::keys::Address;
use async_trait::async_trait;

/// Wallet over a chain whose history is read by scanning blocks.
/// Values are in the chain's smallest unit.
#[async_trait]
pub trait ScanWallet: Send + Sync {
    async fn get_last_block_height(&self) -> Result<u64>;
    async fn get_address(&self, index: u32, account_index: u32) -> Result<Address>;
    async fn get_mempool(&self) -> Result<Mempool>;
    /// Inclusive range. Empty when `from_height > to_height`.
    async fn get_blocks(&self, from_height: u64, to_height: u64) -> Result<Vec<Block>>;
    async fn get_transactions(&self, hashes: &[String]) -> Result<Vec<CoinTransaction>>;
    async fn get_transaction(&self, hash: &str) -> Result<CoinTransaction>;
    async fn create_transaction(&self, from: &Address, to: &str, value: u64) -> Result<RawTransaction>;
    async fn create_token_transaction(&self, contract: &str, from: &Address, to: &str, value: u64) -> Result<RawTransaction>;
    async fn estimate_transaction_fee(&self, from: &Address, to: &str, value: u64) -> Result<u64>;
    async fn estimate_token_transaction_fee(&self, contract: &str, from: &Address, to: &str, value: u64) -> Result<u64>;
    /// Returns the txid reported by the node.
    async fn broadcast_transaction(&self, transaction: &RawTransaction) -> Result<String>;
    async fn get_address_balance(&self, address: &str) -> Result<u64>;
    async fn get_address_token_balance(&self, contract: &str, address: &str) -> Result<u64>;
    async fn is_transaction_confirmed(&self, tx_height: u64) -> Result<bool>;
}
