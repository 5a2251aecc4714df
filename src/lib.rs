//! Pouch: UTXO wallet core. Deterministic keys, largest-first coin selection,
//! local signing, and an Electrum line-protocol client.
//!
//! # Architecture
//!
//! ```text
//! BitcoinWallet (ScanWallet)
//!   │
//!   ├── KeyDeriver ─────────── BIP39 seed → m/84'/0'/account'/0/index
//!   │
//!   ├── UnspentResolver ────── ElectrumClient ── RpcTransport ── FrameParser
//!   │                                               (tcp / tls)
//!   ├── AddressResolver ────── NodeClient (HTTP JSON-RPC)
//!   │
//!   └── select → TransactionAssembler (PSBT, ECDSA, finalize)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use pouch::{BitcoinWallet, ScanWallet, WalletConfig};
//!
//! let wallet = BitcoinWallet::new(mnemonic, WalletConfig::testnet().with_fee(500))?;
//! let from = wallet.get_address(0, 0).await?;
//! let raw = wallet.create_transaction(&from, "tb1q...", 10_000).await?;
//! let txid = wallet.broadcast_transaction(&raw).await?;
//! ```

pub mod builder;
pub mod chain;
pub mod config;
pub mod electrum;
pub mod error;
pub mod jsonrpc;
pub mod keys;
pub mod logging;
pub mod node;
pub mod wallet;

pub use builder::{select, Selection, TransactionAssembler};
pub use chain::{
    AddressResolver, Block, CoinTransaction, Mempool, RawTransaction, ScannedTransaction, TransactionInput,
    TransactionOutput, UnspentOutput, UnspentResolver, BLOCK_REWARD,
};
pub use config::{ElectrumConfig, ElectrumEndpoint, Network, Scheme, WalletConfig};
pub use electrum::{ElectrumClient, FrameParser, RpcTransport, TransportState};
pub use error::{Error, Result, TransportError};
pub use keys::{curve_context, Address, CurveContext, KeyDeriver};
pub use node::{HttpNodeClient, NodeClient};
pub use wallet::{BitcoinWallet, ScanWallet};
