//! Electrum - line-delimited JSON-RPC over TCP or TLS.
//!
//! ```text
//! ElectrumClient ── per call ──▶ RpcTransport ──▶ FrameParser
//!                                     │
//!                                     └── tcp:// | tls:// | ssl://
//! ```

pub mod client;
pub mod frame;
pub mod scripthash;
#[cfg(feature = "tls")]
pub mod tls;
pub mod transport;
pub mod types;

pub use client::ElectrumClient;
pub use frame::FrameParser;
pub use scripthash::{address_to_scripthash, script_hash};
pub use transport::{RpcTransport, Stream, TransportState};
pub use types::{HeaderNotification, ListUnspentEntry, ScripthashBalance};
