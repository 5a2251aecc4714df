//! Error taxonomy shared by every component.
//!
//! Nothing in the crate retries. Callers decide on retry and backoff from the
//! variant they get back.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Key or address derivation is impossible for the given input.
    #[error("Derivation failed: {0}")]
    Derivation(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Malformed frame, unexpected response shape, or an operation issued in
    /// the wrong transport state.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Well-formed error response from the remote server.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Unresolvable address: {0}")]
    UnresolvableAddress(String),

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Insufficient balance: available {available}, required {required} (short by {shortfall})")]
    InsufficientBalance {
        available: u64,
        required: u64,
        shortfall: u64,
    },

    #[error("Amount overflow: {target} + {fee}")]
    AmountOverflow { target: u64, fee: u64 },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Socket and HTTP level failures. The connection that produced one of these
/// is discarded.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "tls")]
    #[error("TLS: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    #[error("request not answered within {0:?}")]
    RequestTimeout(Duration),

    #[error("connection closed by peer")]
    Closed,

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Transport(TransportError::Io(e))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(TransportError::Http(e))
    }
}

#[cfg(feature = "tls")]
impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Error::Transport(TransportError::Tls(e))
    }
}

impl Error {
    /// Block scans skip a transaction on any failure except a body that is
    /// itself broken.
    pub fn aborts_scan(&self) -> bool {
        matches!(self, Error::MalformedTransaction(_))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}
