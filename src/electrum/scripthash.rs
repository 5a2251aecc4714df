//! Electrum indexes history by scripthash: SHA-256 of the locking script,
//! bytes reversed, hex encoded.

use crate::config::Network;
use crate::error::{Error, Result};
use bitcoin::Script;
use sha2::{Digest, Sha256};
use std::str::FromStr;

pub fn script_hash(script: &Script) -> String {
    let mut digest = Sha256::digest(script.as_bytes()).to_vec();
    digest.reverse();
    hex::encode(digest)
}

/// Parse `address`, check it belongs to `network`, return its scripthash.
pub fn address_to_scripthash(address: &str, network: Network) -> Result<String> {
    let script = address_script(address, network)?;
    Ok(script_hash(&script))
}

pub fn address_script(address: &str, network: Network) -> Result<bitcoin::ScriptBuf> {
    let parsed = bitcoin::Address::from_str(address)
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?
        .require_network(network.to_bitcoin())
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", address, e)))?;
    Ok(parsed.script_pubkey())
}
