//! Keys - Derives signing keys and P2WPKH receive addresses from a seed phrase.
//!
//! ```text
//! Mnemonic (BIP39) ── seed ── base path (m/84'/0') / account' / 0 / index
//!                                                   │
//!                                                   ├── private key (32 bytes)
//!                                                   └── bech32 witness address
//! ```
//!
//! The curve context is passed in, never created globally, so derivers and
//! assemblers can share one and tests stay independent.

use crate::config::Network;
use crate::error::{Error, Result};
use bip39::Mnemonic;
use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::secp256k1::{All, Secp256k1, SecretKey};
use bitcoin::CompressedPublicKey;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Shared secp256k1 context.
pub type CurveContext = Arc<Secp256k1<All>>;

pub fn curve_context() -> CurveContext {
    Arc::new(Secp256k1::new())
}

/// A derived (or externally supplied) address with its signing key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Address {
    #[zeroize(skip)]
    pub index: u32,
    #[zeroize(skip)]
    pub account_index: u32,
    /// Chain-native encoded address.
    #[zeroize(skip)]
    pub hash: String,
    private_key: [u8; 32],
}

impl Address {
    pub fn new(index: u32, account_index: u32, hash: impl Into<String>, private_key: [u8; 32]) -> Self {
        Self { index, account_index, hash: hash.into(), private_key }
    }

    pub fn private_key(&self) -> &[u8; 32] {
        &self.private_key
    }

    pub(crate) fn secret_key(&self) -> Result<SecretKey> {
        SecretKey::from_slice(&self.private_key).map_err(|e| Error::Derivation(e.to_string()))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Address")
            .field("index", &self.index)
            .field("account_index", &self.account_index)
            .field("hash", &self.hash)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

pub struct KeyDeriver {
    secp: CurveContext,
    seed: Zeroizing<[u8; 64]>,
    network: Network,
    base_path: DerivationPath,
}

impl KeyDeriver {
    pub fn from_mnemonic(secp: CurveContext, mnemonic: &str, network: Network, base_path: &str) -> Result<Self> {
        let mnemonic = Mnemonic::parse_normalized(mnemonic)
            .map_err(|e| Error::Derivation(format!("Invalid mnemonic: {}", e)))?;
        Self::from_seed(secp, mnemonic.to_seed(""), network, base_path)
    }

    pub fn from_seed(secp: CurveContext, seed: [u8; 64], network: Network, base_path: &str) -> Result<Self> {
        let base_path = DerivationPath::from_str(base_path)
            .map_err(|e| Error::Derivation(format!("Derivation path '{}': {}", base_path, e)))?;
        Ok(Self { secp, seed: Zeroizing::new(seed), network, base_path })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// `base / account' / 0 / index`. Same inputs, same output.
    pub fn derive(&self, account_index: u32, address_index: u32) -> Result<Address> {
        let path = self.base_path.extend([
            ChildNumber::from_hardened_idx(account_index)
                .map_err(|e| Error::Derivation(format!("Account index {}: {}", account_index, e)))?,
            ChildNumber::from_normal_idx(0).map_err(|e| Error::Derivation(e.to_string()))?,
            ChildNumber::from_normal_idx(address_index)
                .map_err(|e| Error::Derivation(format!("Address index {}: {}", address_index, e)))?,
        ]);

        let master = Xpriv::new_master(self.network.to_bitcoin(), &self.seed[..])
            .map_err(|e| Error::Derivation(format!("Master key: {}", e)))?;
        let child = master
            .derive_priv(&*self.secp, &path)
            .map_err(|e| Error::Derivation(format!("Path {}: {}", path, e)))?;

        let pubkey = CompressedPublicKey(child.private_key.public_key(&*self.secp));
        let address = bitcoin::Address::p2wpkh(&pubkey, self.network.to_bitcoin());

        Ok(Address::new(address_index, account_index, address.to_string(), child.private_key.secret_bytes()))
    }
}
