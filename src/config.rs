//! Wallet configuration - passed from higher layers or read from the environment

use crate::error::{Error, Result};
use std::time::Duration;

pub const DEFAULT_DERIVATION_PATH: &str = "m/84'/0'";
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PROTOCOL_VERSION: &str = "1.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network { #[default] Bitcoin, Testnet, Signet, Regtest }

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self { Network::Bitcoin => "bitcoin", Network::Testnet => "testnet", Network::Signet => "signet", Network::Regtest => "regtest" }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bitcoin" | "mainnet" | "main" => Some(Network::Bitcoin),
            "testnet" | "test" => Some(Network::Testnet),
            "signet" => Some(Network::Signet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }

    pub fn to_bitcoin(&self) -> bitcoin::Network {
        match self { Network::Bitcoin => bitcoin::Network::Bitcoin, Network::Testnet => bitcoin::Network::Testnet, Network::Signet => bitcoin::Network::Signet, Network::Regtest => bitcoin::Network::Regtest }
    }

    fn default_electrum_url(&self) -> &'static str {
        match self {
            Network::Bitcoin => "ssl://electrum.blockstream.info:50002",
            Network::Testnet => "ssl://electrum.blockstream.info:60002",
            Network::Signet => "ssl://mempool.space:60602",
            Network::Regtest => "tcp://127.0.0.1:50001",
        }
    }
}

/// Socket flavour selected by the URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Tcp,
    /// `tls://` and `ssl://` are synonyms.
    Tls,
}

impl Scheme {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "tcp" => Ok(Scheme::Tcp),
            "tls" | "ssl" => Ok(Scheme::Tls),
            other => Err(Error::Config(format!("Invalid protocol: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectrumEndpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl ElectrumEndpoint {
    /// Parse `scheme://host:port`. The port is mandatory, Electrum has no
    /// well-known default.
    pub fn parse(value: &str) -> Result<Self> {
        let parsed = url::Url::parse(value)
            .map_err(|e| Error::Config(format!("Electrum URL '{}': {}", value, e)))?;
        let scheme = Scheme::parse(parsed.scheme())?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config(format!("Electrum URL '{}' has no host", value)))?
            .to_string();
        let port = parsed
            .port()
            .ok_or_else(|| Error::Config(format!("Electrum URL '{}' has no port", value)))?;
        Ok(Self { scheme, host, port })
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self { scheme: Scheme::Tcp, host: host.into(), port }
    }
}

/// Everything one Electrum connection needs.
#[derive(Debug, Clone)]
pub struct ElectrumConfig {
    pub endpoint: ElectrumEndpoint,
    pub idle_timeout: Duration,
    /// Bounds a whole exchange (connect, negotiate, all responses).
    pub request_timeout: Duration,
    pub client_name: String,
    pub protocol_version: String,
    /// Electrum servers commonly present self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl ElectrumConfig {
    pub fn new(endpoint: ElectrumEndpoint) -> Self {
        Self {
            endpoint,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_name: default_client_name(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.into(),
            accept_invalid_certs: false,
        }
    }
    pub fn with_idle_timeout(mut self, t: Duration) -> Self { self.idle_timeout = t; self }
    pub fn with_request_timeout(mut self, t: Duration) -> Self { self.request_timeout = t; self }
    pub fn accept_invalid_certs(mut self, yes: bool) -> Self { self.accept_invalid_certs = yes; self }
}

fn default_client_name() -> String {
    format!("pouch/{}", env!("CARGO_PKG_VERSION"))
}

/// Wallet configuration. Higher layers construct this.
#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub network: Network,
    /// Full-node JSON-RPC endpoint (HTTP or HTTPS).
    pub node_url: String,
    /// `None` selects the network's default server.
    pub electrum_url: Option<String>,
    /// Flat fee in satoshis added to every payment.
    pub fee_sat: u64,
    pub derivation_path: String,
    pub idle_timeout: Duration,
    pub request_timeout: Duration,
    pub client_name: String,
    pub protocol_version: String,
    pub accept_invalid_certs: bool,
    pub confirmations: u32,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            node_url: "http://127.0.0.1:8332".into(),
            electrum_url: None,
            fee_sat: 1,
            derivation_path: DEFAULT_DERIVATION_PATH.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_name: default_client_name(),
            protocol_version: DEFAULT_PROTOCOL_VERSION.into(),
            accept_invalid_certs: false,
            confirmations: 1,
        }
    }
}

impl WalletConfig {
    pub fn mainnet() -> Self { Self { network: Network::Bitcoin, ..Default::default() } }
    pub fn testnet() -> Self { Self { network: Network::Testnet, node_url: "http://127.0.0.1:18332".into(), ..Default::default() } }
    pub fn signet() -> Self { Self { network: Network::Signet, node_url: "http://127.0.0.1:38332".into(), ..Default::default() } }
    pub fn regtest() -> Self { Self { network: Network::Regtest, node_url: "http://127.0.0.1:18443".into(), ..Default::default() } }
    pub fn with_node(mut self, url: impl Into<String>) -> Self { self.node_url = url.into(); self }
    pub fn with_electrum(mut self, url: impl Into<String>) -> Self { self.electrum_url = Some(url.into()); self }
    pub fn with_fee(mut self, fee_sat: u64) -> Self { self.fee_sat = fee_sat; self }
    pub fn with_derivation_path(mut self, path: impl Into<String>) -> Self { self.derivation_path = path.into(); self }
    pub fn with_idle_timeout(mut self, t: Duration) -> Self { self.idle_timeout = t; self }
    pub fn with_request_timeout(mut self, t: Duration) -> Self { self.request_timeout = t; self }
    pub fn with_confirmations(mut self, n: u32) -> Self { self.confirmations = n; self }
    pub fn accept_invalid_certs(mut self, yes: bool) -> Self { self.accept_invalid_certs = yes; self }

    pub fn electrum_url(&self) -> &str {
        self.electrum_url.as_deref().unwrap_or(self.network.default_electrum_url())
    }

    pub fn electrum(&self) -> Result<ElectrumConfig> {
        Ok(ElectrumConfig {
            endpoint: ElectrumEndpoint::parse(self.electrum_url())?,
            idle_timeout: self.idle_timeout,
            request_timeout: self.request_timeout,
            client_name: self.client_name.clone(),
            protocol_version: self.protocol_version.clone(),
            accept_invalid_certs: self.accept_invalid_certs,
        })
    }

    /// Build from `POUCH_*` environment variables on top of the network
    /// defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("POUCH_NETWORK") {
            Some(name) => match Network::from_str(&name) {
                Some(Network::Bitcoin) => Self::mainnet(),
                Some(Network::Testnet) => Self::testnet(),
                Some(Network::Signet) => Self::signet(),
                Some(Network::Regtest) => Self::regtest(),
                None => return Err(Error::Config(format!("Unknown network: {}", name))),
            },
            None => Self::mainnet(),
        };
        if let Some(url) = lookup("POUCH_NODE_URL") { config.node_url = url; }
        if let Some(url) = lookup("POUCH_ELECTRUM_URL") { config.electrum_url = Some(url); }
        if let Some(path) = lookup("POUCH_DERIVATION_PATH") { config.derivation_path = path; }
        if let Some(fee) = lookup("POUCH_FEE_SAT") { config.fee_sat = parse_num("POUCH_FEE_SAT", &fee)?; }
        if let Some(secs) = lookup("POUCH_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Duration::from_secs(parse_num("POUCH_IDLE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = lookup("POUCH_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_num("POUCH_REQUEST_TIMEOUT_SECS", &secs)?);
        }
        if let Some(n) = lookup("POUCH_CONFIRMATIONS") {
            config.confirmations = parse_num::<u32>("POUCH_CONFIRMATIONS", &n)?;
        }
        if let Some(flag) = lookup("POUCH_ACCEPT_INVALID_CERTS") {
            config.accept_invalid_certs = matches!(flag.trim(), "1" | "true" | "yes");
        }
        Ok(config)
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a number: {}", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_ssl_endpoint() {
        let ep = ElectrumEndpoint::parse("ssl://elx.bitske.com:50002").unwrap();
        assert_eq!(ep.scheme, Scheme::Tls);
        assert_eq!(ep.host, "elx.bitske.com");
        assert_eq!(ep.port, 50002);
    }

    #[test]
    fn test_parse_tcp_endpoint() {
        let ep = ElectrumEndpoint::parse("tcp://127.0.0.1:50001").unwrap();
        assert_eq!(ep, ElectrumEndpoint::tcp("127.0.0.1", 50001));
    }

    #[test]
    fn test_rejects_unknown_scheme_and_missing_port() {
        assert!(matches!(ElectrumEndpoint::parse("http://example.com:80"), Err(Error::Config(_))));
        assert!(matches!(ElectrumEndpoint::parse("tcp://example.com"), Err(Error::Config(_))));
    }

    #[test]
    fn test_default_electrum_per_network() {
        assert_eq!(WalletConfig::testnet().electrum_url(), "ssl://electrum.blockstream.info:60002");
        let config = WalletConfig::mainnet().with_electrum("tcp://localhost:50001");
        assert_eq!(config.electrum().unwrap().endpoint.scheme, Scheme::Tcp);
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("POUCH_NETWORK", "testnet"),
            ("POUCH_FEE_SAT", "250"),
            ("POUCH_IDLE_TIMEOUT_SECS", "10"),
            ("POUCH_ACCEPT_INVALID_CERTS", "1"),
        ]
        .into_iter()
        .collect();
        let config = WalletConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.fee_sat, 250);
        assert_eq!(config.idle_timeout, Duration::from_secs(10));
        assert!(config.accept_invalid_certs);
        assert_eq!(config.derivation_path, DEFAULT_DERIVATION_PATH);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let bad_fee = WalletConfig::from_lookup(|k| (k == "POUCH_FEE_SAT").then(|| "lots".to_string()));
        assert!(matches!(bad_fee, Err(Error::Config(_))));
        let bad_net = WalletConfig::from_lookup(|k| (k == "POUCH_NETWORK").then(|| "moon".to_string()));
        assert!(matches!(bad_net, Err(Error::Config(_))));
    }

    #[test]
    fn test_network_names() {
        assert_eq!(Network::from_str("mainnet"), Some(Network::Bitcoin));
        assert_eq!(Network::from_str(" Signet "), Some(Network::Signet));
        assert_eq!(Network::Regtest.to_bitcoin(), bitcoin::Network::Regtest);
    }
}
