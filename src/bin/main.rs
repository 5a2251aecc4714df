//! Pouch CLI - wallet reads and sends, JSON out
//!
//!   pouch address [--index N] [--account N]   → {"address": "bc1q...", ...}
//!   pouch balance [address]                   → {"confirmed": 0, "unconfirmed": 0}
//!   pouch unspent [address]                   → [{"txid", "vout", "value"}]
//!   pouch tx <txid>                           → inputs/outputs with owners
//!   pouch height                              → {"height": 850000}
//!   pouch send <to> <amount_sat> [--broadcast]
//!
//! Configuration comes from POUCH_* variables (optionally in .env), flags win.
//! Malformed numeric flags are rejected with exit status 2.
//! The mnemonic is read from --mnemonic or POUCH_MNEMONIC and never printed.

use anyhow::{anyhow, bail, Context};
use pouch::logging::{init_logging, init_verbose_logging};
use pouch::{BitcoinWallet, CoinTransaction, Network, ScanWallet, WalletConfig};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use tracing::debug;

fn main() {
    // Environment is settled before any runtime thread exists.
    load_dotenv();
    let args: Vec<String> = env::args().collect();
    let opts = match ParsedArgs::parse(&args[1..]) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}", render(&json!({"error": e}), std::io::stderr().is_terminal()));
            std::process::exit(2);
        }
    };

    if opts.verbose {
        init_verbose_logging();
    } else {
        init_logging();
    }
    #[cfg(feature = "tls")]
    let _ = rustls::crypto::ring::default_provider().install_default();

    if opts.help {
        print_usage();
        return;
    }
    if opts.version {
        println!("pouch {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    let Some(command) = opts.command.clone() else {
        print_usage();
        return;
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", json!({"error": format!("tokio runtime: {}", e)}));
            std::process::exit(1);
        }
    };
    let result = runtime.block_on(async {
        match command.as_str() {
            "address" => cmd_address(&opts).await,
            "balance" => cmd_balance(&opts).await,
            "unspent" => cmd_unspent(&opts).await,
            "tx" => cmd_tx(&opts).await,
            "height" => cmd_height(&opts).await,
            "send" => cmd_send(&opts).await,
            cmd => Err(anyhow!("Unknown command: {}", cmd)),
        }
    });

    let pretty = opts.pretty || (!opts.json && std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{:#}", e)}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    mnemonic: Option<String>,
    network: Option<String>,
    electrum_url: Option<String>,
    node_url: Option<String>,
    fee_sat: Option<u64>,
    index: u32,
    account: u32,
    broadcast: bool,
    verbose: bool,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

/// Fill unset variables from `.env` in the working directory, if present.
fn load_dotenv() {
    let Ok(contents) = std::fs::read_to_string(".env") else {
        return;
    };
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            if !value.is_empty() && env::var(key.trim()).is_err() {
                env::set_var(key.trim(), value);
            }
        }
    }
}

fn flag_value<T: std::str::FromStr>(flag: &str, value: Option<String>) -> Result<T, String> {
    let value = value.ok_or_else(|| format!("{} needs a value", flag))?;
    value.parse().map_err(|_| format!("{}: not a number: {}", flag, value))
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let next = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--broadcast" => opts.broadcast = true,
                "--verbose" | "-v" => opts.verbose = true,
                "--mnemonic" | "-m" => {
                    opts.mnemonic = next;
                    i += 1;
                }
                "--network" | "-n" => {
                    opts.network = next;
                    i += 1;
                }
                "--electrum" | "-e" => {
                    opts.electrum_url = next;
                    i += 1;
                }
                "--node" => {
                    opts.node_url = next;
                    i += 1;
                }
                "--fee" => {
                    opts.fee_sat = Some(flag_value(arg, next)?);
                    i += 1;
                }
                "--index" | "-i" => {
                    opts.index = flag_value(arg, next)?;
                    i += 1;
                }
                "--account" => {
                    opts.account = flag_value(arg, next)?;
                    i += 1;
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        opts.positional = positional;

        if opts.mnemonic.is_none() {
            opts.mnemonic = env::var("POUCH_MNEMONIC").ok().filter(|s| !s.is_empty());
        }
        Ok(opts)
    }

    fn arg(&self, n: usize) -> Option<&str> {
        self.positional.get(n).map(String::as_str)
    }
}

fn print_usage() {
    println!(
        r#"pouch - UTXO wallet

USAGE:
    pouch <command> [args] [options]

COMMANDS:
    address                 Derive a receive address
    balance [address]       Confirmed/unconfirmed balance (default: derived address)
    unspent [address]       Spendable outputs
    tx <txid>               Transaction with resolved input/output owners
    height                  Full node block height
    send <to> <amount_sat>  Build and sign a payment (add --broadcast to send)

OPTIONS:
    --mnemonic, -m <words>  BIP39 mnemonic (env: POUCH_MNEMONIC)
    --network, -n <net>     bitcoin|testnet|signet|regtest (env: POUCH_NETWORK)
    --electrum, -e <url>    tcp://host:port or ssl://host:port (env: POUCH_ELECTRUM_URL)
    --node <url>            Full node RPC URL (env: POUCH_NODE_URL)
    --fee <sat>             Flat fee in satoshis (env: POUCH_FEE_SAT)
    --index, -i <n>         Address index (default 0)
    --account <n>           Account index (default 0)
    --broadcast             Broadcast after signing
    --verbose, -v           Debug logging for wallet internals (RUST_LOG overrides)
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

EXAMPLES:
    POUCH_MNEMONIC="abandon ... about" pouch address --network testnet
    pouch send tb1q... 15000 --fee 300 --broadcast"#
    );
}

fn wallet_config(opts: &ParsedArgs) -> anyhow::Result<WalletConfig> {
    let mut config = WalletConfig::from_env()?;
    if let Some(name) = opts.network.as_deref() {
        let network = Network::from_str(name).ok_or_else(|| anyhow!("Unknown network: {}", name))?;
        // Switching network resets the network defaults, then re-applies flags.
        config = match network {
            Network::Bitcoin => WalletConfig::mainnet(),
            Network::Testnet => WalletConfig::testnet(),
            Network::Signet => WalletConfig::signet(),
            Network::Regtest => WalletConfig::regtest(),
        }
        .with_fee(config.fee_sat)
        .with_derivation_path(config.derivation_path.clone())
        .with_idle_timeout(config.idle_timeout)
        .with_request_timeout(config.request_timeout)
        .with_confirmations(config.confirmations)
        .accept_invalid_certs(config.accept_invalid_certs);
    }
    if let Some(url) = &opts.electrum_url {
        config = config.with_electrum(url.clone());
    }
    if let Some(url) = &opts.node_url {
        config = config.with_node(url.clone());
    }
    if let Some(fee) = opts.fee_sat {
        config = config.with_fee(fee);
    }
    Ok(config)
}

fn open_wallet(opts: &ParsedArgs) -> anyhow::Result<BitcoinWallet> {
    let mnemonic = opts
        .mnemonic
        .as_deref()
        .ok_or_else(|| anyhow!("No mnemonic. Use --mnemonic or POUCH_MNEMONIC"))?;
    let config = wallet_config(opts)?;
    debug!(network = config.network.as_str(), node = %config.node_url, "Opening wallet");
    Ok(BitcoinWallet::new(mnemonic, config)?)
}

/// Explicit address argument, or the derived one.
async fn target_address(wallet: &BitcoinWallet, opts: &ParsedArgs) -> anyhow::Result<String> {
    match opts.arg(0) {
        Some(address) => Ok(address.to_string()),
        None => Ok(wallet.get_address(opts.index, opts.account).await?.hash.clone()),
    }
}

async fn cmd_address(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let wallet = open_wallet(opts)?;
    let address = wallet.get_address(opts.index, opts.account).await?;
    Ok(json!({
        "address": address.hash,
        "index": address.index,
        "account": address.account_index,
        "network": wallet.config().network.as_str(),
    }))
}

async fn cmd_balance(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let wallet = open_wallet(opts)?;
    let address = target_address(&wallet, opts).await?;
    let balance = wallet.get_balance_detail(&address).await?;
    Ok(json!({"address": address, "confirmed": balance.confirmed, "unconfirmed": balance.unconfirmed}))
}

async fn cmd_unspent(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let wallet = open_wallet(opts)?;
    let address = target_address(&wallet, opts).await?;
    let unspent = wallet.list_unspent(&address).await?;
    let rows: Vec<Value> = unspent
        .iter()
        .map(|u| json!({"txid": u.transaction_hash.to_string(), "vout": u.output_index, "value": u.value}))
        .collect();
    Ok(json!({"address": address, "unspent": rows, "count": rows.len()}))
}

async fn cmd_tx(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let txid = opts.arg(0).context("usage: pouch tx <txid>")?;
    let wallet = open_wallet(opts)?;
    let tx: CoinTransaction = wallet.get_transaction(txid).await?;
    let scanned = wallet.resolver().scan_transaction(&tx).await?;
    Ok(serde_json::to_value(scanned)?)
}

async fn cmd_height(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let wallet = open_wallet(opts)?;
    Ok(json!({"height": wallet.get_last_block_height().await?}))
}

async fn cmd_send(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let (Some(to), Some(amount)) = (opts.arg(0), opts.arg(1)) else {
        bail!("usage: pouch send <to> <amount_sat> [--broadcast]");
    };
    let amount: u64 = amount.parse().with_context(|| format!("amount is not a number: {}", amount))?;

    let wallet = open_wallet(opts)?;
    let from = wallet.get_address(opts.index, opts.account).await?;
    let fee = wallet.estimate_transaction_fee(&from, to, amount).await?;
    let raw = wallet.create_transaction(&from, to, amount).await?;

    let broadcast = if opts.broadcast { Some(wallet.broadcast_transaction(&raw).await?) } else { None };
    Ok(json!({
        "txid": raw.hash,
        "hex": raw.data,
        "from": from.hash,
        "to": to,
        "amount_sat": amount,
        "fee_sat": fee,
        "broadcast": broadcast,
    }))
}
