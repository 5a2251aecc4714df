//! Shared fixtures: a scripted Electrum server, a minimal HTTP JSON-RPC node
//! and an in-process NodeClient.

#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};
use pouch::node::{BlockVerbose, BlockchainInfo, NodeClient};
use pouch::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

// Well-known test phrase, never use with real funds
pub const TEST_MNEMONIC: &str = "radar blur cabbage chef fix engine embark joy scheme fiction master release";
pub const TEST_ADDRESS: &str = "bc1qc5semafyf4zxfvul968ldfqmxrxynnyta5vhhg";
/// Genesis coinbase output address.
pub const OTHER_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

/// Answer for one Electrum request: a result or an `(code, message)` error.
pub type Reply = std::result::Result<Value, (i64, String)>;
pub type Handler = Arc<dyn Fn(&str, &Value) -> Reply + Send + Sync>;

/// Line-protocol Electrum server on 127.0.0.1. `server.version` is answered
/// automatically, everything else goes to the handler.
pub struct MockElectrum {
    pub addr: SocketAddr,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockElectrum {
    pub async fn start(handler: impl Fn(&str, &Value) -> Reply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let recorded = calls.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let handler = handler.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        let Ok(request) = serde_json::from_str::<Value>(&line) else {
                            continue;
                        };
                        let method = request["method"].as_str().unwrap_or_default().to_string();
                        recorded.lock().unwrap().push(method.clone());
                        let reply = if method == "server.version" {
                            Ok(json!(["MockElectrum 1.0", "1.4"]))
                        } else {
                            handler(&method, &request["params"])
                        };
                        let frame = match reply {
                            Ok(result) => json!({"jsonrpc": "2.0", "id": request["id"], "result": result}),
                            Err((code, message)) => {
                                json!({"jsonrpc": "2.0", "id": request["id"], "error": {"code": code, "message": message}})
                            }
                        };
                        let mut out = frame.to_string().into_bytes();
                        out.push(b'\n');
                        if write.write_all(&out).await.is_err() {
                            break;
                        }
                    }
                });
            }
        });

        Self { addr, calls }
    }

    pub fn url(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    /// Methods received so far, `server.version` included.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| m.as_str() == method).count()
    }
}

/// One request seen by [`MockHttpNode`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub authorization: Option<String>,
    pub body: Value,
}

/// Answers every POST with a fixed status and body, one connection per
/// request.
pub struct MockHttpNode {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockHttpNode {
    pub async fn start(status: u16, body: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let body = body.to_string();

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let Some(request) = read_http_request(&mut socket).await else {
                    continue;
                };
                recorded.lock().unwrap().push(request);
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    if status == 200 { "OK" } else { "Error" },
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn url_with_credentials(&self, user: &str, password: &str) -> String {
        format!("http://{}:{}@{}/", user, password, self.addr)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_http_request(socket: &mut tokio::net::TcpStream) -> Option<HttpRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut content_length = 0usize;
    let mut authorization = None;
    for line in head.lines() {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = serde_json::from_slice(&buf[header_end..]).unwrap_or(Value::Null);
    Some(HttpRequest { authorization, body })
}

/// In-process full node.
#[derive(Default)]
pub struct MockNode {
    pub height: u64,
    pub txs: HashMap<Txid, Transaction>,
    pub blocks: HashMap<u64, BlockVerbose>,
    pub mempool: Vec<String>,
    pub broadcast: Mutex<Vec<String>>,
}

impl MockNode {
    pub fn at_height(height: u64) -> Self {
        Self { height, ..Default::default() }
    }

    pub fn with_tx(mut self, tx: Transaction) -> Self {
        self.txs.insert(tx.compute_txid(), tx);
        self
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.broadcast.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn blockchain_info(&self) -> Result<BlockchainInfo> {
        Ok(BlockchainInfo { blocks: self.height, chain: Some("main".into()) })
    }

    async fn block_hash(&self, height: u64) -> Result<String> {
        self.blocks
            .get(&height)
            .map(|b| b.hash.clone())
            .ok_or(Error::Rpc { code: -8, message: "Block height out of range".into() })
    }

    async fn block(&self, hash: &str) -> Result<BlockVerbose> {
        self.blocks
            .values()
            .find(|b| b.hash == hash)
            .cloned()
            .ok_or(Error::Rpc { code: -5, message: "Block not found".into() })
    }

    async fn raw_transaction(&self, txid: &Txid) -> Result<Transaction> {
        self.txs
            .get(txid)
            .cloned()
            .ok_or(Error::Rpc { code: -5, message: "No such mempool or blockchain transaction".into() })
    }

    async fn raw_mempool(&self) -> Result<Vec<String>> {
        Ok(self.mempool.clone())
    }

    async fn send_raw_transaction(&self, hex: &str) -> Result<String> {
        self.broadcast.lock().unwrap().push(hex.to_string());
        let tx = pouch::chain::types::decode_transaction_hex(hex)?;
        Ok(tx.compute_txid().to_string())
    }
}

/// A transaction paying `values` to `script`, spending a made-up outpoint so
/// each seed gives a distinct txid.
pub fn funding_tx(seed: u8, script: &ScriptBuf, values: &[u64]) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint { txid: Txid::from_byte_array([seed; 32]), vout: 0 },
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: values
            .iter()
            .map(|v| TxOut { value: Amount::from_sat(*v), script_pubkey: script.clone() })
            .collect(),
    }
}

/// One `listunspent` row per output of every transaction in `funding`.
pub fn unspent_rows(funding: &[Transaction]) -> Vec<Value> {
    funding
        .iter()
        .flat_map(|tx| {
            let txid = tx.compute_txid().to_string();
            tx.output
                .iter()
                .enumerate()
                .map(move |(pos, out)| json!({"height": 100, "tx_pos": pos, "tx_hash": txid, "value": out.value.to_sat()}))
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Electrum handler serving `funding` as the address's only history.
pub fn wallet_server(funding: Vec<Transaction>, confirmed: u64) -> impl Fn(&str, &Value) -> Reply + Send + Sync + 'static {
    let rows = unspent_rows(&funding);
    index_server(funding, rows, confirmed)
}

/// Electrum handler answering `listunspent` with `rows` verbatim and serving
/// the bodies in `bodies`.
pub fn index_server(
    bodies: Vec<Transaction>,
    rows: Vec<Value>,
    confirmed: u64,
) -> impl Fn(&str, &Value) -> Reply + Send + Sync + 'static {
    let by_id: HashMap<String, Transaction> = bodies.iter().map(|tx| (tx.compute_txid().to_string(), tx.clone())).collect();

    move |method, params| match method {
        "blockchain.scripthash.listunspent" => Ok(Value::Array(rows.clone())),
        "blockchain.scripthash.get_balance" => Ok(json!({"confirmed": confirmed, "unconfirmed": -25})),
        "blockchain.headers.subscribe" => Ok(json!({"height": 850000, "hex": "00".repeat(80)})),
        "blockchain.transaction.get" => {
            let txid = params[0].as_str().unwrap_or_default();
            by_id
                .get(txid)
                .map(|tx| json!(pouch::chain::types::encode_transaction_hex(tx)))
                .ok_or((2, format!("daemon error: no such transaction {}", txid)))
        }
        other => Err((-32601, format!("unknown method {}", other))),
    }
}
