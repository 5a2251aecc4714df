//! RpcTransport - one Electrum connection, driven by the calling task.
//!
//! ```text
//! Disconnected ─connect─▶ Connecting ─▶ NegotiatingVersion ─server.version ok─▶ Ready
//!                                              │                                  │
//!                                              └──────── error ──▶ Closing ◀─close┘
//!                                                                     │
//!                                                                   Closed
//! ```
//!
//! Nothing is spawned. Reads only happen while a caller awaits a response, so
//! the idle timer runs only while something is outstanding.

use super::frame::FrameParser;
use crate::config::{ElectrumConfig, ElectrumEndpoint, Scheme};
use crate::error::{Error, Result, TransportError};
use crate::jsonrpc::{Request, Response};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const READ_CHUNK: usize = 16 * 1024;

/// Any duplex byte stream the transport can own.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    NegotiatingVersion,
    Ready,
    Closing,
    Closed,
}

#[derive(Debug)]
struct PendingRequest {
    method: String,
    expected_responses: usize,
}

type MessageObserver = Box<dyn FnMut(&Response) + Send>;
type TimeoutObserver = Box<dyn FnMut() + Send>;
type ErrorObserver = Box<dyn FnMut(&Error) + Send>;
type CloseObserver = Box<dyn FnMut() + Send>;

/// One slot per event kind. Registering again replaces the previous observer.
#[derive(Default)]
struct Observers {
    message: Option<MessageObserver>,
    timeout: Option<TimeoutObserver>,
    error: Option<ErrorObserver>,
    close: Option<CloseObserver>,
}

pub struct RpcTransport {
    config: ElectrumConfig,
    stream: Option<Box<dyn Stream>>,
    state: TransportState,
    parser: FrameParser,
    inbox: VecDeque<Response>,
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
    server_version: Option<Value>,
    observers: Observers,
}

impl RpcTransport {
    pub fn new(config: ElectrumConfig) -> Self {
        Self {
            config,
            stream: None,
            state: TransportState::Disconnected,
            parser: FrameParser::new(),
            inbox: VecDeque::new(),
            next_id: 0,
            pending: HashMap::new(),
            server_version: None,
            observers: Observers::default(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    /// `[server_software, protocol_version]` as reported during negotiation.
    pub fn server_version(&self) -> Option<&Value> {
        self.server_version.as_ref()
    }

    /// Requests written but not yet answered.
    pub fn pending_count(&self) -> usize {
        self.pending.values().map(|p| p.expected_responses).sum()
    }

    pub fn on_message(&mut self, f: impl FnMut(&Response) + Send + 'static) {
        self.observers.message = Some(Box::new(f));
    }

    pub fn on_timeout(&mut self, f: impl FnMut() + Send + 'static) {
        self.observers.timeout = Some(Box::new(f));
    }

    pub fn on_error(&mut self, f: impl FnMut(&Error) + Send + 'static) {
        self.observers.error = Some(Box::new(f));
    }

    pub fn on_close(&mut self, f: impl FnMut() + Send + 'static) {
        self.observers.close = Some(Box::new(f));
    }

    /// Dial the configured endpoint and negotiate the protocol version.
    pub async fn connect(&mut self) -> Result<()> {
        self.begin_connect()?;
        let endpoint = self.config.endpoint.clone();
        debug!(host = %endpoint.host, port = endpoint.port, scheme = ?endpoint.scheme, "Electrum connecting");

        let opened = open_stream(endpoint, self.config.accept_invalid_certs).await;
        match opened {
            Ok(stream) => self.negotiate(stream).await,
            Err(e) => {
                self.emit_error(&e);
                self.state = TransportState::Closed;
                Err(e)
            }
        }
    }

    /// Negotiate over a stream the caller already opened.
    pub async fn connect_with(&mut self, stream: impl Stream + 'static) -> Result<()> {
        self.begin_connect()?;
        self.negotiate(Box::new(stream)).await
    }

    fn begin_connect(&mut self) -> Result<()> {
        if self.state != TransportState::Disconnected {
            return Err(Error::Protocol(format!("connect in state {:?}", self.state)));
        }
        self.state = TransportState::Connecting;
        Ok(())
    }

    async fn negotiate(&mut self, stream: Box<dyn Stream>) -> Result<()> {
        self.stream = Some(stream);
        self.state = TransportState::NegotiatingVersion;

        let params = json!([self.config.client_name, self.config.protocol_version]);
        let outcome = match self.send("server.version", params).await {
            Ok(id) => self.wait_for(id).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(version) => {
                info!(server = %version, "Electrum session ready");
                self.server_version = Some(version);
                self.state = TransportState::Ready;
                Ok(())
            }
            Err(e) => {
                warn!("Electrum version negotiation failed: {}", e);
                self.close().await;
                Err(e)
            }
        }
    }

    /// Write one request line. Returns its id.
    pub async fn send(&mut self, method: &str, params: Value) -> Result<u64> {
        if !matches!(self.state, TransportState::Ready | TransportState::NegotiatingVersion) {
            return Err(Error::Protocol(format!("send {} in state {:?}", method, self.state)));
        }
        let id = self.next_id;
        let line = Request::new(id, method, params).to_line()?;

        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let written = match stream.write_all(&line).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            return Err(self.io_failure(e));
        }

        self.next_id += 1;
        self.pending.insert(id, PendingRequest { method: method.to_string(), expected_responses: 1 });
        debug!(id, method, "Electrum request sent");
        Ok(id)
    }

    /// Next correlated response, in arrival order.
    pub async fn next_response(&mut self) -> Result<Response> {
        loop {
            if let Some(response) = self.inbox.pop_front() {
                return Ok(response);
            }
            self.read_chunk().await?;
        }
    }

    /// Wait until `count` responses have arrived. Completion is by count only;
    /// ids are not checked here.
    pub async fn collect(&mut self, count: usize) -> Result<Vec<Response>> {
        let mut responses = Vec::with_capacity(count);
        while responses.len() < count {
            responses.push(self.next_response().await?);
        }
        Ok(responses)
    }

    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.send(method, params).await?;
        self.wait_for(id).await
    }

    /// Send every call, then collect as many responses as were sent. Results
    /// come back in call order. Error responses fail the batch once all
    /// responses are in.
    pub async fn batch(&mut self, calls: Vec<(&str, Value)>) -> Result<Vec<Value>> {
        let mut ids = Vec::with_capacity(calls.len());
        for (method, params) in calls {
            ids.push(self.send(method, params).await?);
        }

        let mut by_id: HashMap<u64, Response> = HashMap::with_capacity(ids.len());
        for response in self.collect(ids.len()).await? {
            if let Some(id) = response.id() {
                by_id.insert(id, response);
            }
        }

        ids.into_iter()
            .map(|id| {
                by_id
                    .remove(&id)
                    .ok_or_else(|| Error::Protocol(format!("no response for request {}", id)))?
                    .into_result()
            })
            .collect()
    }

    async fn wait_for(&mut self, id: u64) -> Result<Value> {
        loop {
            let response = self.next_response().await?;
            if response.id() == Some(id) {
                return response.into_result();
            }
            warn!(expected = id, got = ?response.id(), "Discarding uncorrelated response");
        }
    }

    async fn read_chunk(&mut self) -> Result<()> {
        let idle = self.config.idle_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let mut buf = vec![0u8; READ_CHUNK];

        let read = tokio::time::timeout(idle, stream.read(&mut buf)).await;
        let n = match read {
            Err(_) => {
                warn!(?idle, pending = self.pending.len(), "Electrum connection idle");
                if let Some(observer) = self.observers.timeout.as_mut() {
                    observer();
                }
                return Err(TransportError::IdleTimeout(idle).into());
            }
            Ok(Err(e)) => return Err(self.io_failure(e)),
            Ok(Ok(n)) => n,
        };

        if n == 0 {
            debug!(pending = self.pending.len(), "Electrum peer closed the connection");
            self.stream = None;
            self.finish_close();
            return Err(TransportError::Closed.into());
        }

        for frame in self.parser.push(&buf[..n]) {
            self.handle_frame(&frame)?;
        }
        Ok(())
    }

    fn handle_frame(&mut self, frame: &[u8]) -> Result<()> {
        if frame.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        let response = match Response::parse(frame) {
            Ok(r) => r,
            Err(e) => {
                self.emit_error(&e);
                return Err(e);
            }
        };
        if let Some(observer) = self.observers.message.as_mut() {
            observer(&response);
        }

        match response.id() {
            None => {
                if let Response::Notification { method, .. } = &response {
                    debug!(method = %method, "Skipping server notification");
                    return Ok(());
                }
                // Error responses to unparseable requests carry a null id.
                warn!("Response without id");
            }
            Some(id) => match self.pending.get_mut(&id) {
                Some(pending) => {
                    pending.expected_responses = pending.expected_responses.saturating_sub(1);
                    if pending.expected_responses == 0 {
                        if let Some(done) = self.pending.remove(&id) {
                            debug!(id, method = %done.method, "Electrum response");
                        }
                    }
                }
                None => warn!(id, "Response for unknown or already answered request"),
            },
        }
        self.inbox.push_back(response);
        Ok(())
    }

    /// A failed read or write discards the connection.
    fn io_failure(&mut self, e: std::io::Error) -> Error {
        let e = Error::from(e);
        warn!("Electrum connection failed: {}", e);
        self.emit_error(&e);
        self.stream = None;
        self.finish_close();
        e
    }

    fn emit_error(&mut self, e: &Error) {
        if let Some(observer) = self.observers.error.as_mut() {
            observer(e);
        }
    }

    /// End the socket and drop everything in flight. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.state == TransportState::Closed {
            return;
        }
        self.state = TransportState::Closing;
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Electrum shutdown: {}", e);
            }
        }
        self.finish_close();
    }

    fn finish_close(&mut self) {
        if !self.pending.is_empty() {
            debug!(dropped = self.pending.len(), "Closing with requests in flight");
        }
        self.pending.clear();
        self.inbox.clear();
        self.parser.clear();
        self.state = TransportState::Closed;
        if let Some(observer) = self.observers.close.as_mut() {
            observer();
        }
    }
}

async fn open_stream(endpoint: ElectrumEndpoint, accept_invalid_certs: bool) -> Result<Box<dyn Stream>> {
    let tcp = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
    match endpoint.scheme {
        Scheme::Tcp => Ok(Box::new(tcp) as Box<dyn Stream>),
        #[cfg(feature = "tls")]
        Scheme::Tls => {
            let tls = super::tls::connect(&endpoint.host, tcp, accept_invalid_certs).await?;
            Ok(Box::new(tls) as Box<dyn Stream>)
        }
        #[cfg(not(feature = "tls"))]
        Scheme::Tls => {
            let _ = accept_invalid_certs;
            Err(Error::UnsupportedOperation("built without the tls feature".into()))
        }
    }
}
