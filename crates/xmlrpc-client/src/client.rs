//! The calling side.
//!
//! A [`Client`] holds at most one connection to one server. The connection
//! is dialled lazily on the first call, kept across calls while the server
//! allows it, dropped on `Connection: close` or any transport error, and
//! re-dialled on the next call.
//!
//! One call may be in flight at a time. A sequence counter is claimed
//! atomically when a call starts and released only once the response body
//! has been fully consumed, so a second concurrent `call` is rejected
//! immediately with [`ClientError::CallInFlight`] and request bytes can
//! never interleave on the wire. A `Client` is cheap enough to create that
//! callers wanting parallel calls should simply use one client per task.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{header, Request};
use hyper_util::rt::TokioIo;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use xmlrpc_common::{Codec, EncodeError, Fault, ProtocolError, Reply, Value, XmlRpcCodec};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Client-side tunables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request path; defaults to the codec's conventional path.
    pub path: Option<String>,
    /// `user:password` for HTTP Basic auth, sent on every request.
    pub user_info: Option<String>,
    /// Response bodies over this size are rejected without decoding.
    pub max_response_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            path: None,
            user_info: None,
            max_response_size: 10 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_user_info(mut self, user_info: impl Into<String>) -> Self {
        self.user_info = Some(user_info.into());
        self
    }

    pub fn with_max_response_size(mut self, bytes: usize) -> Self {
        self.max_response_size = bytes;
        self
    }
}

/// Why a call failed. Exactly one of three families per the protocol's
/// error model: transport problems, undecodable documents, or an in-band
/// [`Fault`] from the remote procedure.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("a call is already in flight on this client")]
    CallInFlight,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("response body exceeds {0} bytes")]
    ResponseTooLarge(usize),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Fault(Fault),
}

impl ClientError {
    /// The in-band fault, when the remote procedure itself failed.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            ClientError::Fault(fault) => Some(fault),
            _ => None,
        }
    }
}

/// XML-RPC client for one remote server.
pub struct Client {
    host: String,
    port: u16,
    codec: Arc<dyn Codec>,
    config: ClientConfig,
    /// Source of request sequence numbers.
    counter: AtomicU64,
    /// Sequence number of the in-flight call, 0 when idle.
    seq: AtomicU64,
    conn: Mutex<Option<SendRequest<Full<Bytes>>>>,
}

impl Client {
    /// A client speaking the native XML-RPC codec to `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_codec(host, port, Arc::new(XmlRpcCodec::new()))
    }

    /// A client speaking an alternative codec.
    pub fn with_codec(host: impl Into<String>, port: u16, codec: Arc<dyn Codec>) -> Self {
        Self {
            host: host.into(),
            port,
            codec,
            config: ClientConfig::default(),
            counter: AtomicU64::new(0),
            seq: AtomicU64::new(0),
            conn: Mutex::new(None),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Call a procedure on the remote server.
    ///
    /// Returns the decoded result value, a [`ClientError::Fault`] when the
    /// remote procedure reported an in-band fault, or another error variant
    /// for transport and protocol failures. Checked in that order by
    /// convention: error, fault, value.
    pub async fn call(&self, method_name: &str, args: &[Value]) -> Result<Value, ClientError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.seq
            .compare_exchange(0, seq, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ClientError::CallInFlight)?;
        let _guard = InFlight { seq: &self.seq };

        self.exchange(seq, method_name, args).await
    }

    async fn exchange(
        &self,
        seq: u64,
        method_name: &str,
        args: &[Value],
    ) -> Result<Value, ClientError> {
        let body = self.codec.encode_request(seq, method_name, args)?;
        let request = self.build_request(body)?;

        let mut conn = self.conn.lock().await;
        if conn.as_ref().map_or(true, SendRequest::is_closed) {
            *conn = Some(self.dial().await?);
        }
        let sender = conn
            .as_mut()
            .ok_or_else(|| ClientError::Transport("connection is unavailable".into()))?;

        let response = match sender.send_request(request).await {
            Ok(response) => response,
            Err(err) => {
                // the connection is in an unknown state; never reuse it
                *conn = None;
                return Err(err.into());
            }
        };

        let status = response.status();
        let server_closes = response
            .headers()
            .get(header::CONNECTION)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("close"));

        let bytes = match response.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                *conn = None;
                return Err(err.into());
            }
        };

        if server_closes {
            tracing::debug!("server requested connection close");
            *conn = None;
        }
        drop(conn);

        if bytes.len() > self.config.max_response_size {
            return Err(ClientError::ResponseTooLarge(self.config.max_response_size));
        }
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).trim_end().to_owned(),
            });
        }

        match self.codec.decode_response(&bytes)? {
            Reply::Value(value) => Ok(value),
            Reply::Fault(fault) => Err(ClientError::Fault(fault)),
        }
    }

    async fn dial(&self) -> Result<SendRequest<Full<Bytes>>, ClientError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let io = TokioIo::new(stream);
        let (sender, connection) = http1::handshake(io).await?;

        // the connection future owns the socket; it completes when either
        // side closes, which is how a held sender turns up is_closed()
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::debug!("connection ended: {err}");
            }
        });

        tracing::debug!("dialled {}:{}", self.host, self.port);
        Ok(sender)
    }

    fn build_request(&self, body: Vec<u8>) -> Result<Request<Full<Bytes>>, ClientError> {
        let path = self.config.path.as_deref().unwrap_or(self.codec.path());

        let mut builder = Request::builder()
            .method(hyper::Method::POST)
            .uri(path)
            .header(header::HOST, format!("{}:{}", self.host, self.port))
            .header(header::CONTENT_TYPE, self.codec.content_type())
            .header(header::CONTENT_LENGTH, body.len());

        if let Some(user_info) = &self.config.user_info {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Basic {}", BASE64.encode(user_info)),
            );
        }

        builder
            .body(Full::new(Bytes::from(body)))
            .map_err(|err| ClientError::Transport(err.to_string()))
    }
}

/// Clears the in-flight marker on every exit path, including panics.
struct InFlight<'a> {
    seq: &'a AtomicU64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.seq.store(0, Ordering::Release);
    }
}
