//! HTTP server for XML-RPC services.
//!
//! hyper provides the HTTP/1.1 framing; this module owns the accept loop
//! and hands each POST body to the [`Dispatcher`]. Every server owns its
//! own registry and listener, so any number of servers can coexist in one
//! process.
//!
//! Registration happens before the server starts: [`Server::registry_mut`]
//! is only reachable while you still own the `Server`, and
//! [`Server::serve`] consumes it. While serving, the registry is shared
//! read-only across connection tasks with no locking.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xmlrpc_common::{Kind, Value};
//! use xmlrpc_server::{Method, Server, Service};
//!
//! struct Status;
//!
//! impl Service for Status {
//!     fn methods(self: Arc<Self>) -> Vec<Method> {
//!         vec![Method::new("rpc_ping", [], [Kind::Int], |_| Ok(vec![Value::Int(12345)]))]
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut server = Server::new();
//!     server.registry_mut().register(Arc::new(Status));
//!     server.serve("127.0.0.1:8111".parse().unwrap()).await.unwrap();
//! }
//! ```

use crate::dispatcher::Dispatcher;
use crate::registry::Registry;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use xmlrpc_common::{Codec, Fault, WireResponse, XmlRpcCodec};

/// Server-side tunables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Request bodies over this size are rejected before decoding.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An XML-RPC server: a registry plus the HTTP plumbing around it.
pub struct Server {
    registry: Registry,
    codec: Arc<dyn Codec>,
    config: ServerConfig,
}

impl Server {
    /// A server speaking the native XML-RPC codec.
    pub fn new() -> Self {
        Self::with_codec(Arc::new(XmlRpcCodec::new()))
    }

    /// A server speaking an alternative codec.
    pub fn with_codec(codec: Arc<dyn Codec>) -> Self {
        Self {
            registry: Registry::new(),
            codec,
            config: ServerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// The registry to register services on. Only reachable before the
    /// server starts.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Bind `addr` and serve forever.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener. Useful when the caller needs the
    /// ephemeral port before the accept loop starts.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), ServerError> {
        let inner = Arc::new(ServerInner {
            dispatcher: Dispatcher::new(self.registry),
            codec: self.codec,
            config: self.config,
        });

        tracing::info!("XML-RPC server listening on {}", listener.local_addr()?);

        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let inner = inner.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let inner = inner.clone();
                    async move { inner.handle(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("error serving connection from {peer}: {err}");
                }
            });
        }
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

struct ServerInner {
    dispatcher: Dispatcher,
    codec: Arc<dyn Codec>,
    config: ServerConfig,
}

impl ServerInner {
    /// Handle one HTTP exchange. The handler is mounted at every path;
    /// `/RPC2` is the convention but the original servers answered
    /// anywhere.
    async fn handle(
        &self,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        if req.method() != hyper::Method::POST {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
            return Ok(response);
        }

        let body = match req.into_body().collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::error!("failed to read request body: {err}");
                let wire = self
                    .codec
                    .write_error(&Fault::internal("failed to read request body"));
                return Ok(to_http(wire));
            }
        };

        if body.len() > self.config.max_body_size {
            tracing::error!(
                "request body too large: {} bytes (max {})",
                body.len(),
                self.config.max_body_size
            );
            let wire = self.codec.write_error(&Fault::not_well_formed(format!(
                "request body exceeds {} bytes",
                self.config.max_body_size
            )));
            return Ok(to_http(wire));
        }

        let wire = self.dispatcher.dispatch(self.codec.as_ref(), &body);
        Ok(to_http(wire))
    }
}

fn to_http(wire: WireResponse) -> Response<Full<Bytes>> {
    match Response::builder()
        .status(wire.status)
        .header(hyper::header::CONTENT_TYPE, wire.content_type)
        .body(Full::new(Bytes::from(wire.body)))
    {
        Ok(response) => response,
        // only reachable with a codec that reports a nonsense status code
        Err(_) => {
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_body_size, 10 * 1024 * 1024);
        assert_eq!(config.with_max_body_size(512).max_body_size, 512);
    }

    #[test]
    fn test_to_http_carries_status_and_content_type() {
        let response = to_http(WireResponse {
            status: 200,
            content_type: "text/xml",
            body: b"<x/>".to_vec(),
        });
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(hyper::header::CONTENT_TYPE).unwrap(),
            "text/xml"
        );
    }
}
