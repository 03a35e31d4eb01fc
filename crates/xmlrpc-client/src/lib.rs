//! XML-RPC Client
//!
//! This crate provides the calling half of the runtime: a
//! persistent-connection HTTP client that marshals arguments through a
//! [`Codec`](xmlrpc_common::Codec) (XML-RPC by default) and decodes the
//! reply into a value, a fault, or an error.
//!
//! # Connection discipline
//!
//! - The connection is dialled lazily on the first call and reused while
//!   the server keeps it open; `Connection: close` or any transport error
//!   drops it and the next call re-dials.
//! - At most one call is in flight per client. A concurrent call is
//!   rejected with [`ClientError::CallInFlight`] rather than queued, and
//!   the next request is never written before the previous response has
//!   been fully consumed.
//!
//! # Example
//!
//! ```no_run
//! use xmlrpc_client::Client;
//! use xmlrpc_common::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new("127.0.0.1", 8111);
//!     let pong = client.call("rpc_ping", &[]).await?;
//!     assert_eq!(pong, Value::Int(12345));
//!     Ok(())
//! }
//! ```

pub mod client;

pub use client::{Client, ClientConfig, ClientError};
