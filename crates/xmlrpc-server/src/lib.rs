//! XML-RPC Server
//!
//! This crate provides the server half of the runtime: a method
//! [`Registry`] with name-mapped registration, the request [`Dispatcher`],
//! and the hyper-based HTTP [`Server`] that ties them to a socket.
//!
//! # Overview
//!
//! A server is assembled in three steps:
//!
//! 1. Implement [`Service`] for a receiver, listing the methods it exposes
//!    with their declared parameter and return kinds.
//! 2. Register it (optionally through a name mapper that renames or drops
//!    methods) on the server's registry.
//! 3. Call [`Server::serve`]; one tokio task is spawned per accepted
//!    connection, and the immutable registry is shared across all of them.
//!
//! Dispatch failures never tear down the connection: they come back to the
//! caller as standardized faults (`-32700`, `-32601`, `-32602`, `-32603`)
//! rendered by whichever [`Codec`](xmlrpc_common::Codec) the server speaks.

pub mod dispatcher;
pub mod http_server;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use http_server::{Server, ServerConfig, ServerError};
pub use registry::{Method, MethodFn, Registry, Service};
