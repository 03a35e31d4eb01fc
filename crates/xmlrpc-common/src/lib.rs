//! XML-RPC Protocol and Codecs
//!
//! This crate provides everything shared between the client and server
//! crates: the dynamic [`Value`] model, the streaming XML-RPC decoder and
//! encoder, the [`Fault`] representation, and the [`Codec`] abstraction that
//! lets the same transport and dispatch plumbing carry alternative wire
//! encodings.
//!
//! # Overview
//!
//! XML-RPC is remote procedure calling over HTTP: a `<methodCall>` document
//! is POSTed to the server, which answers with a `<methodResponse>` carrying
//! either result values or an in-band `<fault>`. The interesting machinery
//! lives in three layers:
//!
//! - **Value layer** ([`value`]): the nine wire types as a tagged enum,
//!   compared structurally.
//! - **Document layer** ([`xml`]): a lazy token stream over the input, an
//!   explicit state-machine decoder, and the inverse encoder. Round-trip is
//!   exact: `unmarshal(marshal(v)) == v` for every representable value.
//! - **Codec layer** ([`codec`]): the seam between wire format and
//!   transport. [`XmlRpcCodec`] is the native format; [`JsonRpcCodec`]
//!   carries the same calls as JSON.
//!
//! # Example
//!
//! ```
//! use xmlrpc_common::{unmarshal_str, Value};
//!
//! let doc = unmarshal_str(
//!     r#"<?xml version="1.0"?>
//!     <methodCall>
//!       <methodName>rpc_ping</methodName>
//!       <params><param><value><int>5</int></value></param></params>
//!     </methodCall>"#,
//! )?;
//! assert_eq!(doc.method_name, "rpc_ping");
//! assert_eq!(doc.params, Value::Int(5));
//! # Ok::<(), xmlrpc_common::ProtocolError>(())
//! ```

pub mod codec;
pub mod protocol;
pub mod value;
pub mod xml;

pub use codec::{Codec, JsonRpcCodec, Reply, WireResponse, XmlRpcCodec};
pub use protocol::{
    EncodeError, Fault, ProtocolError, FAULT_INTERNAL, FAULT_INVALID_PARAMS,
    FAULT_NOT_WELL_FORMED, FAULT_UNKNOWN_METHOD,
};
pub use value::{Kind, StructValue, Value};
pub use xml::{marshal_fault, marshal_request, marshal_response, unmarshal, unmarshal_str, Document};
