//! Pluggable wire encodings.
//!
//! The client and server never touch document syntax directly; everything
//! goes through a [`Codec`], which owns the content type, the conventional
//! request path, and the four serialize/deserialize directions. Two
//! implementations ship: [`XmlRpcCodec`] (the native format) and
//! [`JsonRpcCodec`] (the same dispatch plumbing over a JSON wire shape).
//!
//! # Argument coercion
//!
//! Some encodings are less typed than the method signatures they carry —
//! JSON has a single number type. [`Codec::coerce_arg`] is the rescue hook
//! the dispatcher calls on a type mismatch before giving up; the XML codec
//! never coerces.

mod json;
mod xml;

pub use json::JsonRpcCodec;
pub use xml::XmlRpcCodec;

use crate::protocol::{EncodeError, Fault, ProtocolError};
use crate::value::{Kind, Value};
use crate::xml::unmarshal::Document;

/// A decoded response: the remote call either produced a value or an
/// in-band fault.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Value(Value),
    Fault(Fault),
}

/// An HTTP-shaped reply produced by a codec: the transport writes it out
/// verbatim. Faults and pre-dispatch errors go through this so each codec
/// keeps its own convention (XML-RPC faults ride a 200, the JSON codec
/// reports a 400).
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Conversion between in-memory values and on-the-wire bytes.
pub trait Codec: Send + Sync {
    /// MIME type for request and response bodies.
    fn content_type(&self) -> &'static str;

    /// Conventional request path on the server.
    fn path(&self) -> &'static str;

    /// Encode a call. `seq` is the client's request sequence number; codecs
    /// that carry a request id derive it from this.
    fn encode_request(
        &self,
        seq: u64,
        method_name: &str,
        params: &[Value],
    ) -> Result<Vec<u8>, EncodeError>;

    /// Decode a response body into a value or a fault.
    fn decode_response(&self, body: &[u8]) -> Result<Reply, ProtocolError>;

    /// Decode a request body. The returned document's `fault` is only ever
    /// set for the pathological case of a client sending a fault body.
    fn decode_request(&self, body: &[u8]) -> Result<Document, ProtocolError>;

    /// Encode a successful response carrying the handler's return values.
    fn encode_response(&self, returns: &[Value]) -> Result<Vec<u8>, EncodeError>;

    /// Render a fault (or pre-dispatch error) in this codec's convention.
    /// Infallible: a codec must always be able to report an error.
    fn write_error(&self, fault: &Fault) -> WireResponse;

    /// Attempt to convert `arg` to the declared kind `want`. `None` means no
    /// coercion applies and the mismatch stands.
    fn coerce_arg(&self, arg: &Value, want: Kind) -> Option<Value>;
}
