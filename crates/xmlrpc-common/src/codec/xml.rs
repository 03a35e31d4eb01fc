//! The native XML-RPC codec: `text/xml` bodies POSTed to `/RPC2`.

use crate::codec::{Codec, Reply, WireResponse};
use crate::protocol::{EncodeError, Fault, ProtocolError};
use crate::value::{Kind, Value};
use crate::xml::marshal::{fault_to_vec, request_to_vec, response_to_vec};
use crate::xml::unmarshal::{unmarshal, Document};

/// XML-RPC over HTTP: `POST /RPC2` with `Content-Type: text/xml`, faults
/// carried in-band on a 200 response.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlRpcCodec;

impl XmlRpcCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for XmlRpcCodec {
    fn content_type(&self) -> &'static str {
        "text/xml"
    }

    fn path(&self) -> &'static str {
        "/RPC2"
    }

    fn encode_request(
        &self,
        _seq: u64,
        method_name: &str,
        params: &[Value],
    ) -> Result<Vec<u8>, EncodeError> {
        request_to_vec(method_name, params)
    }

    fn decode_response(&self, body: &[u8]) -> Result<Reply, ProtocolError> {
        let doc = unmarshal(body)?;
        Ok(match doc.fault {
            Some(fault) => Reply::Fault(fault),
            None => Reply::Value(doc.params),
        })
    }

    fn decode_request(&self, body: &[u8]) -> Result<Document, ProtocolError> {
        unmarshal(body)
    }

    fn encode_response(&self, returns: &[Value]) -> Result<Vec<u8>, EncodeError> {
        response_to_vec(returns)
    }

    fn write_error(&self, fault: &Fault) -> WireResponse {
        // Encoding a fault only fails if its message cannot be carried in
        // XML; degrade to a generic internal fault rather than panicking.
        let body = fault_to_vec(fault).unwrap_or_else(|_| {
            fault_to_vec(&Fault::internal("failed to encode fault")).unwrap_or_default()
        });
        WireResponse {
            status: 200,
            content_type: self.content_type(),
            body,
        }
    }

    fn coerce_arg(&self, _arg: &Value, _want: Kind) -> Option<Value> {
        // XML-RPC is fully typed on the wire; a mismatch is a mismatch.
        None
    }
}
