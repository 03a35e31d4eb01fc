//! JSON wire encoding over the same plumbing.
//!
//! The shapes are the classic JSON-RPC 1.0 ones:
//!
//! - request: `{"method": "...", "params": [...], "id": N}`
//! - response: `{"result": ..., "err": null | "message"}`
//!
//! JSON collapses every number into one type, so this codec implements
//! [`Codec::coerce_arg`] to narrow numbers back into the kind a method
//! declares; the dispatch logic itself stays format-agnostic.

use crate::codec::{Codec, Reply, WireResponse};
use crate::protocol::{EncodeError, Fault, ProtocolError};
use crate::value::{Kind, StructValue, Value};
use crate::xml::unmarshal::{Document, DATETIME_FORMAT};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

/// JSON codec: `application/json` bodies POSTed to `/`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRpcCodec;

impl JsonRpcCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JsonRpcCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn path(&self) -> &'static str {
        "/"
    }

    fn encode_request(
        &self,
        seq: u64,
        method_name: &str,
        params: &[Value],
    ) -> Result<Vec<u8>, EncodeError> {
        let params: Vec<serde_json::Value> = params.iter().map(value_to_json).collect();
        // seq is nonzero while a call is in flight, so it serves as the id
        let request = json!({
            "method": method_name,
            "params": params,
            "id": seq,
        });
        Ok(serde_json::to_vec(&request)?)
    }

    fn decode_response(&self, body: &[u8]) -> Result<Reply, ProtocolError> {
        let parsed: serde_json::Value = serde_json::from_slice(body)?;
        let map = parsed.as_object().ok_or_else(|| {
            ProtocolError::BadEnvelope("JSON response", "value is not an object".into())
        })?;

        match map.get("err") {
            Some(serde_json::Value::Null) | None => {}
            Some(err) => {
                let message = match err.as_str() {
                    Some(s) => s.to_owned(),
                    None => err.to_string(),
                };
                // The wire carries no numeric code on this channel.
                return Ok(Reply::Fault(Fault::new(0, message)));
            }
        }

        let result = map.get("result").unwrap_or(&serde_json::Value::Null);
        let value = match result.as_array() {
            Some(items) if items.len() == 1 => json_to_value(&items[0]),
            Some(items) => Value::Array(items.iter().map(json_to_value).collect()),
            None => json_to_value(result),
        };
        Ok(Reply::Value(value))
    }

    fn decode_request(&self, body: &[u8]) -> Result<Document, ProtocolError> {
        let parsed: serde_json::Value = serde_json::from_slice(body)?;
        let map = parsed.as_object().ok_or_else(|| {
            ProtocolError::BadEnvelope("JSON request", "value is not an object".into())
        })?;

        let method_name = map
            .get("method")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| {
                ProtocolError::BadEnvelope("JSON request", "method name is not a string".into())
            })?
            .to_owned();
        let params = map
            .get("params")
            .map(json_to_value)
            .unwrap_or(Value::Nil);

        Ok(Document {
            method_name,
            params,
            fault: None,
        })
    }

    fn encode_response(&self, returns: &[Value]) -> Result<Vec<u8>, EncodeError> {
        let result: Vec<serde_json::Value> = returns.iter().map(value_to_json).collect();
        let response = json!({
            "result": result,
            "err": null,
        });
        Ok(serde_json::to_vec(&response)?)
    }

    fn write_error(&self, fault: &Fault) -> WireResponse {
        let mut body = fault.message.clone().into_bytes();
        body.push(b'\n');
        WireResponse {
            status: 400,
            content_type: "text/plain; charset=utf-8",
            body,
        }
    }

    fn coerce_arg(&self, arg: &Value, want: Kind) -> Option<Value> {
        match (arg, want) {
            // JSON numbers with no fraction arrive as doubles from peers
            // that only have one number type.
            (Value::Double(d), Kind::Int) => {
                if d.fract() == 0.0 && *d >= f64::from(i32::MIN) && *d <= f64::from(i32::MAX) {
                    Some(Value::Int(*d as i32))
                } else {
                    None
                }
            }
            (Value::Int(i), Kind::Double) => Some(Value::Double(f64::from(*i))),
            _ => None,
        }
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Nil => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => json!(s),
        Value::DateTime(dt) => json!(dt.format(DATETIME_FORMAT).to_string()),
        Value::Base64(bytes) => json!(BASE64.encode(bytes)),
        Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        Value::Struct(members) => {
            let map: serde_json::Map<String, serde_json::Value> = members
                .iter()
                .map(|(k, v)| (k.to_owned(), value_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) if i32::try_from(i).is_ok() => Value::Int(i as i32),
            _ => Value::Double(n.as_f64().unwrap_or(0.0)),
        },
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => Value::Struct(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect::<StructValue>(),
        ),
    }
}
