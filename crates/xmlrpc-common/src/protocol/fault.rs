//! In-band call failures.
//!
//! A fault is an error raised by the remote procedure itself (or by the
//! dispatcher on its behalf), carried inside a well-formed response document.
//! It is distinct from a transport failure and from a malformed document, and
//! callers see it as its own case.
//!
//! # Fault codes
//!
//! The four semi-standard codes every XML-RPC implementation agrees on:
//! - `-32700`: request body was not well formed
//! - `-32601`: unknown method
//! - `-32602`: invalid parameters (arity or type mismatch)
//! - `-32603`: internal error in the handler

use crate::protocol::error::ProtocolError;
use crate::value::{StructValue, Value};
use std::fmt;

/// Request body was not well formed.
pub const FAULT_NOT_WELL_FORMED: i32 = -32700;
/// The method does not exist on this server.
pub const FAULT_UNKNOWN_METHOD: i32 = -32601;
/// Argument count or argument types did not match the method signature.
pub const FAULT_INVALID_PARAMS: i32 = -32602;
/// The handler failed internally.
pub const FAULT_INTERNAL: i32 = -32603;

/// An error or exception in the procedure call being run on the remote
/// machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Fault `-32700` for a body that failed to decode.
    pub fn not_well_formed(detail: impl fmt::Display) -> Self {
        Self::new(FAULT_NOT_WELL_FORMED, format!("not well formed: {detail}"))
    }

    /// Fault `-32601` for a method name with no registered handler.
    pub fn unknown_method(name: &str) -> Self {
        Self::new(FAULT_UNKNOWN_METHOD, format!("Unknown method {name:?}"))
    }

    /// Fault `-32602` for an arity or type mismatch.
    pub fn invalid_params(detail: impl fmt::Display) -> Self {
        Self::new(FAULT_INVALID_PARAMS, detail.to_string())
    }

    /// Fault `-32603` for a handler that failed or panicked.
    pub fn internal(detail: impl fmt::Display) -> Self {
        Self::new(FAULT_INTERNAL, detail.to_string())
    }

    /// The `{faultCode, faultString}` struct this fault is encoded as.
    pub fn to_value(&self) -> Value {
        let mut s = StructValue::new();
        s.insert("faultCode", Value::Int(self.code));
        s.insert("faultString", Value::String(self.message.clone()));
        Value::Struct(s)
    }

    /// Read a fault back out of a decoded `<fault>` value.
    ///
    /// The value must be a struct with an integer `faultCode` and a string
    /// `faultString`; extra members are ignored.
    pub fn from_value(value: &Value) -> Result<Self, ProtocolError> {
        let s = value
            .as_struct()
            .ok_or_else(|| ProtocolError::BadFault(format!("expected a struct, got {}", value.kind())))?;

        let code = match s.get("faultCode") {
            Some(Value::Int(code)) => *code,
            Some(other) => {
                return Err(ProtocolError::BadFault(format!(
                    "faultCode should be an int, not {}",
                    other.kind()
                )))
            }
            None => return Err(ProtocolError::BadFault("missing faultCode".into())),
        };
        let message = match s.get("faultString") {
            Some(Value::String(msg)) => msg.clone(),
            Some(other) => {
                return Err(ProtocolError::BadFault(format!(
                    "faultString should be a string, not {}",
                    other.kind()
                )))
            }
            None => return Err(ProtocolError::BadFault("missing faultString".into())),
        };

        Ok(Self { code, message })
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code#{})", self.message, self.code)
    }
}

impl std::error::Error for Fault {}
