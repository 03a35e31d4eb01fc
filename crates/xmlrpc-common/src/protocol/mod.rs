//! Protocol-level types shared by every codec: error families and the
//! in-band fault representation.

pub mod error;
pub mod fault;

pub use error::{EncodeError, ProtocolError};
pub use fault::{
    Fault, FAULT_INTERNAL, FAULT_INVALID_PARAMS, FAULT_NOT_WELL_FORMED, FAULT_UNKNOWN_METHOD,
};
