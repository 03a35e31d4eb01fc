//! The XML-RPC document layer: token stream, decoder, encoder.

pub mod marshal;
pub mod token;
pub mod unmarshal;

pub use marshal::{marshal_fault, marshal_request, marshal_response};
pub use token::{TokenStream, XmlToken};
pub use unmarshal::{unmarshal, unmarshal_str, Document};
