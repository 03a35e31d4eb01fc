use thiserror::Error;

/// A document could not be decoded.
///
/// Protocol errors are terminal for the document being read: the stream is
/// left mid-document and must not be reused. Messages carry the offending
/// tag and the parser state so a failing peer can be diagnosed from the
/// error alone.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("tag name is not valid UTF-8")]
    BadTagName,

    #[error("unexpected <{tag}> in {state}")]
    UnexpectedStart { tag: String, state: &'static str },

    #[error("unexpected </{tag}> in {state}")]
    UnexpectedEnd { tag: String, state: &'static str },

    #[error("found non-whitespace characters {text:?} in {state}")]
    StrayText { text: String, state: &'static str },

    #[error("unknown type element <{0}> inside <value>")]
    UnknownType(String),

    #[error("found multiple type elements (<{0}> and <{1}>) inside <value>")]
    MultipleTypes(String, String),

    #[error("multiple method names ({0:?} and {1:?})")]
    MultipleMethodNames(String, String),

    #[error("bad <boolean> value {0:?}")]
    BadBoolean(String),

    #[error("bad <int> value {0:?}")]
    BadInt(String),

    #[error("bad <double> value {0:?}")]
    BadDouble(String),

    #[error("bad <dateTime.iso8601> value {0:?}")]
    BadDateTime(String),

    #[error("bad <base64> value: {0}")]
    BadBase64(#[from] base64::DecodeError),

    #[error("duplicate struct member {0:?}")]
    DuplicateMember(String),

    #[error("fault value is not a fault struct: {0}")]
    BadFault(String),

    #[error("unexpected end of document in {0}")]
    UnexpectedEof(&'static str),

    #[error("unsupported XML construct: {0}")]
    Unsupported(&'static str),

    #[error("invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid {0} body: {1}")]
    BadEnvelope(&'static str, String),
}

/// A value could not be rendered to the wire.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("I/O error writing document: {0}")]
    Io(#[from] std::io::Error),

    #[error("string value contains a NUL byte")]
    NulByte,

    #[error("struct member name {0:?} is not an interop-safe name")]
    BadMemberName(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
