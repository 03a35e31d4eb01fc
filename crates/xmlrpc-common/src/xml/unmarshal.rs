//! Decoding `<methodCall>` / `<methodResponse>` documents.
//!
//! The grammar has two layers and the decoder mirrors them:
//!
//! - [`Unmarshaller::document`] walks the envelope with an explicit
//!   [`DocState`] machine: document tag, optional method name, then either a
//!   parameter list or (responses only) a `<fault>`.
//! - Values are read by recursive descent: a `<value>` body holds at most
//!   one type element, `<struct>` and `<array>` recurse back into values.
//!
//! Whitespace between structural tags is ignored; anything else outside a
//! string position is a protocol error naming the parser state. A protocol
//! error is terminal for the document.

use crate::protocol::{Fault, ProtocolError};
use crate::value::{StructValue, Value};
use crate::xml::token::{is_whitespace, TokenStream, XmlToken};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::NaiveDateTime;
use std::io::BufRead;

/// Wire format of `<dateTime.iso8601>`.
pub(crate) const DATETIME_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// A fully decoded document.
///
/// Exactly one of the three shapes is populated:
/// - a call: `method_name` set, `params` decoded, `fault` empty;
/// - a response: `method_name` empty, `params` decoded, `fault` empty;
/// - a fault response: `method_name` empty, `params` [`Value::Nil`],
///   `fault` set.
///
/// `params` is the extracted form: zero parameters decode to
/// [`Value::Nil`], one to the value itself, two or more to a
/// [`Value::Array`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub method_name: String,
    pub params: Value,
    pub fault: Option<Fault>,
}

impl Document {
    /// True for a `<methodCall>`, false for a `<methodResponse>`.
    pub fn is_call(&self) -> bool {
        !self.method_name.is_empty()
    }
}

/// Decode one document from a byte reader.
pub fn unmarshal<R: BufRead>(reader: R) -> Result<Document, ProtocolError> {
    Unmarshaller::new(reader).document()
}

/// Decode one document from a string.
pub fn unmarshal_str(s: &str) -> Result<Document, ProtocolError> {
    unmarshal(s.as_bytes())
}

/// Envelope parser state. One variant per grammar position, so every
/// transition is an exhaustive `match` rather than state arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocState {
    /// Expect `<methodCall>` or `<methodResponse>`.
    Start,
    /// After `<methodCall>`: expect `<methodName>`.
    MethodName,
    /// Inside `<methodName>`: collect text until the end tag.
    InMethodName,
    /// Expect `<params>`, or `<fault>` in a response.
    Params,
    /// Expect `<param>` or `</params>`.
    ParamOrEnd,
    /// After `<param>`: expect `<value>`.
    ParamValue,
    /// After a parameter value: expect `</param>`.
    EndParam,
    /// After `<fault>`: expect `<value>`.
    FaultValue,
    /// After the fault value: expect `</fault>`.
    EndFault,
    /// Expect the document end tag.
    EndMethod,
}

impl DocState {
    fn name(self) -> &'static str {
        match self {
            DocState::Start => "state Method",
            DocState::MethodName => "state MethodName",
            DocState::InMethodName => "state InName",
            DocState::Params => "state Params",
            DocState::ParamOrEnd => "state Param",
            DocState::ParamValue => "state Value",
            DocState::EndParam => "state EndParam",
            DocState::FaultValue => "state FaultValue",
            DocState::EndFault => "state EndFault",
            DocState::EndMethod => "state EndMethod",
        }
    }
}

struct Unmarshaller<R: BufRead> {
    tokens: TokenStream<R>,
}

impl<R: BufRead> Unmarshaller<R> {
    fn new(reader: R) -> Self {
        Self {
            tokens: TokenStream::new(reader),
        }
    }

    fn next(&mut self) -> Result<XmlToken, ProtocolError> {
        self.tokens.next_token()
    }

    fn document(mut self) -> Result<Document, ProtocolError> {
        let mut state = DocState::Start;
        let mut is_response = false;
        let mut method_name = String::new();
        let mut params: Vec<Value> = Vec::new();
        let mut fault: Option<Fault> = None;

        loop {
            let token = self.next()?;
            match token {
                XmlToken::ProcInst => continue,
                XmlToken::Eof => return Err(ProtocolError::UnexpectedEof(state.name())),
                XmlToken::Text(text) => {
                    if state == DocState::InMethodName {
                        method_name.push_str(&text);
                    } else if !is_whitespace(&text) {
                        return Err(ProtocolError::StrayText {
                            text,
                            state: state.name(),
                        });
                    }
                }
                XmlToken::Start(tag) => match (state, tag.as_str()) {
                    (DocState::Start, "methodCall") => {
                        is_response = false;
                        state = DocState::MethodName;
                    }
                    (DocState::Start, "methodResponse") => {
                        is_response = true;
                        state = DocState::Params;
                    }
                    (DocState::MethodName, "methodName") => state = DocState::InMethodName,
                    (DocState::Params, "params") => state = DocState::ParamOrEnd,
                    (DocState::Params, "fault") if is_response => state = DocState::FaultValue,
                    (DocState::Params, "methodName") => {
                        // a second <methodName>; read its text for diagnostics
                        let second = self.read_text_until_end("methodName")?;
                        return Err(ProtocolError::MultipleMethodNames(method_name, second));
                    }
                    (DocState::ParamOrEnd, "param") => state = DocState::ParamValue,
                    (DocState::ParamValue, "value") => {
                        params.push(self.read_value_body()?);
                        state = DocState::EndParam;
                    }
                    (DocState::FaultValue, "value") => {
                        let value = self.read_value_body()?;
                        fault = Some(Fault::from_value(&value)?);
                        state = DocState::EndFault;
                    }
                    (state, _) => {
                        return Err(ProtocolError::UnexpectedStart {
                            tag: tag.clone(),
                            state: state.name(),
                        })
                    }
                },
                XmlToken::End(tag) => match (state, tag.as_str()) {
                    (DocState::InMethodName, "methodName") => state = DocState::Params,
                    (DocState::ParamOrEnd, "params") => state = DocState::EndMethod,
                    (DocState::EndParam, "param") => state = DocState::ParamOrEnd,
                    (DocState::EndFault, "fault") => state = DocState::EndMethod,
                    (DocState::EndMethod, "methodCall") if !is_response => break,
                    (DocState::EndMethod, "methodResponse") if is_response => break,
                    (state, _) => {
                        return Err(ProtocolError::UnexpectedEnd {
                            tag: tag.clone(),
                            state: state.name(),
                        })
                    }
                },
            }
        }

        Ok(Document {
            method_name,
            params: extract_params(params),
            fault,
        })
    }

    /// Read a `<value>` body, having already consumed the `<value>` start
    /// tag; consumes through the matching `</value>`.
    ///
    /// Tie-breaks from the grammar: a `<value>` that closes without a type
    /// element is its raw text as a string (the empty string when there is
    /// no text at all); non-whitespace text next to a type element is an
    /// error.
    fn read_value_body(&mut self) -> Result<Value, ProtocolError> {
        let mut typed: Option<Value> = None;
        let mut type_tag: Option<String> = None;
        let mut raw: Option<String> = None;

        loop {
            match self.next()? {
                XmlToken::ProcInst => continue,
                XmlToken::Eof => return Err(ProtocolError::UnexpectedEof("inside <value>")),
                XmlToken::Start(tag) => {
                    if let Some(first) = type_tag.take() {
                        return Err(ProtocolError::MultipleTypes(first, tag));
                    }
                    if let Some(text) = raw.take() {
                        if !is_whitespace(&text) {
                            return Err(ProtocolError::StrayText {
                                text,
                                state: "inside <value>",
                            });
                        }
                    }
                    typed = Some(self.read_typed(&tag)?);
                    type_tag = Some(tag);
                }
                XmlToken::Text(text) => {
                    if typed.is_none() {
                        raw.get_or_insert_with(String::new).push_str(&text);
                    } else if !is_whitespace(&text) {
                        return Err(ProtocolError::StrayText {
                            text,
                            state: "inside <value>",
                        });
                    }
                }
                XmlToken::End(tag) if tag == "value" => {
                    return Ok(match typed {
                        Some(value) => value,
                        None => Value::String(raw.unwrap_or_default()),
                    });
                }
                XmlToken::End(tag) => {
                    return Err(ProtocolError::UnexpectedEnd {
                        tag,
                        state: "inside <value>",
                    })
                }
            }
        }
    }

    /// Decode one type element, `<tag>` already consumed; consumes through
    /// `</tag>`.
    fn read_typed(&mut self, tag: &str) -> Result<Value, ProtocolError> {
        match tag {
            "nil" => {
                let text = self.read_text_until_end(tag)?;
                if !is_whitespace(&text) {
                    return Err(ProtocolError::StrayText {
                        text,
                        state: "inside <nil>",
                    });
                }
                Ok(Value::Nil)
            }
            "boolean" => {
                let text = self.read_text_until_end(tag)?;
                match text.as_str() {
                    "1" => Ok(Value::Bool(true)),
                    "0" => Ok(Value::Bool(false)),
                    _ => Err(ProtocolError::BadBoolean(text)),
                }
            }
            "int" | "i4" => {
                let text = self.read_text_until_end(tag)?;
                text.parse::<i32>()
                    .map(Value::Int)
                    .map_err(|_| ProtocolError::BadInt(text))
            }
            "double" => {
                let text = self.read_text_until_end(tag)?;
                text.parse::<f64>()
                    .map(Value::Double)
                    .map_err(|_| ProtocolError::BadDouble(text))
            }
            "string" => Ok(Value::String(self.read_text_until_end(tag)?)),
            "dateTime.iso8601" => {
                let text = self.read_text_until_end(tag)?;
                NaiveDateTime::parse_from_str(&text, DATETIME_FORMAT)
                    .map(Value::DateTime)
                    .map_err(|_| ProtocolError::BadDateTime(text))
            }
            "base64" => {
                let text = self.read_text_until_end(tag)?;
                Ok(Value::Base64(BASE64.decode(text.trim())?))
            }
            "struct" => self.read_struct(),
            "array" => self.read_array(),
            _ => Err(ProtocolError::UnknownType(tag.to_owned())),
        }
    }

    /// `<struct>` body: `<member><name>…</name><value>…</value></member>*`.
    /// The name must precede the value; duplicate names are rejected; an
    /// empty struct is legal.
    fn read_struct(&mut self) -> Result<Value, ProtocolError> {
        let mut members = StructValue::new();
        loop {
            match self.next()? {
                XmlToken::Start(tag) if tag == "member" => {
                    self.expect_start("name", "inside <member>")?;
                    let name = self.read_text_until_end("name")?;
                    self.expect_start("value", "inside <member>")?;
                    let value = self.read_value_body()?;
                    self.expect_end("member", "inside <member>")?;
                    if members.contains(&name) {
                        return Err(ProtocolError::DuplicateMember(name));
                    }
                    members.insert(name, value);
                }
                XmlToken::End(tag) if tag == "struct" => return Ok(Value::Struct(members)),
                XmlToken::Text(text) if is_whitespace(&text) => continue,
                XmlToken::ProcInst => continue,
                XmlToken::Text(text) => {
                    return Err(ProtocolError::StrayText {
                        text,
                        state: "inside <struct>",
                    })
                }
                XmlToken::Start(tag) => {
                    return Err(ProtocolError::UnexpectedStart {
                        tag,
                        state: "inside <struct>",
                    })
                }
                XmlToken::End(tag) => {
                    return Err(ProtocolError::UnexpectedEnd {
                        tag,
                        state: "inside <struct>",
                    })
                }
                XmlToken::Eof => return Err(ProtocolError::UnexpectedEof("inside <struct>")),
            }
        }
    }

    /// `<array>` body: `<data><value>…</value>*</data>`, order preserved.
    fn read_array(&mut self) -> Result<Value, ProtocolError> {
        self.expect_start("data", "inside <array>")?;
        let mut items = Vec::new();
        loop {
            match self.next()? {
                XmlToken::Start(tag) if tag == "value" => items.push(self.read_value_body()?),
                XmlToken::End(tag) if tag == "data" => break,
                XmlToken::Text(text) if is_whitespace(&text) => continue,
                XmlToken::ProcInst => continue,
                XmlToken::Text(text) => {
                    return Err(ProtocolError::StrayText {
                        text,
                        state: "inside <data>",
                    })
                }
                XmlToken::Start(tag) => {
                    return Err(ProtocolError::UnexpectedStart {
                        tag,
                        state: "inside <data>",
                    })
                }
                XmlToken::End(tag) => {
                    return Err(ProtocolError::UnexpectedEnd {
                        tag,
                        state: "inside <data>",
                    })
                }
                XmlToken::Eof => return Err(ProtocolError::UnexpectedEof("inside <data>")),
            }
        }
        self.expect_end("array", "inside <array>")?;
        Ok(Value::Array(items))
    }

    /// Collect text up to `</tag>`, consuming the end tag. Used for every
    /// scalar type element, where the text is the payload verbatim.
    fn read_text_until_end(&mut self, tag: &str) -> Result<String, ProtocolError> {
        let mut out = String::new();
        loop {
            match self.next()? {
                XmlToken::Text(text) => out.push_str(&text),
                XmlToken::End(end) if end == tag => return Ok(out),
                XmlToken::ProcInst => continue,
                XmlToken::Start(inner) => {
                    return Err(ProtocolError::UnexpectedStart {
                        tag: inner,
                        state: "inside a scalar type element",
                    })
                }
                XmlToken::End(end) => {
                    return Err(ProtocolError::UnexpectedEnd {
                        tag: end,
                        state: "inside a scalar type element",
                    })
                }
                XmlToken::Eof => {
                    return Err(ProtocolError::UnexpectedEof("inside a scalar type element"))
                }
            }
        }
    }

    /// Skip ignorable tokens until `<tag>`.
    fn expect_start(&mut self, tag: &str, state: &'static str) -> Result<(), ProtocolError> {
        loop {
            match self.next()? {
                XmlToken::Start(t) if t == tag => return Ok(()),
                XmlToken::Text(text) if is_whitespace(&text) => continue,
                XmlToken::ProcInst => continue,
                XmlToken::Text(text) => return Err(ProtocolError::StrayText { text, state }),
                XmlToken::Start(t) => return Err(ProtocolError::UnexpectedStart { tag: t, state }),
                XmlToken::End(t) => return Err(ProtocolError::UnexpectedEnd { tag: t, state }),
                XmlToken::Eof => return Err(ProtocolError::UnexpectedEof(state)),
            }
        }
    }

    /// Skip ignorable tokens until `</tag>`.
    fn expect_end(&mut self, tag: &str, state: &'static str) -> Result<(), ProtocolError> {
        loop {
            match self.next()? {
                XmlToken::End(t) if t == tag => return Ok(()),
                XmlToken::Text(text) if is_whitespace(&text) => continue,
                XmlToken::ProcInst => continue,
                XmlToken::Text(text) => return Err(ProtocolError::StrayText { text, state }),
                XmlToken::Start(t) => return Err(ProtocolError::UnexpectedStart { tag: t, state }),
                XmlToken::End(t) => return Err(ProtocolError::UnexpectedEnd { tag: t, state }),
                XmlToken::Eof => return Err(ProtocolError::UnexpectedEof(state)),
            }
        }
    }
}

/// The outermost parameter sequence collapses: none is nil, one is the value
/// itself, several are an array.
fn extract_params(mut params: Vec<Value>) -> Value {
    match params.len() {
        0 => Value::Nil,
        1 => params.remove(0),
        _ => Value::Array(params),
    }
}
