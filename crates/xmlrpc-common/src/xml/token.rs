//! Streaming token view of an XML-RPC document.
//!
//! The decoder never needs general XML: attributes, namespaces, comments and
//! doctypes play no part in the wire format. This module narrows quick-xml's
//! event stream down to the four token shapes the grammar is written
//! against, discarding attributes and resolving entity references on the
//! way through. Empty elements (`<nil/>`, `<params/>`) are expanded into a
//! start/end pair so the state machine only ever sees balanced tags.

use crate::protocol::ProtocolError;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;

/// One token of an XML-RPC document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlToken {
    /// `<tag …>`; attributes are discarded, the name is the local name.
    Start(String),
    /// `</tag>`
    End(String),
    /// Character data with entity references resolved. Whitespace is kept
    /// verbatim; whether it is significant depends on the grammar position.
    Text(String),
    /// XML declaration or processing instruction; always ignorable.
    ProcInst,
    /// End of input.
    Eof,
}

/// Lazy token stream over a byte reader.
pub struct TokenStream<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> TokenStream<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().expand_empty_elements = true;
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Pull the next token, blocking on the underlying reader as needed.
    pub fn next_token(&mut self) -> Result<XmlToken, ProtocolError> {
        self.buf.clear();
        match self.reader.read_event_into(&mut self.buf)? {
            Event::Start(e) => Ok(XmlToken::Start(tag_name(e.local_name().as_ref())?)),
            Event::End(e) => Ok(XmlToken::End(tag_name(e.local_name().as_ref())?)),
            // expand_empty_elements is set, so Empty never reaches us
            Event::Empty(e) => Ok(XmlToken::Start(tag_name(e.local_name().as_ref())?)),
            Event::Text(t) => Ok(XmlToken::Text(t.unescape()?.into_owned())),
            Event::CData(c) => {
                let bytes = c.into_inner().into_owned();
                String::from_utf8(bytes)
                    .map(XmlToken::Text)
                    .map_err(|_| ProtocolError::Unsupported("non-UTF-8 CDATA section"))
            }
            Event::Decl(_) | Event::PI(_) => Ok(XmlToken::ProcInst),
            Event::Comment(_) => Err(ProtocolError::Unsupported("comment")),
            Event::DocType(_) => Err(ProtocolError::Unsupported("document type declaration")),
            Event::Eof => Ok(XmlToken::Eof),
        }
    }
}

fn tag_name(raw: &[u8]) -> Result<String, ProtocolError> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::BadTagName)
}

/// True when `text` is only the whitespace the grammar ignores between
/// structural tags: space, tab, carriage return, newline.
pub fn is_whitespace(text: &str) -> bool {
    text.bytes().all(|c| matches!(c, b' ' | b'\t' | b'\r' | b'\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(doc: &str) -> Vec<XmlToken> {
        let mut stream = TokenStream::new(doc.as_bytes());
        let mut tokens = Vec::new();
        loop {
            let tok = stream.next_token().unwrap();
            let done = tok == XmlToken::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn test_basic_tokens() {
        let tokens = collect("<?xml version=\"1.0\"?><a>hi</a>");
        assert_eq!(
            tokens,
            vec![
                XmlToken::ProcInst,
                XmlToken::Start("a".into()),
                XmlToken::Text("hi".into()),
                XmlToken::End("a".into()),
                XmlToken::Eof,
            ]
        );
    }

    #[test]
    fn test_empty_element_expands() {
        let tokens = collect("<params/>");
        assert_eq!(
            tokens,
            vec![
                XmlToken::Start("params".into()),
                XmlToken::End("params".into()),
                XmlToken::Eof,
            ]
        );
    }

    #[test]
    fn test_attributes_are_discarded() {
        let tokens = collect(r#"<value kind="int">5</value>"#);
        assert_eq!(tokens[0], XmlToken::Start("value".into()));
    }

    #[test]
    fn test_entities_are_resolved() {
        let tokens = collect("<s>a &amp; b &lt;c&gt;</s>");
        assert_eq!(tokens[1], XmlToken::Text("a & b <c>".into()));
    }

    #[test]
    fn test_is_whitespace() {
        assert!(is_whitespace(" \t\r\n"));
        assert!(is_whitespace(""));
        assert!(!is_whitespace(" x "));
    }
}
