//! Rendering values back into `<methodCall>` / `<methodResponse>`
//! documents. The exact inverse of the decoder: anything written here
//! decodes back to a structurally equal value.
//!
//! Strings are fully escaped (`& < > " '` become entity references); a NUL
//! byte cannot be carried in XML at all and is an encode error. Doubles are
//! written in Rust's shortest round-trip form, which the decoder parses back
//! to the identical bits.

use crate::protocol::{EncodeError, Fault};
use crate::value::Value;
use crate::xml::unmarshal::DATETIME_FORMAT;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use quick_xml::escape::escape;
use std::io::Write;

/// Write a `<methodCall>` document.
pub fn marshal_request<W: Write>(
    w: &mut W,
    method_name: &str,
    params: &[Value],
) -> Result<(), EncodeError> {
    marshal_envelope(w, Some(method_name), params)
}

/// Write a `<methodResponse>` document carrying one `<param>` per value.
pub fn marshal_response<W: Write>(w: &mut W, params: &[Value]) -> Result<(), EncodeError> {
    marshal_envelope(w, None, params)
}

/// Write a `<methodResponse>` carrying a `<fault>` in place of `<params>`.
pub fn marshal_fault<W: Write>(w: &mut W, fault: &Fault) -> Result<(), EncodeError> {
    w.write_all(b"<?xml version=\"1.0\"?>\n<methodResponse>\n  <fault>\n    <value>\n      ")?;
    write_value(w, &fault.to_value())?;
    w.write_all(b"\n    </value>\n  </fault>\n</methodResponse>\n")?;
    Ok(())
}

/// Request encoding as a string, for callers that frame the body themselves.
pub fn request_to_vec(method_name: &str, params: &[Value]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    marshal_request(&mut buf, method_name, params)?;
    Ok(buf)
}

pub fn response_to_vec(params: &[Value]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    marshal_response(&mut buf, params)?;
    Ok(buf)
}

pub fn fault_to_vec(fault: &Fault) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    marshal_fault(&mut buf, fault)?;
    Ok(buf)
}

fn marshal_envelope<W: Write>(
    w: &mut W,
    method_name: Option<&str>,
    params: &[Value],
) -> Result<(), EncodeError> {
    let doc_tag = if method_name.is_some() {
        "methodCall"
    } else {
        "methodResponse"
    };

    write!(w, "<?xml version=\"1.0\"?>\n<{doc_tag}>\n")?;
    if let Some(name) = method_name {
        write!(w, "  <methodName>{}</methodName>\n", escape_text(name)?)?;
    }
    w.write_all(b"  <params>\n")?;
    for param in params {
        w.write_all(b"    <param>\n      <value>")?;
        write_value(w, param)?;
        w.write_all(b"</value>\n    </param>\n")?;
    }
    write!(w, "  </params>\n</{doc_tag}>\n")?;
    Ok(())
}

/// Render one value, without the surrounding `<value>` tags.
fn write_value<W: Write>(w: &mut W, value: &Value) -> Result<(), EncodeError> {
    match value {
        Value::Nil => w.write_all(b"<nil/>")?,
        Value::Bool(b) => write!(w, "<boolean>{}</boolean>", u8::from(*b))?,
        Value::Int(i) => write!(w, "<int>{i}</int>")?,
        Value::Double(d) => write!(w, "<double>{d}</double>")?,
        Value::String(s) => write!(w, "<string>{}</string>", escape_text(s)?)?,
        Value::DateTime(dt) => write!(
            w,
            "<dateTime.iso8601>{}</dateTime.iso8601>",
            dt.format(DATETIME_FORMAT)
        )?,
        Value::Base64(bytes) => write!(w, "<base64>{}</base64>", BASE64.encode(bytes))?,
        Value::Array(items) => {
            w.write_all(b"<array><data>")?;
            for item in items {
                w.write_all(b"<value>")?;
                write_value(w, item)?;
                w.write_all(b"</value>")?;
            }
            w.write_all(b"</data></array>")?;
        }
        Value::Struct(members) => {
            w.write_all(b"<struct>")?;
            for (name, member) in members.iter() {
                check_member_name(name)?;
                write!(w, "<member><name>{name}</name><value>")?;
                write_value(w, member)?;
                w.write_all(b"</value></member>")?;
            }
            w.write_all(b"</struct>")?;
        }
    }
    Ok(())
}

fn escape_text(s: &str) -> Result<std::borrow::Cow<'_, str>, EncodeError> {
    if s.contains('\0') {
        return Err(EncodeError::NulByte);
    }
    Ok(escape(s))
}

/// Member names stay in the interop-safe subset; anything fancier trips up
/// enough peer implementations that we refuse to emit it.
fn check_member_name(name: &str) -> Result<(), EncodeError> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.');
    if ok {
        Ok(())
    } else {
        Err(EncodeError::BadMemberName(name.to_owned()))
    }
}
