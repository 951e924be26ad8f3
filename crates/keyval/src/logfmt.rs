//! The `key=value` encoder.
//!
//! Key and value are rendered independently. Keys are sanitized so the
//! output always re-parses as a single key token; values are quoted and
//! escaped whenever their content could be mistaken for structure. A value
//! whose textual representation fails or panics is replaced by a sentinel
//! literal so one bad value can never abort a render loop.

use std::fmt::Write as _;
use std::panic::{self, AssertUnwindSafe};

use bstr::decode_utf8;

use crate::flatten::flatten;
use crate::value::Value;

/// Substituted when a textual representation returns an error.
const ERROR_SENTINEL: &str = "ERROR";
/// Substituted when a textual representation panics.
const PANIC_SENTINEL: &str = "PANIC";

/// Append `key=value` to `buf`.
pub fn write_pair(buf: &mut Vec<u8>, key: &Value, value: &Value) {
    write_key(buf, key);
    buf.push(b'=');
    write_value(buf, value);
}

/// Append `key=value` where both sides are raw bytes, as produced by the
/// message parser (values already unquoted).
pub fn write_bytes_pair(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    sanitize_key(buf, key);
    buf.push(b'=');
    quote_if_needed(buf, value);
}

/// Append an already-flattened pair list to `buf`, space separated.
pub(crate) fn write_pairs(buf: &mut Vec<u8>, flat: &[Value]) {
    for chunk in flat.chunks_exact(2) {
        if !buf.is_empty() {
            buf.push(b' ');
        }
        write_pair(buf, &chunk[0], &chunk[1]);
    }
}

fn write_key(buf: &mut Vec<u8>, key: &Value) {
    match key {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(v) => sanitize_key(buf, v.to_string().as_bytes()),
        Value::Int(v) => sanitize_key(buf, v.to_string().as_bytes()),
        Value::Uint(v) => sanitize_key(buf, v.to_string().as_bytes()),
        Value::Float(v) => sanitize_key(buf, v.to_string().as_bytes()),
        Value::Str(v) => sanitize_key(buf, v.as_bytes()),
        Value::Bytes(v) => sanitize_key(buf, v),
        Value::Error(v) => sanitize_key(buf, v.to_string().as_bytes()),
        Value::Display(v) => match guarded_render(v.as_ref()) {
            Ok(text) => sanitize_key(buf, text.as_bytes()),
            Err(sentinel) => buf.extend_from_slice(sentinel.as_bytes()),
        },
        composite => sanitize_key(buf, &composite_text(composite)),
    }
}

fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(v) => buf.extend_from_slice(v.to_string().as_bytes()),
        Value::Int(v) => buf.extend_from_slice(v.to_string().as_bytes()),
        Value::Uint(v) => buf.extend_from_slice(v.to_string().as_bytes()),
        Value::Float(v) => buf.extend_from_slice(v.to_string().as_bytes()),
        Value::Str(v) => quote_if_needed(buf, v.as_bytes()),
        Value::Bytes(v) => quote_if_needed(buf, v),
        Value::Error(v) => quote_if_needed(buf, v.to_string().as_bytes()),
        Value::Display(v) => match guarded_render(v.as_ref()) {
            Ok(text) => quote_if_needed(buf, text.as_bytes()),
            Err(sentinel) => buf.extend_from_slice(sentinel.as_bytes()),
        },
        composite => quote_if_needed(buf, &composite_text(composite)),
    }
}

/// Render a foreign `Display` implementation without trusting it: a
/// formatting error yields `ERROR`, a panic is caught and yields `PANIC`.
fn guarded_render(value: &(dyn std::fmt::Display + Send + Sync)) -> Result<String, &'static str> {
    let rendered = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut text = String::new();
        match write!(text, "{value}") {
            Ok(()) => Ok(text),
            Err(_) => Err(ERROR_SENTINEL),
        }
    }));
    match rendered {
        Ok(result) => result,
        Err(_) => Err(PANIC_SENTINEL),
    }
}

/// A composite in key or value position renders as its pair list.
fn composite_text(value: &Value) -> Vec<u8> {
    let mut buf = Vec::new();
    write_pairs(&mut buf, &flatten(vec![value.clone()]));
    buf
}

/// Keys are never quoted; offending characters become `_` and an empty key
/// becomes the literal `EMPTY`.
fn sanitize_key(buf: &mut Vec<u8>, key: &[u8]) {
    if key.is_empty() {
        buf.extend_from_slice(b"EMPTY");
        return;
    }
    let mut rest = key;
    while !rest.is_empty() {
        let (ch, size) = decode_utf8(rest);
        match ch {
            Some(c) if c.is_whitespace() || c.is_control() || c == '=' => buf.push(b'_'),
            Some(c) => {
                let mut utf8 = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
            // invalid UTF-8 passes through unmodified
            None => buf.extend_from_slice(&rest[..size]),
        }
        rest = &rest[size..];
    }
}

/// Quote the value when it contains whitespace, `=`, `"`, `:`, control
/// characters, or is empty; emit it bare otherwise.
fn quote_if_needed(buf: &mut Vec<u8>, value: &[u8]) {
    if needs_quoting(value) {
        quote(buf, value);
    } else {
        buf.extend_from_slice(value);
    }
}

fn needs_quoting(value: &[u8]) -> bool {
    if value.is_empty() {
        return true;
    }
    let mut rest = value;
    while !rest.is_empty() {
        let (ch, size) = decode_utf8(rest);
        if let Some(c) = ch {
            if c.is_whitespace() || c.is_control() || matches!(c, '=' | '"' | ':') {
                return true;
            }
        }
        rest = &rest[size..];
    }
    false
}

fn quote(buf: &mut Vec<u8>, value: &[u8]) {
    buf.push(b'"');
    for &b in value {
        match b {
            b'"' => buf.extend_from_slice(b"\\\""),
            b'\\' => buf.extend_from_slice(b"\\\\"),
            b'\n' => buf.extend_from_slice(b"\\n"),
            b'\r' => buf.extend_from_slice(b"\\r"),
            b'\t' => buf.extend_from_slice(b"\\t"),
            0x00..=0x1f | 0x7f => {
                const HEX: &[u8; 16] = b"0123456789abcdef";
                buf.extend_from_slice(&[b'\\', b'x', HEX[(b >> 4) as usize], HEX[(b & 0xf) as usize]]);
            }
            _ => buf.push(b),
        }
    }
    buf.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    struct Failing;

    impl fmt::Display for Failing {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            Err(fmt::Error)
        }
    }

    struct Panicking;

    impl fmt::Display for Panicking {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("boom")
        }
    }

    fn render(key: Value, value: Value) -> String {
        let mut buf = Vec::new();
        write_pair(&mut buf, &key, &value);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn encoder_table() {
        let cases: Vec<(Value, Value, &str)> = vec![
            ("key".into(), "value".into(), "key=value"),
            ("key=".into(), "some value".into(), r#"key_="some value""#),
            ("the key".into(), "the value".into(), r#"the_key="the value""#),
            (
                "the\tkey\x03".into(),
                "the\tvalue\x02".into(),
                r#"the_key_="the\tvalue\x02""#,
            ),
            (17.into(), 25.into(), "17=25"),
            ("".into(), "".into(), r#"EMPTY="""#),
            (Value::Null, Value::Null, "null=null"),
            (
                Value::error("key".to_string()),
                Value::error("value".to_string()),
                "key=value",
            ),
            (Value::display("key"), Value::display("value"), "key=value"),
            ("key".into(), "value:".into(), r#"key="value:""#),
            ("key".into(), true.into(), "key=true"),
            ("key".into(), 3.5.into(), "key=3.5"),
        ];
        for (key, value, want) in cases {
            assert_eq!(render(key, value), want);
        }
    }

    #[test]
    fn failing_representation_becomes_error_literal() {
        assert_eq!(
            render(Value::display(Failing), Value::display(Failing)),
            "ERROR=ERROR"
        );
        assert_eq!(render("key".into(), Value::display(Failing)), "key=ERROR");
        assert_eq!(render(Value::display(Failing), "value".into()), "ERROR=value");
    }

    #[test]
    fn panicking_representation_becomes_panic_literal() {
        assert_eq!(
            render(Value::display(Panicking), Value::display(Panicking)),
            "PANIC=PANIC"
        );
        assert_eq!(render("key".into(), Value::display(Panicking)), "key=PANIC");
        assert_eq!(render(Value::display(Panicking), "value".into()), "PANIC=value");
    }

    #[test]
    fn tab_in_value_renders_escape() {
        assert_eq!(render("k".into(), "a\tb".into()), r#"k="a\tb""#);
    }

    #[test]
    fn empty_value_distinguished_from_null() {
        assert_eq!(render("k".into(), "".into()), r#"k="""#);
        assert_eq!(render("k".into(), Value::Null), "k=null");
    }
}
