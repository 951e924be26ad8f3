//! Two-pass message parser.
//!
//! A log line is free text optionally followed by `key=value` pairs. Only
//! the *last* contiguous run of key-led pairs is structured data; earlier
//! apparent pairs interrupted by free text belong to the text. The first
//! pass over the token stream locates that run and counts its pairs, the
//! second pass materializes text and pairs into pooled storage sized from
//! the count.

use std::fmt;

use crate::lexer::{Lexer, TokenKind};
use crate::logfmt;
use crate::pool::{self, PoolBuf, Span};

/// Substituted for a quoted lexeme with an invalid escape sequence.
const BAD_QUOTE: &[u8] = b"???";

/// Parsed log line: message text plus ordered key/value pairs, backed by a
/// pooled buffer.
///
/// The buffer is zero-filled and returned to the pool on [`release`]; `Drop`
/// releases as a safety net, so no exit path can leak or retain content.
/// A released message exposes empty fields.
///
/// [`release`]: Message::release
pub struct Message {
    buf: Option<PoolBuf>,
    text: Span,
}

impl Message {
    /// Parse a raw line. Total over its input: malformed quoting and stray
    /// tokens degrade to text, never to an error.
    pub fn parse(input: &[u8]) -> Message {
        let input = trim_space(input);
        let mut lex = Lexer::new(input);

        // Pass 1: find where the final unbroken run of pairs starts, and
        // how many pairs it holds.
        let mut run_start: Option<usize> = None;
        let mut pair_count = 0usize;
        loop {
            while !matches!(
                lex.kind(),
                TokenKind::Key | TokenKind::QuotedKey | TokenKind::EndOfInput
            ) {
                run_start = None;
                lex.next();
            }
            if lex.kind() == TokenKind::EndOfInput {
                break;
            }
            if run_start.is_none() {
                run_start = Some(lex.token_start());
                pair_count = 0;
            }
            while matches!(lex.kind(), TokenKind::Key | TokenKind::QuotedKey) {
                pair_count += 1;
                lex.next(); // onto the value
                lex.next(); // past the value
                lex.skip_ws();
            }
        }

        // Pass 2: materialize.
        let mut buf = pool::acquire();
        let text;
        match run_start {
            None => {
                text = append(&mut buf, trim_space(input));
            }
            Some(start) => {
                text = append(&mut buf, trim_space(&input[..start]));
                buf.spans.reserve(pair_count * 2);
                lex.rewind();
                while lex.kind() != TokenKind::EndOfInput && lex.token_start() < start {
                    lex.next();
                }
                while matches!(lex.kind(), TokenKind::Key | TokenKind::QuotedKey) {
                    let key = match lex.kind() {
                        TokenKind::QuotedKey => append_unquoted(&mut buf, lex.lexeme()),
                        _ => append(&mut buf, lex.lexeme()),
                    };
                    lex.next();
                    let value = match lex.kind() {
                        TokenKind::QuotedValue => append_unquoted(&mut buf, lex.lexeme()),
                        TokenKind::WhiteSpace | TokenKind::EndOfInput => Span::default(),
                        _ => append(&mut buf, lex.lexeme()),
                    };
                    buf.spans.push(key);
                    buf.spans.push(value);
                    lex.next();
                    lex.skip_ws();
                }
            }
        }

        Message {
            buf: Some(buf),
            text,
        }
    }

    /// Message text with surrounding whitespace trimmed. May contain invalid
    /// UTF-8, which the parser passes through unmodified.
    pub fn text(&self) -> &[u8] {
        match &self.buf {
            Some(buf) => self.text.slice(&buf.bytes),
            None => &[],
        }
    }

    /// Number of key/value pairs.
    pub fn pair_count(&self) -> usize {
        self.buf.as_ref().map_or(0, |b| b.spans.len() / 2)
    }

    /// Iterate the pairs in input order.
    pub fn pairs(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        let (bytes, spans) = match &self.buf {
            Some(buf) => (buf.bytes.as_slice(), buf.spans.as_slice()),
            None => (&[][..], &[][..]),
        };
        spans
            .chunks_exact(2)
            .map(move |pair| (pair[0].slice(bytes), pair[1].slice(bytes)))
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty() && self.pair_count() == 0
    }

    /// Zero-fill the backing buffer and return it to the pool. The message
    /// remains usable and exposes empty fields. Called from `Drop` when not
    /// invoked explicitly.
    pub fn release(&mut self) {
        if let Some(buf) = self.buf.take() {
            pool::release(buf);
        }
        self.text = Span::default();
    }
}

impl Drop for Message {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Display for Message {
    /// `text key1=value1 key2=value2 …`, re-encoded so the output parses
    /// back to an equivalent message.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = Vec::with_capacity(self.text().len() + self.pair_count() * 16);
        out.extend_from_slice(self.text());
        for (key, value) in self.pairs() {
            if !out.is_empty() {
                out.push(b' ');
            }
            logfmt::write_bytes_pair(&mut out, key, value);
        }
        f.write_str(&String::from_utf8_lossy(&out))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({self})")
    }
}

fn trim_space(mut input: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = input {
        if first.is_ascii_whitespace() {
            input = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = input {
        if last.is_ascii_whitespace() {
            input = rest;
        } else {
            break;
        }
    }
    input
}

fn append(buf: &mut PoolBuf, bytes: &[u8]) -> Span {
    let start = buf.bytes.len();
    buf.bytes.extend_from_slice(bytes);
    Span {
        start,
        end: buf.bytes.len(),
    }
}

/// Decode a quoted lexeme (quotes included) into the buffer. An invalid
/// escape sequence replaces the whole lexeme with the `???` sentinel; a
/// missing closing quote is tolerated.
fn append_unquoted(buf: &mut PoolBuf, lexeme: &[u8]) -> Span {
    let start = buf.bytes.len();
    if unquote_into(&mut buf.bytes, lexeme).is_err() {
        buf.bytes.truncate(start);
        buf.bytes.extend_from_slice(BAD_QUOTE);
    }
    Span {
        start,
        end: buf.bytes.len(),
    }
}

struct BadEscape;

fn unquote_into(out: &mut Vec<u8>, lexeme: &[u8]) -> Result<(), BadEscape> {
    let mut rest = match lexeme {
        [b'"', rest @ ..] => rest,
        other => other,
    };
    loop {
        match rest {
            [] | [b'"'] => return Ok(()),
            [b'\\'] => return Err(BadEscape),
            [b'\\', esc, tail @ ..] => {
                rest = tail;
                match esc {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'\\' => out.push(b'\\'),
                    b'"' => out.push(b'"'),
                    b'\'' => out.push(b'\''),
                    b'x' => {
                        let byte = take_hex(&mut rest, 2)?;
                        out.push(byte as u8);
                    }
                    b'u' => {
                        let code = take_hex(&mut rest, 4)?;
                        let ch = char::from_u32(code).ok_or(BadEscape)?;
                        let mut utf8 = [0u8; 4];
                        out.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
                    }
                    _ => return Err(BadEscape),
                }
            }
            [b, tail @ ..] => {
                out.push(*b);
                rest = tail;
            }
        }
    }
}

fn take_hex(rest: &mut &[u8], digits: usize) -> Result<u32, BadEscape> {
    if rest.len() < digits {
        return Err(BadEscape);
    }
    let mut value = 0u32;
    for &b in &rest[..digits] {
        let digit = match b {
            b'0'..=b'9' => u32::from(b - b'0'),
            b'a'..=b'f' => u32::from(b - b'a') + 10,
            b'A'..=b'F' => u32::from(b - b'A') + 10,
            _ => return Err(BadEscape),
        };
        value = value * 16 + digit;
    }
    *rest = &rest[digits..];
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs_of(msg: &Message) -> Vec<(Vec<u8>, Vec<u8>)> {
        msg.pairs()
            .map(|(k, v)| (k.to_vec(), v.to_vec()))
            .collect()
    }

    fn check(input: &str, want_text: &str, want_pairs: &[(&str, &str)]) {
        let mut msg = Message::parse(input.as_bytes());
        assert_eq!(
            msg.text(),
            want_text.as_bytes(),
            "text mismatch for {input:?}"
        );
        let want: Vec<(Vec<u8>, Vec<u8>)> = want_pairs
            .iter()
            .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
            .collect();
        assert_eq!(pairs_of(&msg), want, "pairs mismatch for {input:?}");
        msg.release();
    }

    #[test]
    fn parse_table() {
        check(
            "error: this is the message key1=value1 key2=value2: file not found\n",
            "error: this is the message key1=value1 key2=value2: file not found",
            &[],
        );
        check("one", "one", &[]);
        check("    one\t\n   ", "one", &[]);
        check(
            r#"select "id","name","location" from "table" where "id" = $1 [25]"#,
            r#"select "id","name","location" from "table" where "id" = $1 [25]"#,
            &[],
        );
        check(
            r#"this is the message key1=1 key2="2""#,
            "this is the message",
            &[("key1", "1"), ("key2", "2")],
        );
        check(
            r#"this is the message "key1"="1" "key2"="2""#,
            "this is the message",
            &[("key1", "1"), ("key2", "2")],
        );
        check(
            r#"this is the message "key1"= "1" "key2"="2""#,
            r#"this is the message "key1"= "1""#,
            &[("key2", "2")],
        );
        check(
            "this is the message key1=",
            "this is the message key1=",
            &[],
        );
        check("message key1==", "message key1==", &[]);
        check(
            r#"message a8r5t= key1== key2="" key3=x"#,
            "message a8r5t= key1==",
            &[("key2", ""), ("key3", "x")],
        );
        check(
            "message    key1=1    key2=2   ",
            "message",
            &[("key1", "1"), ("key2", "2")],
        );
        // missing close quote
        check(r#"message key1="1"#, "message", &[("key1", "1")]);
        // escapes
        check(
            r#"message key1="a\r\n" key2="\x41\u0042""#,
            "message",
            &[("key1", "a\r\n"), ("key2", "AB")],
        );
        // nested message: only the final run is structured
        check(
            "message 1 key1=1 message 2 key2=2",
            "message 1 key1=1 message 2",
            &[("key2", "2")],
        );
        check(
            r#"message 1 key1="1": message 2 key2=2"#,
            r#"message 1 key1="1": message 2"#,
            &[("key2", "2")],
        );
        check(
            "message 1 key1=1: message 2 key2=2",
            "message 1 key1=1: message 2",
            &[("key2", "2")],
        );
        check("", "", &[]);
        check(
            "text a=1 b=2 c=3 d=4 e=5 f=6 g=7 h=8 i=9 j=10",
            "text",
            &[
                ("a", "1"),
                ("b", "2"),
                ("c", "3"),
                ("d", "4"),
                ("e", "5"),
                ("f", "6"),
                ("g", "7"),
                ("h", "8"),
                ("i", "9"),
                ("j", "10"),
            ],
        );
    }

    #[test]
    fn invalid_utf8_passes_through() {
        let msg = Message::parse(b"invalid message \xfe a=2");
        assert_eq!(msg.text(), b"invalid message \xfe");
        assert_eq!(pairs_of(&msg), vec![(b"a".to_vec(), b"2".to_vec())]);
    }

    #[test]
    fn bad_escape_yields_sentinel() {
        let msg = Message::parse(br#"m key="a\qb""#);
        assert_eq!(pairs_of(&msg), vec![(b"key".to_vec(), b"???".to_vec())]);
    }

    #[test]
    fn unicode_escape_decodes() {
        let msg = Message::parse(br#"m key="unicode \u20Ac""#);
        assert_eq!(
            pairs_of(&msg),
            vec![(b"key".to_vec(), "unicode \u{20ac}".as_bytes().to_vec())]
        );
    }

    #[test]
    fn release_leaves_empty_fields() {
        let mut msg = Message::parse(b"text a=1");
        assert_eq!(msg.text(), b"text");
        assert_eq!(msg.pair_count(), 1);
        msg.release();
        assert_eq!(msg.text(), b"");
        assert_eq!(msg.pair_count(), 0);
        assert!(msg.pairs().next().is_none());
        assert!(msg.is_empty());
        // releasing twice is fine
        msg.release();
    }

    #[test]
    fn round_trip() {
        let inputs: Vec<&str> = vec![
            "this is a message key1=value1 key2=value2",
            r#"quoted key="a value" other=1"#,
            "message 1 key1=value1 message 2   key2=value2 message 3   key3=value3",
        ];
        for input in inputs {
            let first = Message::parse(input.as_bytes());
            let rendered = first.to_string();
            let second = Message::parse(rendered.as_bytes());
            assert_eq!(first.text(), second.text(), "text for {input:?}");
            assert_eq!(
                pairs_of(&first),
                pairs_of(&second),
                "pairs for {input:?}"
            );
        }
    }

    #[test]
    fn display_matches_original_spacing() {
        let msg = Message::parse(
            b"message 1 key1=value1 message 2   key2=value2 message 3   key3=value3",
        );
        assert_eq!(
            msg.to_string(),
            "message 1 key1=value1 message 2   key2=value2 message 3 key3=value3"
        );
    }
}
