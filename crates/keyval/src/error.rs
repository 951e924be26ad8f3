//! Error values that carry key/value pairs.
//!
//! The message of a wrapped chain reads `outer: inner: innermost`, followed
//! by the merged pair lists (outermost first, duplicate pairs dropped).

use std::fmt;

use crate::list::{dedup_pairs, List};
use crate::logfmt;
use crate::value::{BoxError, Value};

/// An error with message text, attached key/value pairs, and an optional
/// wrapped source.
#[derive(Debug, Default)]
pub struct Error {
    text: String,
    list: List,
    source: Option<BoxError>,
}

impl Error {
    /// An error that formats as the given text.
    pub fn new(text: impl Into<String>) -> Self {
        Error {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Wrap another error, annotating it with message text.
    pub fn wrap(source: impl Into<BoxError>, text: impl Into<String>) -> Self {
        Error {
            text: text.into(),
            list: List::new(),
            source: Some(source.into()),
        }
    }

    /// Attach additional values; normalized when the error is displayed.
    pub fn with(mut self, items: impl IntoIterator<Item = Value>) -> Self {
        self.list = self.list.with(items);
        self
    }

    /// Attach one explicit key/value pair.
    pub fn with_pair(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.list = self.list.with_pair(key, value);
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn list(&self) -> &List {
        &self.list
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut texts: Vec<String> = Vec::new();
        let mut pairs: Vec<Value> = Vec::new();

        if !self.text.is_empty() {
            texts.push(self.text.clone());
        }
        pairs.extend(self.list.keyvals());

        // Walk wrapped errors: ours contribute text and pairs, foreign ones
        // contribute their message and end the walk.
        let mut source = self.source.as_deref();
        while let Some(err) = source {
            match err.downcast_ref::<Error>() {
                Some(inner) => {
                    if !inner.text.is_empty() {
                        texts.push(inner.text.clone());
                    }
                    pairs.extend(inner.list.keyvals());
                    source = inner.source.as_deref();
                }
                None => {
                    let text = err.to_string();
                    if !text.is_empty() {
                        texts.push(text);
                    }
                    source = None;
                }
            }
        }

        let mut buf = texts.join(": ").trim().to_string().into_bytes();
        let mut out = Vec::new();
        logfmt::write_pairs(&mut out, &dedup_pairs(pairs));
        if !out.is_empty() {
            if !buf.is_empty() {
                buf.push(b' ');
            }
            buf.extend_from_slice(&out);
        }
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::Error(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn plain_text() {
        assert_eq!(Error::new("message text").to_string(), "message text");
    }

    #[test]
    fn wrapping_joins_with_colon() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "first message");
        let err = Error::wrap(cause, "second message");
        assert_eq!(err.to_string(), "second message: first message");
        assert!(err.source().is_some());
    }

    #[test]
    fn pairs_follow_the_text() {
        let err = Error::new("message text").with_pair("a", 1).with_pair("b", 2);
        assert_eq!(err.to_string(), "message text a=1 b=2");
    }

    #[test]
    fn nested_pairs_merge_outer_first() {
        let inner = Error::new("first message")
            .with_pair("a", 1)
            .with_pair("b", 2)
            .with_pair("c", 3);
        let outer = Error::wrap(inner, "second message")
            .with_pair("a", 1)
            .with_pair("b", 2)
            .with_pair("d", 4);
        assert_eq!(
            outer.to_string(),
            "second message: first message a=1 b=2 d=4 c=3"
        );
    }

    #[test]
    fn same_key_different_value_both_survive() {
        let first = Error::new("first")
            .with_pair("a", 1)
            .with_pair("b", 2)
            .with_pair("c", "3");
        let second = Error::wrap(first, "second").with_pair("a", 1).with_pair("b", "2");
        let third = Error::wrap(second, "third").with_pair("a", 2);
        assert_eq!(third.to_string(), "third: second: first a=2 a=1 b=2 c=3");
    }

    #[test]
    fn converts_to_an_error_value() {
        let value: Value = Error::new("boom").into();
        assert!(matches!(value, Value::Error(_)));
    }
}
