//! The fluent pair-list surface.
//!
//! A [`List`] is an argument list in flight: call sites append loosely
//! structured items and the list normalizes on render, not on append, so
//! building one is cheap and infallible.

use std::fmt;
use std::str::FromStr;

use crate::flatten::flatten;
use crate::logfmt;
use crate::message::Message;
use crate::value::Value;

/// An ordered list of values, flattened to alternating key/value form when
/// rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct List(Vec<Value>);

impl List {
    pub fn new() -> Self {
        List(Vec::new())
    }

    /// Append items; normalization happens later, at render time.
    pub fn with(mut self, items: impl IntoIterator<Item = Value>) -> Self {
        self.0.extend(items);
        self
    }

    /// Append one explicit key/value pair.
    pub fn with_pair(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push(Value::Pair(key.into(), Box::new(value.into())));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Value> {
        self.0
    }

    /// Normalized key/value form of this list.
    pub fn keyvals(&self) -> Vec<Value> {
        flatten(self.0.clone())
    }

    /// Normalize and drop repeated pairs, keeping the first occurrence.
    /// Pairs compare by their rendered `key=value` form, so two pairs with
    /// the same key but different values both survive.
    pub fn dedup(&self) -> Vec<Value> {
        dedup_pairs(self.keyvals())
    }
}

pub(crate) fn dedup_pairs(flat: Vec<Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::with_capacity(flat.len());
    let mut seen: Vec<Vec<u8>> = Vec::new();
    let mut iter = flat.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let mut rendered = Vec::new();
        logfmt::write_pair(&mut rendered, &key, &value);
        if !seen.contains(&rendered) {
            seen.push(rendered);
            out.push(key);
            out.push(value);
        }
    }
    out
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        logfmt::write_pairs(&mut buf, &self.keyvals());
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

impl FromStr for List {
    type Err = std::convert::Infallible;

    /// Parse `key=value` text back into a list. Leading free text becomes a
    /// `("msg", text)` pair.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let msg = Message::parse(s.as_bytes());
        let mut items = Vec::with_capacity(msg.pair_count() * 2 + 2);
        if !msg.text().is_empty() {
            items.push(Value::Str("msg".to_string()));
            items.push(Value::Str(String::from_utf8_lossy(msg.text()).into_owned()));
        }
        for (key, value) in msg.pairs() {
            items.push(Value::Str(String::from_utf8_lossy(key).into_owned()));
            items.push(Value::Str(String::from_utf8_lossy(value).into_owned()));
        }
        Ok(List(items))
    }
}

impl From<Vec<Value>> for List {
    fn from(values: Vec<Value>) -> Self {
        List(values)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::Seq(list.0)
    }
}

impl FromIterator<Value> for List {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        List(iter.into_iter().collect())
    }
}

impl IntoIterator for List {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{pair, Map};

    #[test]
    fn display_renders_pairs() {
        let list = List::new().with_pair("key1", "value1").with_pair("key2", "value2");
        assert_eq!(list.to_string(), "key1=value1 key2=value2");

        assert_eq!(pair("key", "value").to_string(), "key=value");
        let mut map = Map::new();
        map.insert("key".into(), "value".into());
        assert_eq!(Value::Map(map).to_string(), "key=value");
    }

    #[test]
    fn display_flattens_composites() {
        let mut m = Map::new();
        m.insert("key".into(), "value".into());
        let list = List::from(vec![Value::Map(m)]);
        assert_eq!(list.to_string(), "key=value");
    }

    #[test]
    fn marshal_unmarshal() {
        let list = List::new().with_pair("a", 1).with_pair("b", "value 2");
        let text = list.to_string();
        assert_eq!(text, r#"a=1 b="value 2""#);

        let back: List = text.parse().unwrap();
        assert_eq!(
            back,
            List::from(vec![
                Value::Str("a".into()),
                Value::Str("1".into()),
                Value::Str("b".into()),
                Value::Str("value 2".into()),
            ])
        );
    }

    #[test]
    fn unmarshal_leading_text_becomes_msg() {
        let back: List = r#"leading message a=1 b="value 2""#.parse().unwrap();
        assert_eq!(
            back,
            List::from(vec![
                Value::Str("msg".into()),
                Value::Str("leading message".into()),
                Value::Str("a".into()),
                Value::Str("1".into()),
                Value::Str("b".into()),
                Value::Str("value 2".into()),
            ])
        );
    }

    #[test]
    fn dedup_drops_repeated_pairs_only() {
        let list = List::new()
            .with_pair("a", 2)
            .with_pair("a", 1)
            .with_pair("b", 2)
            .with_pair("a", 1);
        let deduped = dedup_pairs(list.keyvals());
        // a=2 and a=1 both survive; the second a=1 does not
        assert_eq!(
            deduped,
            vec![
                Value::Str("a".into()),
                Value::Int(2),
                Value::Str("a".into()),
                Value::Int(1),
                Value::Str("b".into()),
                Value::Int(2),
            ]
        );
    }
}
