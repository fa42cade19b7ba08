//! The multi-valued string map exchanged by marshalers and unmarshalers.

use std::borrow::Cow;
use std::fmt;

use indexmap::IndexMap;
use indexmap::map::{IntoIter, Iter};
use percent_encoding::AsciiSet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An ordered map from keys to lists of strings, the in-memory form of a
/// query string.
///
/// Keys keep their insertion order. Inserting an existing key replaces its
/// values in place.
///
/// ```
/// use qs_marshal::Values;
///
/// let mut values = Values::new();
/// values.append("tag", "a");
/// values.append("tag", "b c");
/// values.set("page", "2");
/// assert_eq!(values.encode(), "tag=a&tag=b+c&page=2");
///
/// let parsed = Values::parse("tag=a&tag=b+c&page=2").unwrap();
/// assert_eq!(parsed, values);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(IndexMap<String, Vec<String>>);

impl Values {
    pub fn new() -> Self {
        Values(IndexMap::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Values(IndexMap::with_capacity(capacity))
    }

    /// Returns all values of `key`.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// Returns the first value of `key`.
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Replaces all values of `key`, returning the previous ones.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) -> Option<Vec<String>> {
        self.0.insert(key.into(), values)
    }

    /// Replaces all values of `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), vec![value.into()]);
    }

    /// Adds a value to `key`, keeping the existing ones.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> Iter<'_, String, Vec<String>> {
        self.0.iter()
    }

    /// Copies every entry of `other` into `self`, replacing the values of
    /// keys present in both.
    pub fn merge(&mut self, other: Values) {
        self.0.extend(other.0);
    }

    pub fn into_inner(self) -> IndexMap<String, Vec<String>> {
        self.0
    }

    /// Parses a query string, e.g. `a=1&a=2&b=x+y`.
    ///
    /// Pairs are separated by `&`, keys and values by the first `=`. Both are
    /// percent-decoded and `+` is read as a space. A pair without `=` has an
    /// empty value. Empty pairs are ignored.
    pub fn parse(input: &str) -> Result<Self> {
        let mut values = Values::new();
        for pair in input.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            values.append(decode_str(key)?, decode_str(value)?);
        }
        Ok(values)
    }

    /// Encodes the values as a query string, in insertion order.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (key, values) in &self.0 {
            for value in values {
                if !out.is_empty() {
                    out.push('&');
                }
                out.extend(encode(key));
                out.push('=');
                out.extend(encode(value));
            }
        }
        out
    }
}

impl fmt::Display for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<IndexMap<String, Vec<String>>> for Values {
    fn from(map: IndexMap<String, Vec<String>>) -> Self {
        Values(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<String>)> for Values {
    fn from_iter<I: IntoIterator<Item = (K, Vec<String>)>>(iter: I) -> Self {
        Values(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for Values {
    type Item = (String, Vec<String>);
    type IntoIter = IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Values {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// As defined in https://url.spec.whatwg.org/#application-x-www-form-urlencoded-percent-encode-set
///
/// Every code point is encoded except the ASCII alphanumerics, `*`, `-`,
/// `.` and `_`. Spaces are written as `+` instead.
const FORM_URLENCODED_SET: &AsciiSet = &percent_encoding::NON_ALPHANUMERIC
    .remove(b' ')
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

fn encode(input: &str) -> impl Iterator<Item = Cow<'_, str>> + '_ {
    percent_encoding::utf8_percent_encode(input, FORM_URLENCODED_SET).map(|s| {
        if s.contains(' ') {
            Cow::Owned(s.replace(' ', "+"))
        } else {
            Cow::Borrowed(s)
        }
    })
}

#[inline(always)]
fn char_to_digit(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}

/// Replaces `+` with a space and decodes `%XX` escapes. Malformed escapes
/// are kept as they are.
fn decode(input: &[u8]) -> Cow<'_, [u8]> {
    if !input.iter().any(|&b| b == b'+' || b == b'%') {
        return Cow::Borrowed(input);
    }

    let mut decoded = Vec::with_capacity(input.len());
    let mut idx = 0;
    while idx < input.len() {
        match input[idx] {
            b'+' => {
                decoded.push(b' ');
                idx += 1;
            }
            b'%' => {
                let hex = input
                    .get(idx + 1..idx + 3)
                    .and_then(|h| Some((char_to_digit(h[0])?, char_to_digit(h[1])?)));
                match hex {
                    Some((h, l)) => {
                        decoded.push(h * 0x10 + l);
                        idx += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        idx += 1;
                    }
                }
            }
            b => {
                decoded.push(b);
                idx += 1;
            }
        }
    }
    Cow::Owned(decoded)
}

fn decode_str(input: &str) -> Result<String> {
    match decode(input.as_bytes()) {
        Cow::Borrowed(_) => Ok(input.to_owned()),
        Cow::Owned(bytes) => String::from_utf8(bytes).map_err(|e| {
            Error::custom(format!("invalid UTF-8 in query component {input:?}: {e}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_keeps_order_and_repeats() {
        let values = Values::parse("b=1&a=x&b=2&&c").unwrap();
        let pairs: Vec<_> = values.iter().collect();
        assert_eq!(
            pairs,
            vec![
                (&"b".to_owned(), &vec!["1".to_owned(), "2".to_owned()]),
                (&"a".to_owned(), &vec!["x".to_owned()]),
                (&"c".to_owned(), &vec![String::new()]),
            ]
        );
    }

    #[test]
    fn parse_decodes_components() {
        let values = Values::parse("na%20me=a+b%2Cc&bad=%zz%4").unwrap();
        assert_eq!(values.get_first("na me"), Some("a b,c"));
        assert_eq!(values.get_first("bad"), Some("%zz%4"));
    }

    #[test]
    fn parse_rejects_invalid_utf8() {
        assert!(Values::parse("a=%ff%fe").is_err());
    }

    #[test]
    fn encode_escapes_reserved_characters() {
        let mut values = Values::new();
        values.set("q", "a&b=c d+é");
        values.insert("empty", vec![]);
        values.set("k[0]", "*-._");
        insta::assert_snapshot!(values.encode(), @"q=a%26b%3Dc+d%2B%C3%A9&k%5B0%5D=*-._");
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut values = Values::new();
        values.set("a", "1");
        values.set("b", "2");
        values.merge([("a", vec!["3".to_owned()])].into_iter().collect());
        assert_eq!(values.encode(), "a=3&b=2");
    }

    #[test]
    fn serde_as_json_object() {
        let values = Values::parse("a=1&a=2").unwrap();
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"{"a":["1","2"]}"#);
    }
}
