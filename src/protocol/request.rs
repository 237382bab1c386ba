//! Request definitions
//!
//! An HTTP request as seen by the service layer.

use std::borrow::Cow;
use std::fmt;

use bytes::Bytes;

use crate::error::{Result, ShardError};

/// HTTP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Delete,
    Post,
    Head,
    Other(String),
}

impl Method {
    pub fn parse(token: &str) -> Self {
        match token {
            "GET" => Method::Get,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed HTTP request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,

    /// Path without the query string, e.g. `/v0/entity`
    pub path: String,

    /// Raw query string without the leading `?`
    pub query: Option<String>,

    pub body: Bytes,

    /// Whether the client wants the connection kept open
    pub keep_alive: bool,
}

impl Request {
    /// Build a request from a target such as `/v0/entity?id=k1`
    pub fn new(method: Method, target: &str, body: impl Into<Bytes>) -> Self {
        let (path, query) = split_target(target);
        Self {
            method,
            path,
            query,
            body: body.into(),
            keep_alive: true,
        }
    }

    /// Path plus query, as sent on the request line
    pub fn target(&self) -> Cow<'_, str> {
        match &self.query {
            Some(query) => Cow::Owned(format!("{}?{}", self.path, query)),
            None => Cow::Borrowed(&self.path),
        }
    }

    /// Percent-decoded value of the first query parameter called `name`
    ///
    /// Fails with `Validation` when that value does not decode to UTF-8.
    pub fn param(&self, name: &str) -> Result<Option<String>> {
        let Some(query) = self.query.as_deref() else {
            return Ok(None);
        };
        for pair in query.split('&') {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            if percent_decode(k).ok().as_deref() == Some(name) {
                return percent_decode(v).map(Some);
            }
        }
        Ok(None)
    }
}

pub(crate) fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

/// Decode `%XX` escapes and `+` as space; malformed escapes pass through
///
/// Escapes that decode to bytes which are not UTF-8 are a `Validation` error,
/// so distinct raw byte strings never collapse into the same key.
pub fn percent_decode(input: &str) -> Result<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out)
        .map_err(|_| ShardError::Validation(format!("{:?} does not decode to UTF-8", input)))
}

/// Escape everything outside the unreserved set
pub fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for &b in input.as_bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
