//! HTTP request types.

use std::collections::HashMap;
use std::fmt;

/// HTTP method.
///
/// The nine methods the router keeps a dispatch tree for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET method.
    Get,
    /// HEAD method.
    Head,
    /// POST method.
    Post,
    /// PUT method.
    Put,
    /// PATCH method.
    Patch,
    /// DELETE method.
    Delete,
    /// CONNECT method.
    Connect,
    /// OPTIONS method.
    Options,
    /// TRACE method.
    Trace,
}

impl Method {
    /// Number of recognized methods (one dispatch tree each).
    pub const COUNT: usize = 9;

    /// All methods, in dispatch-table order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Get,
        Self::Head,
        Self::Post,
        Self::Put,
        Self::Patch,
        Self::Delete,
        Self::Connect,
        Self::Options,
        Self::Trace,
    ];

    /// Parse a method from its exact uppercase name.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"GET" => Some(Self::Get),
            b"HEAD" => Some(Self::Head),
            b"POST" => Some(Self::Post),
            b"PUT" => Some(Self::Put),
            b"PATCH" => Some(Self::Patch),
            b"DELETE" => Some(Self::Delete),
            b"CONNECT" => Some(Self::Connect),
            b"OPTIONS" => Some(Self::Options),
            b"TRACE" => Some(Self::Trace),
            _ => None,
        }
    }

    /// Resolve a method from the leading bytes of a method token.
    ///
    /// Six methods are distinguished by their first byte (`G`, `H`, `D`,
    /// `C`, `O`, `T`); the `P*` methods fall through to the second byte
    /// (`O` → POST, `U` → PUT, `A` → PATCH). Anything else is `None`.
    ///
    /// This is deliberately permissive about the tail of the token:
    /// `"GARBAGE"` resolves like `GET`. Callers that need strict parsing
    /// use [`Method::from_bytes`].
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        match token.as_bytes().first()? {
            b'G' => Some(Self::Get),
            b'H' => Some(Self::Head),
            b'D' => Some(Self::Delete),
            b'C' => Some(Self::Connect),
            b'O' => Some(Self::Options),
            b'T' => Some(Self::Trace),
            _ => match token.as_bytes().get(1)? {
                b'O' => Some(Self::Post),
                b'U' => Some(Self::Put),
                b'A' => Some(Self::Patch),
                _ => None,
            },
        }
    }

    /// Position of this method in the dispatch table.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Get => 0,
            Self::Head => 1,
            Self::Post => 2,
            Self::Put => 3,
            Self::Patch => 4,
            Self::Delete => 5,
            Self::Connect => 6,
            Self::Options => 7,
            Self::Trace => 8,
        }
    }

    /// Return the canonical uppercase method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Connect => "CONNECT",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP headers collection.
///
/// Names are stored lowercased; lookups are case-insensitive.
#[derive(Debug, Default, Clone)]
pub struct Headers {
    inner: HashMap<String, Vec<u8>>,
}

impl Headers {
    /// Create empty headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a header value by name (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Get a header value as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Insert a header, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.inner
            .insert(name.into().to_ascii_lowercase(), value.into());
    }

    /// Remove a header by name (case-insensitive).
    ///
    /// Returns the removed value, if any.
    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.inner.remove(&name.to_ascii_lowercase())
    }

    /// Check if a header exists (case-insensitive).
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterate over all headers as (name, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.inner
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_slice()))
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove all headers, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.inner.clear();
    }
}

/// HTTP request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Vec<u8>,
}

impl Request {
    /// Create a new request from a method and a request target.
    ///
    /// A `?` in the target separates the path from the query string.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
            None => (target.to_owned(), None),
        };
        Self {
            method,
            path,
            query,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Get the HTTP method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the request path.
    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Get the raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Replace the query string.
    pub fn set_query(&mut self, query: Option<String>) {
        self.query = query;
    }

    /// Look up the first value of a query parameter by name.
    ///
    /// Values are returned as-is; no percent-decoding is applied.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        for pair in self.query.as_deref()?.split('&') {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            if key == name {
                return Some(value);
            }
        }
        None
    }

    /// Get the headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Get mutable headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Add a header, builder style.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Get the request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Replace the request body.
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.body = body;
    }

    /// Take the body, leaving an empty one behind.
    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }
}
