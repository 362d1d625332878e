//! Incoming HTTP request type.

use std::collections::HashMap;

use http::{HeaderMap, Method, Uri};

use crate::body::RawBody;

/// An incoming HTTP request whose body has already been captured.
///
/// Steps borrow it immutably, so every step sees the same metadata and can
/// decode [`body`](Self::body) as often as it likes.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: RawBody,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(
        parts: http::request::Parts,
        body: RawBody,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &RawBody { &self.body }

    /// Case-insensitive header lookup. Values that are not visible ASCII are
    /// treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// The requested host without its port, from the URI authority (HTTP/2,
    /// absolute-form) or else the `Host` header.
    pub fn host(&self) -> Option<&str> {
        host_of(&self.uri, &self.headers)
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/SalOrder/{IDSalOrder}`, `req.param("IDSalOrder")` on
    /// `/SalOrder/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Builds a request with no path parameters. Useful for driving a
/// [`Chain`](crate::Chain) directly.
impl From<http::Request<RawBody>> for Request {
    fn from(req: http::Request<RawBody>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body, HashMap::new())
    }
}

pub(crate) fn host_of<'a>(uri: &'a Uri, headers: &'a HeaderMap) -> Option<&'a str> {
    if let Some(host) = uri.host() {
        return Some(host);
    }
    let raw = headers.get(http::header::HOST)?.to_str().ok()?;
    Some(strip_port(raw))
}

fn strip_port(authority: &str) -> &str {
    // IPv6 literals keep their brackets: "[::1]:8080" → "[::1]".
    if let Some(end) = authority.find(']') {
        return &authority[..=end];
    }
    authority.split(':').next().unwrap_or(authority)
}
