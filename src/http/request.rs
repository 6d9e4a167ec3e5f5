//! The immutable result of a completed parse.

use bytes::Bytes;

use super::{Headers, Method};

/// A fully parsed HTTP/1.1 request.
///
/// Produced only by [`RequestParser`](super::RequestParser) once it reports
/// ready; it has no setters and is never mutated afterwards.
///
/// # Examples
///
/// ```
/// use wirehttp::http::{Method, RequestParser};
///
/// let mut parser = RequestParser::new();
/// parser.feed(b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n");
/// let request = parser.request().unwrap();
///
/// assert_eq!(request.method(), Method::Get);
/// assert_eq!(request.target(), "/hello?name=world");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("name=world"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// assert!(request.body().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    target: String,
    version: String,
    headers: Headers,
    body: Option<Bytes>,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        target: String,
        version: String,
        headers: Headers,
        body: Option<Bytes>,
    ) -> Self {
        Self {
            method,
            target,
            version,
            headers,
            body,
        }
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the request target exactly as it appeared on the request line.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the target without its query string.
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Returns the protocol version literal, e.g. `HTTP/1.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the body, present only when the request carried `Content-Length`.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `Connection: close` is sent.
    pub fn is_keep_alive(&self) -> bool {
        !self
            .headers
            .get_all("connection")
            .any(|v| v.trim().eq_ignore_ascii_case("close"))
    }

    /// Deserializes the body as JSON. A missing body is treated as empty input.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.body.as_deref().unwrap_or_default())
    }
}
