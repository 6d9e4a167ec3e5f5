//! Incremental HTTP/1.1 request parser.
//!
//! [`RequestParser`] accepts bytes in chunks of any size, down to one byte
//! at a time, and walks through the request in a fixed order:
//!
//! ```text
//! method -> target -> version -> headers -> body -> ready
//! ```
//!
//! A phase only runs once the previous one has committed, and a committed
//! phase is never revisited. Bytes belonging to a committed phase are dropped
//! from the window, so nothing is parsed twice.
//!
//! The parser never fails loudly. Input that can no longer become a valid
//! request flips [`RequestParser::is_malformed`] and the parser simply never
//! becomes ready. Capping buffered bytes and elapsed time is the connection
//! handler's job (see [`crate::server`]).

use bytes::{Bytes, BytesMut};
use tracing::trace;

use super::{ByteWindow, Headers, Method, Request};

/// The only version literal accepted on the request line, with its line ending.
const VERSION_LINE: &[u8] = b"HTTP/1.1\r\n";

/// Bytes consumed by the version phase. The trailing CRLF stays in the window
/// and is the first line break the header phase sees.
const VERSION_LEN: usize = 8;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Method,
    Target,
    Version,
    Headers,
    Body,
    Ready,
    Malformed,
}

/// Outcome of matching the front of the window against the method table.
enum MethodMatch {
    Found(Method),
    NeedMore,
    NoMatch,
}

/// One-shot parser for a single request on a connection.
///
/// A parser is not reset between requests: once it is ready, take the
/// request with [`into_parts`](Self::into_parts) and start a new parser with
/// the leftover bytes.
///
/// # Examples
///
/// ```
/// use wirehttp::http::{Method, RequestParser};
///
/// let mut parser = RequestParser::new();
/// for chunk in [&b"POST /user HT"[..], b"TP/1.1\r\ncontent-length: 2\r\n\r\n", b"{}"] {
///     parser.feed(chunk);
/// }
/// assert!(parser.is_ready());
///
/// let request = parser.request().unwrap();
/// assert_eq!(request.method(), Method::Post);
/// assert_eq!(request.body().map(|b| &b[..]), Some(&b"{}"[..]));
/// ```
#[derive(Debug)]
pub struct RequestParser {
    window: ByteWindow,
    phase: Phase,
    // Where the current phase should resume scanning; bytes before this
    // offset were already inspected and did not contain the delimiter.
    scan_from: usize,
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: Option<Headers>,
    content_length: Option<usize>,
    request: Option<Request>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    /// Creates a parser with an empty window.
    pub fn new() -> Self {
        Self {
            window: ByteWindow::new(),
            phase: Phase::Method,
            scan_from: 0,
            method: None,
            target: None,
            version: None,
            headers: None,
            content_length: None,
            request: None,
        }
    }

    /// Appends `bytes` and advances through as many phases as the buffered
    /// data allows. Returns `true` once the request is complete.
    ///
    /// After the parser is ready, further bytes are kept untouched for the
    /// next request; after it is malformed they are discarded.
    pub fn feed(&mut self, bytes: &[u8]) -> bool {
        match self.phase {
            Phase::Malformed => return false,
            Phase::Ready => {
                self.window.extend(bytes);
                return true;
            }
            _ => self.window.extend(bytes),
        }

        loop {
            let before = self.phase;
            match self.phase {
                Phase::Method => self.parse_method(),
                Phase::Target => self.parse_target(),
                Phase::Version => self.parse_version(),
                Phase::Headers => self.parse_headers(),
                Phase::Body => self.parse_body(),
                Phase::Ready | Phase::Malformed => break,
            }
            if self.phase == before {
                break;
            }
            self.scan_from = 0;
            trace!(from = ?before, to = ?self.phase, buffered = self.window.len(), "parser phase advanced");
        }

        self.is_ready()
    }

    /// Returns `true` once method, target, version and headers are resolved
    /// and the body (if announced by `Content-Length`) has fully arrived.
    /// Never goes back to `false`.
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Returns `true` if the buffered bytes can no longer form a valid request.
    pub fn is_malformed(&self) -> bool {
        self.phase == Phase::Malformed
    }

    /// Number of bytes buffered but not yet committed to a phase.
    pub fn buffered_len(&self) -> usize {
        self.window.len()
    }

    /// The resolved method, available as soon as the method phase commits.
    pub fn method(&self) -> Option<Method> {
        self.method
            .or_else(|| self.request.as_ref().map(Request::method))
    }

    /// The parsed request, once ready.
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Splits a ready parser into its request and the bytes that arrived
    /// after the request ended (the start of a pipelined request, if any).
    ///
    /// Returns `None` if the parser is not ready.
    pub fn into_parts(self) -> Option<(Request, BytesMut)> {
        let request = self.request?;
        Some((request, self.window.into_remaining()))
    }

    fn match_method(&self) -> MethodMatch {
        let buffered = self.window.as_slice();
        let mut partial = false;

        for method in Method::ALL {
            let token = method.as_bytes();
            let needed = token.len() + 1;
            let available = buffered.len().min(needed);

            let token_part = available.min(token.len());
            if buffered[..token_part] != token[..token_part] {
                continue;
            }
            // The byte right after the token must be a single space,
            // otherwise "GETX" would read as GET.
            if available == needed {
                if buffered[token.len()] == b' ' {
                    return MethodMatch::Found(method);
                }
            } else {
                partial = true;
            }
        }

        if partial {
            MethodMatch::NeedMore
        } else {
            MethodMatch::NoMatch
        }
    }

    fn parse_method(&mut self) {
        match self.match_method() {
            MethodMatch::Found(method) => {
                self.window.consume(method.as_bytes().len() + 1);
                self.method = Some(method);
                self.phase = Phase::Target;
            }
            MethodMatch::NeedMore => {}
            MethodMatch::NoMatch => self.phase = Phase::Malformed,
        }
    }

    fn parse_target(&mut self) {
        let buffered = self.window.as_slice();
        let Some(offset) = buffered[self.scan_from..]
            .iter()
            .position(|&b| matches!(b, b' ' | b'\r' | b'\n'))
        else {
            self.scan_from = buffered.len();
            return;
        };
        let end = self.scan_from + offset;

        if buffered[end] != b' ' {
            self.phase = Phase::Malformed;
            return;
        }
        let target = match std::str::from_utf8(&buffered[..end]) {
            Ok(target) => target.to_owned(),
            Err(_) => {
                self.phase = Phase::Malformed;
                return;
            }
        };
        self.target = Some(target);
        self.window.consume(end + 1);
        self.phase = Phase::Version;
    }

    fn parse_version(&mut self) {
        if self.window.len() < VERSION_LINE.len() {
            return;
        }
        if !self.window.starts_with(VERSION_LINE) {
            self.phase = Phase::Malformed;
            return;
        }
        self.version = Some("HTTP/1.1".to_owned());
        self.window.consume(VERSION_LEN);
        self.phase = Phase::Headers;
    }

    fn parse_headers(&mut self) {
        let Some(end) = self.window.find(HEADER_TERMINATOR, self.scan_from) else {
            // A terminator may straddle the next chunk boundary.
            self.scan_from = self
                .window
                .len()
                .saturating_sub(HEADER_TERMINATOR.len() - 1);
            return;
        };

        let parsed = std::str::from_utf8(&self.window.as_slice()[..end])
            .ok()
            .and_then(Headers::parse_block);
        let Some(headers) = parsed else {
            self.phase = Phase::Malformed;
            return;
        };

        // Repeated Content-Length headers must all carry the same length.
        let mut content_length = None;
        for value in headers.get_all("content-length") {
            match value.trim().parse::<usize>() {
                Ok(length) if content_length.unwrap_or(length) == length => {
                    content_length = Some(length);
                }
                _ => {
                    self.phase = Phase::Malformed;
                    return;
                }
            }
        }

        self.window.consume(end + HEADER_TERMINATOR.len());
        self.headers = Some(headers);
        self.content_length = content_length;

        match content_length {
            Some(_) => self.phase = Phase::Body,
            None => self.finish(None),
        }
    }

    fn parse_body(&mut self) {
        let length = self.content_length.unwrap_or(0);
        if let Some(body) = self.window.split_to(length) {
            self.finish(Some(body));
        }
    }

    fn finish(&mut self, body: Option<Bytes>) {
        if let (Some(method), Some(target), Some(version), Some(headers)) = (
            self.method.take(),
            self.target.take(),
            self.version.take(),
            self.headers.take(),
        ) {
            self.request = Some(Request::new(method, target, version, headers, body));
            self.phase = Phase::Ready;
        } else {
            self.phase = Phase::Malformed;
        }
    }
}
