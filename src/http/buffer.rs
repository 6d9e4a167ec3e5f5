//! Sliding byte window over accumulated socket reads.

use bytes::{Buf, Bytes, BytesMut};

/// An append-only byte buffer that can drop bytes from its front.
///
/// Index `0` always refers to the first byte that has not been consumed yet;
/// consumed bytes are never observable again. Appending is amortized O(1)
/// and [`consume`](Self::consume) only moves the window's start.
///
/// # Examples
///
/// ```
/// use wirehttp::http::ByteWindow;
///
/// let mut window = ByteWindow::new();
/// window.extend(b"GET /");
/// assert_eq!(window.get(0), Some(b'G'));
///
/// window.consume(4);
/// assert_eq!(window.as_slice(), b"/");
/// ```
#[derive(Debug, Default)]
pub struct ByteWindow {
    buf: BytesMut,
}

impl ByteWindow {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes to the back of the window.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Returns the byte at `index`, counted from the first unconsumed byte.
    pub fn get(&self, index: usize) -> Option<u8> {
        self.buf.get(index).copied()
    }

    /// Number of unconsumed bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if every appended byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the unconsumed bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Returns `true` if the unconsumed bytes begin with `prefix`.
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.buf.starts_with(prefix)
    }

    /// Position of the first occurrence of `needle`, searching from `from`.
    pub fn find(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() || from >= self.buf.len() {
            return None;
        }
        self.buf[from..]
            .windows(needle.len())
            .position(|w| w == needle)
            .map(|pos| pos + from)
    }

    /// Drops the first `count` bytes. Dropping more than [`len`](Self::len)
    /// empties the window.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.buf.len());
        self.buf.advance(count);
    }

    /// Removes and returns the first `count` bytes, or `None` if fewer are buffered.
    pub fn split_to(&mut self, count: usize) -> Option<Bytes> {
        if count > self.buf.len() {
            return None;
        }
        Some(self.buf.split_to(count).freeze())
    }

    /// Consumes the window, returning whatever has not been consumed yet.
    pub fn into_remaining(self) -> BytesMut {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_zero_tracks_first_unconsumed_byte() {
        let mut w = ByteWindow::new();
        w.extend(b"abc");
        w.extend(b"def");
        w.consume(2);
        assert_eq!(w.get(0), Some(b'c'));
        assert_eq!(w.len(), 4);
        assert_eq!(w.get(4), None);
    }

    #[test]
    fn consume_past_end_empties() {
        let mut w = ByteWindow::new();
        w.extend(b"ab");
        w.consume(10);
        assert!(w.is_empty());
    }

    #[test]
    fn find_respects_start_offset() {
        let mut w = ByteWindow::new();
        w.extend(b"\r\n\r\nx\r\n\r\n");
        assert_eq!(w.find(b"\r\n\r\n", 0), Some(0));
        assert_eq!(w.find(b"\r\n\r\n", 1), Some(5));
        assert_eq!(w.find(b"\r\n\r\n", 20), None);
    }

    #[test]
    fn split_to_requires_enough_bytes() {
        let mut w = ByteWindow::new();
        w.extend(b"hello");
        assert!(w.split_to(6).is_none());
        assert_eq!(w.split_to(4).as_deref(), Some(&b"hell"[..]));
        assert_eq!(w.as_slice(), b"o");
    }
}
