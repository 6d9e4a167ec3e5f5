//! Strict `Cookie` / `Set-Cookie` header codec.
//!
//! [`decode`] turns one header value into a single [`Cookie`] (or `None` when
//! the input violates the grammar) and [`encode`] projects a cookie back into
//! `Set-Cookie` header text with attributes in a fixed order:
//! `Path`, `Domain`, `Max-Age`, `Secure`, `HttpOnly`, `SameSite`.
//!
//! ```
//! use wirehttp::cookie::{self, SameSite};
//!
//! let c = cookie::decode("sid=abc; Path=/; HttpOnly; SameSite=Lax").unwrap();
//! assert_eq!(c.name(), "sid");
//! assert_eq!(c.same_site(), Some(SameSite::Lax));
//! assert_eq!(cookie::encode(&c), "sid=abc; Path=/; HttpOnly; SameSite=Lax");
//! ```

use std::fmt;

pub mod date;
mod decode;
mod encode;

pub use decode::{decode, decode_at};
pub use encode::encode;

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    /// Attribute value as written in `Set-Cookie`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }

    /// Interprets a received attribute value. Unknown or empty values fall
    /// back to `Strict`.
    pub fn from_attribute(value: &str) -> Self {
        if value.eq_ignore_ascii_case("lax") {
            Self::Lax
        } else if value.eq_ignore_ascii_case("none") {
            Self::None
        } else {
            Self::Strict
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP cookie with its `Set-Cookie` attributes.
///
/// Empty domains and paths are stored as absent, never as empty strings.
/// `max_age` is `None` when neither `Max-Age` nor a parseable `Expires` was
/// given, which is distinct from `Some(0)`.
///
/// A value holding a byte that cannot appear unquoted (space, comma,
/// backslash, `=` and so on) is always wrapped, so it encodes and decodes to
/// the same cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
    wrapped: bool,
}

impl Cookie {
    /// Creates a cookie with no attributes set.
    ///
    /// The name should be an RFC 9110 token (see
    /// [`has_valid_name`](Self::has_valid_name)); a cookie with any other
    /// name cannot be decoded back and is refused by
    /// [`Response::set_cookie`](crate::http::Response::set_cookie).
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            wrapped: needs_quotes(&value),
            value,
            domain: None,
            path: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = non_empty(domain.into());
        self
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = non_empty(path.into());
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Marks the value as quoted on the wire. Values that need quotes stay
    /// wrapped regardless.
    #[must_use]
    pub fn wrapped(mut self, wrapped: bool) -> Self {
        self.wrapped = wrapped || needs_quotes(&self.value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the name is empty or a token, i.e. the cookie
    /// survives an encode/decode round trip.
    pub fn has_valid_name(&self) -> bool {
        self.name.bytes().all(is_token_byte)
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Remaining lifetime in seconds; negative means already expired.
    pub fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn same_site(&self) -> Option<SameSite> {
        self.same_site
    }

    /// Returns `true` if the value was (or will be) written in double quotes.
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

fn needs_quotes(value: &str) -> bool {
    !value.bytes().all(is_value_byte)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// `tchar` from RFC 9110 §5.6.2.
pub(crate) fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

/// `cookie-octet` from RFC 6265 §4.1.1, minus `=` which the legacy grammar
/// treats as ambiguous inside an unquoted value.
pub(crate) fn is_value_byte(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C | 0x3E..=0x5B | 0x5D..=0x7E)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_domain_and_path_are_absent() {
        let c = Cookie::new("a", "b").with_domain("").with_path("");
        assert_eq!(c.domain(), None);
        assert_eq!(c.path(), None);
    }

    #[test]
    fn same_site_from_attribute() {
        assert_eq!(SameSite::from_attribute("Strict"), SameSite::Strict);
        assert_eq!(SameSite::from_attribute("LAX"), SameSite::Lax);
        assert_eq!(SameSite::from_attribute("none"), SameSite::None);
        assert_eq!(SameSite::from_attribute(""), SameSite::Strict);
        assert_eq!(SameSite::from_attribute("bogus"), SameSite::Strict);
    }

    #[test]
    fn value_bytes_exclude_separators() {
        for b in *b" \",;\\=\x7f\t" {
            assert!(!is_value_byte(b), "{b:#x}");
        }
        for b in *b"abcXYZ019!#$%&'()*+-./:<>?@[]^_`{|}~" {
            assert!(is_value_byte(b), "{b:#x}");
        }
    }

    #[test]
    fn values_needing_quotes_are_always_wrapped() {
        assert!(Cookie::new("a", "x y").is_wrapped());
        assert!(Cookie::new("a", "k=v").wrapped(false).is_wrapped());
        assert!(!Cookie::new("a", "plain").is_wrapped());
        assert!(Cookie::new("a", "plain").wrapped(true).is_wrapped());
    }

    #[test]
    fn name_validity() {
        assert!(Cookie::new("sid", "v").has_valid_name());
        assert!(Cookie::new("", "v").has_valid_name());
        assert!(!Cookie::new("a b", "v").has_valid_name());
        assert!(!Cookie::new("a;b", "v").has_valid_name());
    }

    #[test]
    fn display_matches_encode() {
        let c = Cookie::new("id", "7").with_max_age(60);
        assert_eq!(c.to_string(), "id=7; Max-Age=60");
    }
}
