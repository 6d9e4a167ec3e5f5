use std::fmt::Write;

use super::Cookie;

/// Encodes a cookie as `Set-Cookie` header text.
///
/// The value is quoted when the cookie is wrapped, which every value holding
/// a byte not allowed in an unquoted value is. Only attributes that are
/// set are written, always in the order `Path`, `Domain`, `Max-Age`,
/// `Secure`, `HttpOnly`, `SameSite`.
pub fn encode(cookie: &Cookie) -> String {
    let mut out = String::with_capacity(cookie.name.len() + cookie.value.len() + 64);

    out.push_str(&cookie.name);
    out.push('=');
    if cookie.wrapped {
        out.push('"');
        out.push_str(&cookie.value);
        out.push('"');
    } else {
        out.push_str(&cookie.value);
    }

    if let Some(path) = &cookie.path {
        out.push_str("; Path=");
        out.push_str(path);
    }
    if let Some(domain) = &cookie.domain {
        out.push_str("; Domain=");
        out.push_str(domain);
    }
    if let Some(max_age) = cookie.max_age {
        // Writing into a String cannot fail.
        let _ = write!(out, "; Max-Age={max_age}");
    }
    if cookie.secure {
        out.push_str("; Secure");
    }
    if cookie.http_only {
        out.push_str("; HttpOnly");
    }
    if let Some(same_site) = cookie.same_site {
        out.push_str("; SameSite=");
        out.push_str(same_site.as_str());
    }

    out
}
