//! Date grammar for the cookie `Expires` attribute.
//!
//! Accepts the formats that show up in real `Set-Cookie` headers:
//!
//! | Format    | Example                            |
//! |-----------|------------------------------------|
//! | RFC 1123  | `Sun, 06 Nov 1994 08:49:37 GMT`    |
//! | Netscape  | `Fri, 31-Dec-2100 23:59:59 GMT`    |
//! | RFC 850   | `Sunday, 06-Nov-94 08:49:37 GMT`   |
//! | asctime   | `Sun Nov  6 08:49:37 1994`         |
//!
//! The weekday name is skipped, not checked against the date.

use chrono::{DateTime, NaiveDateTime, Utc};

// Two-digit years go first: `%Y` would happily read "94" as the year 94.
const AFTER_WEEKDAY_FORMATS: [&str; 3] = [
    "%d %b %Y %H:%M:%S",
    "%d-%b-%y %H:%M:%S",
    "%d-%b-%Y %H:%M:%S",
];

const ASCTIME_FORMAT: &str = "%b %d %H:%M:%S %Y";

/// Parses an HTTP date, returning `None` for anything unrecognized.
pub fn parse_http_date(input: &str) -> Option<DateTime<Utc>> {
    let normalized = input.split_whitespace().collect::<Vec<_>>().join(" ");

    let naive = match normalized.split_once(',') {
        Some((_, rest)) => {
            let rest = rest.trim();
            let rest = rest
                .strip_suffix(" GMT")
                .or_else(|| rest.strip_suffix(" UTC"))
                .unwrap_or(rest);
            AFTER_WEEKDAY_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(rest, fmt).ok())
        }
        None => {
            let (_, rest) = normalized.split_once(' ')?;
            NaiveDateTime::parse_from_str(rest, ASCTIME_FORMAT).ok()
        }
    }?;

    Some(naive.and_utc())
}
