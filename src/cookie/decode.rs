use chrono::{DateTime, Utc};
use tracing::trace;

use super::date::parse_http_date;
use super::{Cookie, SameSite, is_token_byte, is_value_byte};

/// Decodes a single cookie from a `Set-Cookie` (or `Cookie`) header value.
///
/// Returns `None` when the name/value pair violates the grammar: no `=`, a
/// name that is not a token, an unterminated quote, or an unquoted value
/// containing a comma, a second `=`, whitespace or another separator.
/// Malformed attributes never invalidate the cookie; they are skipped.
///
/// `Expires` is converted to seconds remaining from now; `Max-Age` wins over
/// it regardless of order.
pub fn decode(header: &str) -> Option<Cookie> {
    decode_at(header, Utc::now())
}

/// [`decode`] with an explicit clock for `Expires` conversion.
pub fn decode_at(header: &str, now: DateTime<Utc>) -> Option<Cookie> {
    let mut segments = header.split(';');
    let (name, raw_value) = segments.next()?.split_once('=')?;

    let name = name.trim();
    if !name.bytes().all(is_token_byte) {
        return None;
    }
    let (value, wrapped) = unwrap_value(raw_value.trim())?;
    let mut cookie = Cookie::new(name, value).wrapped(wrapped);

    let mut max_age = None;
    let mut expires = None;

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (attr, value) = match segment.split_once('=') {
            Some((attr, value)) => (attr.trim(), value.trim()),
            None => (segment, ""),
        };

        match attr.to_ascii_lowercase().as_str() {
            "expires" => {
                if let Some(date) = parse_http_date(value) {
                    expires = Some(seconds_until(date, now));
                }
            }
            "max-age" => {
                if let Ok(seconds) = value.parse::<i64>() {
                    max_age = Some(seconds);
                }
            }
            "domain" => cookie = cookie.with_domain(value),
            "path" => cookie = cookie.with_path(value),
            "secure" => cookie = cookie.secure(true),
            "httponly" => cookie = cookie.http_only(true),
            "samesite" => cookie = cookie.with_same_site(SameSite::from_attribute(value)),
            other => trace!(attribute = other, "ignoring cookie attribute"),
        }
    }

    cookie.max_age = max_age.or(expires);
    Some(cookie)
}

/// Strips surrounding quotes, returning the value and whether it was quoted.
fn unwrap_value(raw: &str) -> Option<(&str, bool)> {
    if let Some(rest) = raw.strip_prefix('"') {
        let close = rest.find('"')?;
        let trailing = &rest[close + 1..];
        if trailing.bytes().all(|b| b == b',' || b.is_ascii_whitespace()) {
            return Some((&rest[..close], true));
        }
        return None;
    }
    if raw.bytes().all(is_value_byte) {
        Some((raw, false))
    } else {
        None
    }
}

/// Whole seconds from `now` until `date`, rounded up. Negative once expired.
fn seconds_until(date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (date - now).num_milliseconds();
    millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn strict(header: &str) -> Cookie {
        decode(header).unwrap_or_else(|| panic!("expected a cookie from {header:?}"))
    }

    #[test]
    fn expires_becomes_max_age() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let expires = (now + Duration::seconds(50)).format("%a, %d %b %Y %H:%M:%S GMT");
        let header = format!(
            "myCookie=myValue;expires={expires};path=/apathsomewhere;domain=.adomainsomewhere;secure;"
        );
        let c = decode_at(&header, now).unwrap();
        assert_eq!(c.value(), "myValue");
        assert_eq!(c.domain(), Some(".adomainsomewhere"));
        assert_eq!(c.path(), Some("/apathsomewhere"));
        assert!(c.is_secure());
        assert_eq!(c.max_age(), Some(50));
    }

    #[test]
    fn expires_with_live_clock() {
        let expires = (Utc::now() + Duration::seconds(50)).format("%a, %d %b %Y %H:%M:%S GMT");
        let c = strict(&format!("myCookie=myValue;expires={expires}"));
        let max_age = c.max_age().unwrap();
        assert!((40..=60).contains(&max_age), "{max_age}");
    }

    #[test]
    fn far_future_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2100, 12, 31, 23, 59, 59).unwrap();
        let c = decode_at("Format=EU; expires=Fri, 31-Dec-2100 23:59:59 GMT; path=/", now).unwrap();
        assert_eq!(c.max_age(), Some((end - now).num_seconds()));
        assert_eq!(c.path(), Some("/"));
    }

    #[test]
    fn past_expiry_is_negative() {
        let now = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let c = decode_at("a=b; expires=Fri, 31-Dec-1999 23:59:00 GMT", now).unwrap();
        assert_eq!(c.max_age(), Some(-60));
    }

    #[test]
    fn max_age_overrides_expires_in_any_order() {
        let c = strict("a=b; Max-Age=50; Expires=Fri, 31-Dec-2100 23:59:59 GMT");
        assert_eq!(c.max_age(), Some(50));
        let c = strict("a=b; Expires=Fri, 31-Dec-2100 23:59:59 GMT; Max-Age=50");
        assert_eq!(c.max_age(), Some(50));
    }

    #[test]
    fn unparseable_expires_is_ignored() {
        let c = strict("a=b; expires=someday");
        assert_eq!(c.max_age(), None);
    }

    #[test]
    fn legacy_attributes_are_ignored() {
        for header in [
            "myCookie=myValue;max-age=50;path=/apathsomewhere;domain=.adomainsomewhere;secure;\
             comment=this is a comment;version=0;commentURL=http://aurl.com;port=\"80,8080\";discard;",
            "myCookie=myValue;max-age=50;path=/apathsomewhere;domain=.adomainsomewhere;secure;\
             comment=this is a comment;version=1;",
            "myCookie=myValue;max-age=50;path=/apathsomewhere;domain=.adomainsomewhere;secure;\
             comment=this is a comment;version=1;commentURL=http://aurl.com;port='80,8080';discard;",
            "myCookie=myValue;max-age=50;path=/apathsomewhere;domain=.adomainsomewhere;secure;\
             comment=this is a comment;version=2;commentURL=\"http://aurl.com\";port='80,8080';discard;",
        ] {
            let c = strict(header);
            assert_eq!(c.name(), "myCookie");
            assert_eq!(c.value(), "myValue");
            assert_eq!(c.domain(), Some(".adomainsomewhere"));
            assert_eq!(c.path(), Some("/apathsomewhere"));
            assert_eq!(c.max_age(), Some(50));
            assert!(c.is_secure());
        }
    }

    #[test]
    fn quoted_values() {
        let c = strict("a=\"\",");
        assert_eq!((c.name(), c.value(), c.is_wrapped()), ("a", "", true));
        let c = strict("b=\"1\",");
        assert_eq!((c.name(), c.value(), c.is_wrapped()), ("b", "1", true));
    }

    #[test]
    fn quoted_value_is_taken_verbatim() {
        let long = "b___$Q__$ha__<NC=MN(F__%#4__<NC=MN(F__2_d____#=IvZB__2_F____'=KqtH__2-9____";
        let c = strict(&format!("bh=\"{long}\";"));
        assert_eq!(c.name(), "bh");
        assert_eq!(c.value(), long);
    }

    #[test]
    fn unterminated_quote_is_invalid() {
        assert!(decode("a=\"open").is_none());
        assert!(decode("a=\"x\"y").is_none());
    }

    #[test]
    fn later_pairs_are_treated_as_attributes() {
        let c = strict(
            "ARPT=LWUKQPSWRTUN04CKKJI; kw-2E343B92-B097-442c-BFA5-BE371E0325A2=unfinished furniture; \
             __utma=48461872.1094088325.1258140131.1258140131.1258140131.1; \
             __utmz=48461872.1258140131.1.1.utmcsr=overstock.com|utmccn=(referral)|\
             utmcmd=referral|utmcct=/Home-Garden/Furniture/Clearance,/clearance,/32/dept.html",
        );
        assert_eq!(c.name(), "ARPT");
        assert_eq!(c.value(), "LWUKQPSWRTUN04CKKJI");
    }

    #[test]
    fn comma_in_value_is_invalid() {
        assert!(decode(
            "UserCookie=timeZoneName=(GMT+04:00) Moscow, St. Petersburg, Volgograd&promocode=&region=BE; \
             expires=Sat, 01-Dec-2012 10:53:31 GMT; path=/"
        )
        .is_none());
    }

    #[test]
    fn comma_and_extra_equals_is_invalid() {
        assert!(decode("A=v=1&lg=en-US,it-IT,it&intl=it&np=1;T=z=E").is_none());
    }

    #[test]
    fn missing_equals_is_invalid() {
        assert!(decode("justaname").is_none());
        assert!(decode("").is_none());
    }

    #[test]
    fn attribute_names_as_cookie_names() {
        let c = strict("path=; expires=Mon, 01-Jan-1990 00:00:00 GMT; path=/; domain=.www.google.com");
        assert_eq!(c.name(), "path");
        assert_eq!(c.value(), "");
        assert_eq!(c.path(), Some("/"));
        assert_eq!(c.domain(), Some(".www.google.com"));

        let c = strict("HTTPOnly=");
        assert_eq!(c.name(), "HTTPOnly");
        assert_eq!(c.value(), "");
        assert!(!c.is_http_only());
    }

    #[test]
    fn empty_name_is_allowed() {
        let c = strict("=abc");
        assert_eq!(c.name(), "");
        assert_eq!(c.value(), "abc");
    }

    #[test]
    fn non_token_name_is_invalid() {
        assert!(decode("na me=v").is_none());
        assert!(decode("a(b)=v").is_none());
    }

    #[test]
    fn empty_domain_and_path_are_absent() {
        let c = strict("sessionid=OTY4ZDllNTgtYjU3OC00MWRjLTkzMWMtNGUwNzk4MTY0MTUw;Domain=;Path=/");
        assert_eq!(c.domain(), None);
        assert_eq!(c.path(), Some("/"));

        let c = strict("sessionid=abc;Domain=;Path=");
        assert_eq!(c.domain(), None);
        assert_eq!(c.path(), None);
    }

    #[test]
    fn same_site_values() {
        let base = "sessionid=OTY4ZDllNTgtYjU3OC00MWRjLTkzMWMtNGUwNzk4MTY0MTUw";
        assert_eq!(strict(&format!("{base};SameSite=Strict")).same_site(), Some(SameSite::Strict));
        assert_eq!(strict(&format!("{base};SameSite=Lax")).same_site(), Some(SameSite::Lax));
        assert_eq!(strict(&format!("{base};SameSite=")).same_site(), Some(SameSite::Strict));
        assert_eq!(strict(&format!("{base};samesite=None")).same_site(), Some(SameSite::None));
        assert_eq!(strict(base).same_site(), None);
    }

    #[test]
    fn flags_are_case_insensitive() {
        let c = strict("a=b; SECURE; HttpOnly");
        assert!(c.is_secure());
        assert!(c.is_http_only());
    }
}
