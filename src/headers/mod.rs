//! Structured HTTP header values.
//!
//! Parsing and rendering for the headers AtomPub leans on: entity tags,
//! `Cache-Control`, `Prefer`, `Link` and q-valued `Accept` lists. Each type
//! renders back to the wire form with [`Display`](std::fmt::Display).

mod cache_control;
mod entity_tag;
mod preference;
mod quality;
mod web_link;

use std::time::SystemTime;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

pub use cache_control::CacheControl;
pub use entity_tag::EntityTag;
pub use preference::Preference;
pub use quality::{QToken, is_atom, media_type_matches, order_by_q};
pub use web_link::WebLink;

/// RFC 8187 `attr-char`: everything else is percent-encoded in an ext-value.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!').remove(b'#').remove(b'$').remove(b'&').remove(b'+')
    .remove(b'-').remove(b'.').remove(b'^').remove(b'_').remove(b'`')
    .remove(b'|').remove(b'~');

/// RFC 9110 `tchar`.
pub(crate) fn is_tchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_tchar)
}

pub(crate) fn quoted_if_not_token(s: &str) -> String {
    if is_token(s) { s.to_owned() } else { quoted(s) }
}

/// `s` as a quoted-string, escaping `"` and `\`.
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

pub(crate) fn unquote(s: &str) -> String {
    let s = s.trim();
    match s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => s.to_owned(),
    }
}

/// True if the value must travel as an RFC 8187 ext-value (`name*=`).
pub(crate) fn needs_ext_value(s: &str) -> bool {
    !s.is_ascii() || s.chars().any(|c| c.is_ascii_control())
}

/// Encodes `s` as an RFC 8187 ext-value: `UTF-8''percent%20encoded`.
pub(crate) fn encode_ext_value(s: &str) -> String {
    format!("UTF-8''{}", utf8_percent_encode(s, ATTR_CHAR))
}

/// Decodes an RFC 8187 ext-value. Plain values pass through unchanged.
pub(crate) fn decode_ext_value(s: &str) -> String {
    let Some((charset, rest)) = s.split_once('\'') else {
        return s.to_owned();
    };
    if !charset.eq_ignore_ascii_case("utf-8") {
        return s.to_owned();
    }
    let encoded = rest.split_once('\'').map_or(rest, |(_lang, v)| v);
    percent_decode_str(encoded).decode_utf8_lossy().into_owned()
}

/// Renders an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn fmt_http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

/// Parses any of the three HTTP date formats. Invalid dates yield `None`,
/// which callers treat as an absent header (RFC 9110 §13.1.3).
pub fn parse_http_date(s: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(s.trim()).ok()
}

/// Renders an RFC 3339 timestamp with second precision, as used in Atom
/// `updated` elements.
pub fn fmt_rfc3339(time: SystemTime) -> String {
    humantime::format_rfc3339_seconds(time).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quoted_if_not_token("next"), "next");
        assert_eq!(quoted_if_not_token("two words"), "\"two words\"");
        assert_eq!(unquote("\"a \\\"b\\\"\""), "a \"b\"");
        assert_eq!(unquote("plain"), "plain");
    }

    #[test]
    fn ext_values() {
        assert!(needs_ext_value("caf\u{e9}"));
        assert!(!needs_ext_value("cafe"));
        let encoded = encode_ext_value("caf\u{e9} bar");
        assert_eq!(encoded, "UTF-8''caf%C3%A9%20bar");
        assert_eq!(decode_ext_value(&encoded), "caf\u{e9} bar");
        assert_eq!(decode_ext_value("UTF-8'en'x%20y"), "x y");
    }

    #[test]
    fn http_dates_round_trip_to_the_second() {
        let parsed = parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(fmt_http_date(parsed), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(fmt_rfc3339(parsed), "1994-11-06T08:49:37Z");
        assert!(parse_http_date("yesterday").is_none());
    }
}
