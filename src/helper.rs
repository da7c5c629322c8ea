//! Stock responses and small request utilities shared by processors and
//! adapters.

use std::borrow::Cow;
use std::time::{SystemTime, UNIX_EPOCH};

use http::StatusCode;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::debug;

use crate::headers::{self, Preference};
use crate::method::Method;
use crate::request::RequestContext;
use crate::response::{ContentType, ResponseContext};
use crate::target::TargetType;

/// Namespace of the error document.
pub const ERROR_NS: &str = "http://abdera.apache.org";

/// Escapes the five XML special characters.
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// A response carrying the standard error document:
///
/// ```xml
/// <error xmlns="http://abdera.apache.org"><code>404</code><message>Not Found</message></error>
/// ```
pub fn error_response(status: StatusCode, reason: impl Into<String>) -> ResponseContext {
    let reason = reason.into();
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <error xmlns=\"{ERROR_NS}\"><code>{}</code><message>{}</message></error>",
        status.as_u16(),
        escape(&reason),
    );
    ResponseContext::builder()
        .status(status)
        .status_text(reason)
        .bytes(ContentType::Xml, body)
}

fn reason_or_default(status: StatusCode, reason: &str) -> String {
    if reason.is_empty() {
        status.canonical_reason().unwrap_or_default().to_owned()
    } else {
        reason.to_owned()
    }
}

fn stock(status: StatusCode, reason: &str) -> ResponseContext {
    let reason = reason_or_default(status, reason);
    debug!(status = status.as_u16(), reason = %reason, "error response");
    error_response(status, reason)
}

pub fn server_error(reason: &str) -> ResponseContext { stock(StatusCode::INTERNAL_SERVER_ERROR, reason) }
pub fn unauthorized(reason: &str) -> ResponseContext { stock(StatusCode::UNAUTHORIZED, reason) }
pub fn forbidden(reason: &str) -> ResponseContext { stock(StatusCode::FORBIDDEN, reason) }
pub fn not_found(reason: &str) -> ResponseContext { stock(StatusCode::NOT_FOUND, reason) }
pub fn bad_request(reason: &str) -> ResponseContext { stock(StatusCode::BAD_REQUEST, reason) }
pub fn conflict(reason: &str) -> ResponseContext { stock(StatusCode::CONFLICT, reason) }
pub fn payload_too_large(reason: &str) -> ResponseContext { stock(StatusCode::PAYLOAD_TOO_LARGE, reason) }
pub fn unavailable(reason: &str) -> ResponseContext { stock(StatusCode::SERVICE_UNAVAILABLE, reason) }
pub fn precondition_failed(reason: &str) -> ResponseContext { stock(StatusCode::PRECONDITION_FAILED, reason) }
pub fn not_supported(reason: &str) -> ResponseContext { stock(StatusCode::UNSUPPORTED_MEDIA_TYPE, reason) }
pub fn not_acceptable(reason: &str) -> ResponseContext { stock(StatusCode::NOT_ACCEPTABLE, reason) }
pub fn locked(reason: &str) -> ResponseContext { stock(StatusCode::LOCKED, reason) }

/// 405 with `Allow` listing `methods`.
pub fn not_allowed(methods: &[Method]) -> ResponseContext {
    let mut response = stock(StatusCode::METHOD_NOT_ALLOWED, "");
    let allow = methods.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
    response.set_header(http::header::ALLOW, &allow);
    response
}

/// 405 for the request's target type.
pub fn not_allowed_for(request: &RequestContext) -> ResponseContext {
    not_allowed(default_methods_for(request))
}

pub fn not_modified() -> ResponseContext {
    ResponseContext::status_only(StatusCode::NOT_MODIFIED)
}

pub fn no_content() -> ResponseContext {
    ResponseContext::status_only(StatusCode::NO_CONTENT)
}

/// `200` with `Allow` listing `methods`, the answer to `OPTIONS`.
pub fn options(methods: &[Method]) -> ResponseContext {
    ResponseContext::builder().allow(methods).no_body()
}

/// Methods a target type supports out of the box, in alphabetical order.
pub fn default_methods(target_type: &TargetType) -> &'static [Method] {
    use Method::*;
    match target_type {
        TargetType::Collection => &[Get, Head, Options, Post],
        TargetType::Entry | TargetType::Media => &[Delete, Get, Head, Options, Post, Put],
        _ => &[Get, Head, Options],
    }
}

/// [`default_methods`] for the request's target; a request without a target
/// supports nothing.
pub fn default_methods_for(request: &RequestContext) -> &'static [Method] {
    request.target().map(|t| default_methods(t.target_type())).unwrap_or(&[])
}

// ── Paging ────────────────────────────────────────────────────────────────────

/// Page size from query parameter `param`, clamped to `0..=default`.
/// Missing or unparseable values yield `default`.
pub fn page_size(request: &RequestContext, param: &str, default: usize) -> usize {
    let size = request
        .parameter(param)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map_or(default, |ps| usize::try_from(ps.max(0)).unwrap_or(0).min(default));
    debug!(size, "page size");
    size
}

/// Offset of page `param` (1-based) for pages of `page_size` items.
pub fn offset(request: &RequestContext, param: &str, page_size: usize) -> usize {
    let page = request
        .parameter(param)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(1)
        .max(1);
    let offset = usize::try_from(page - 1).unwrap_or(0).saturating_mul(page_size);
    debug!(offset, "offset");
    offset
}

// ── Slugs ─────────────────────────────────────────────────────────────────────

/// Everything but the RFC 3986 unreserved set.
const RESERVED: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

/// Makes `slug` safe as a path segment: whitespace runs become `_` and
/// everything outside the unreserved set is percent-encoded.
pub fn sanitize_slug(slug: &str) -> String {
    let joined = slug.split_whitespace().collect::<Vec<_>>().join("_");
    let out = utf8_percent_encode(&joined, RESERVED).to_string();
    debug!(slug, sanitized = %out, "sanitized slug");
    out
}

/// Like [`sanitize_slug`], but characters outside the unreserved set are
/// replaced by `filler` (dropped when it is empty), and the result is
/// optionally lower-cased.
pub fn sanitize_slug_with(slug: &str, filler: &str, lower: bool) -> String {
    let slug = if lower { slug.to_lowercase() } else { slug.to_owned() };
    let mut out = String::with_capacity(slug.len());
    let mut in_space = false;
    for c in slug.trim().chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if is_unreserved(c) {
            out.push(c);
        } else {
            out.push_str(filler);
        }
    }
    out
}

// ── Misc ──────────────────────────────────────────────────────────────────────

fn epoch_seconds(time: SystemTime) -> i128 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => i128::from(d.as_secs()),
        Err(e) => -i128::from(e.duration().as_secs()) - i128::from(e.duration().subsec_nanos() > 0),
    }
}

/// `a <= b` ignoring sub-second precision, as HTTP dates carry none.
pub fn before_or_equal(a: SystemTime, b: SystemTime) -> bool {
    epoch_seconds(a) <= epoch_seconds(b)
}

/// Joins header values with `, `.
pub fn combine<S: AsRef<str>>(values: &[S]) -> String {
    values.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}

// ── Content negotiation ───────────────────────────────────────────────────────

/// Media ranges from `Accept`, most preferred first. Ranges with `q=0` are
/// left out.
pub fn acceptable_types(request: &RequestContext) -> Vec<String> {
    request
        .accept()
        .map(|accept| {
            headers::order_by_q(&accept)
                .into_iter()
                .filter(|t| t.is_acceptable())
                .map(|t| t.token().to_owned())
                .collect()
        })
        .unwrap_or_default()
}

/// True if the client ranks media type `a` strictly above `b`.
pub fn is_preferred(request: &RequestContext, a: &str, b: &str) -> bool {
    let accepts = acceptable_types(request);
    let rank = |t: &str| {
        accepts.iter().position(|range| headers::media_type_matches(range, t)).unwrap_or(accepts.len())
    };
    rank(a) < rank(b)
}

/// The offered media type the client prefers. Without an `Accept` header
/// the first offer wins; `None` means nothing offered is acceptable.
pub fn negotiate<'a>(request: &RequestContext, offered: &[&'a str]) -> Option<&'a str> {
    if request.accept().is_none() {
        return offered.first().copied();
    }
    acceptable_types(request).iter().find_map(|range| {
        offered.iter().copied().find(|t| headers::media_type_matches(range, t))
    })
}

/// True if the request body is declared as Atom.
pub fn is_atom(request: &RequestContext) -> bool {
    request.content_type().is_some_and(headers::is_atom)
}

/// True if the client asked for no content in the response, in either the
/// draft (`return-no-content`) or final (`return=minimal`) form.
pub fn prefer_return_no_content(request: &RequestContext) -> bool {
    request.prefer().iter().any(|p| {
        p.matches(Preference::RETURN_NO_CONTENT)
            || (p.matches(Preference::RETURN) && p.value().is_some_and(|v| v.eq_ignore_ascii_case("minimal")))
    })
}
