//! Outgoing response type and the [`IntoResponse`] conversion trait.
//!
//! Adapters build a [`ResponseContext`] with [`ResponseContext::builder`]:
//! typed setters for the caching, linking and AtomPub headers, terminated by
//! a body method.
//!
//! ```rust
//! use abdera::{ContentType, EntityTag, ResponseContext};
//! use http::StatusCode;
//!
//! let response = ResponseContext::builder()
//!     .status(StatusCode::CREATED)
//!     .location("http://example.org/posts/hello")
//!     .entity_tag(&EntityTag::strong("1"))
//!     .bytes(ContentType::AtomEntry, "<entry xmlns=\"http://www.w3.org/2005/Atom\"/>");
//! assert_eq!(response.status(), StatusCode::CREATED);
//! ```

use std::time::SystemTime;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use tracing::warn;

use crate::headers::{self, CacheControl, EntityTag, Preference, WebLink};
use crate::method::Method;

/// Characters escaped in an outgoing `Slug`: controls (CR and LF among
/// them) and `%` itself. Non-ASCII is always escaped.
const SLUG: &AsciiSet = &CONTROLS.add(b'%');

// ── ContentType ───────────────────────────────────────────────────────────────

/// Media types an AtomPub server commonly sends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Atom,           // application/atom+xml
    AtomEntry,      // application/atom+xml;type=entry
    AtomFeed,       // application/atom+xml;type=feed
    AtomService,    // application/atomsvc+xml
    AtomCategories, // application/atomcat+xml
    Html,           // text/html; charset=utf-8
    Json,           // application/json
    OctetStream,    // application/octet-stream
    Text,           // text/plain; charset=utf-8
    Xml,            // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atom           => "application/atom+xml",
            Self::AtomEntry      => "application/atom+xml;type=entry",
            Self::AtomFeed       => "application/atom+xml;type=feed",
            Self::AtomService    => "application/atomsvc+xml",
            Self::AtomCategories => "application/atomcat+xml",
            Self::Html           => "text/html; charset=utf-8",
            Self::Json           => "application/json",
            Self::OctetStream    => "application/octet-stream",
            Self::Text           => "text/plain; charset=utf-8",
            Self::Xml            => "application/xml",
        }
    }
}

// ── ResponseContext ───────────────────────────────────────────────────────────

/// An outgoing response: status, optional status text, headers and a fully
/// buffered body.
#[derive(Clone, Debug)]
pub struct ResponseContext {
    status: StatusCode,
    status_text: Option<String>,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseContext {
    /// Builder defaulting to `200 OK`.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { status: StatusCode::OK, status_text: None, headers: HeaderMap::new() }
    }

    /// A bodiless response with the given status.
    pub fn status_only(status: StatusCode) -> Self {
        Self::builder().status(status).no_body()
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn status_text(&self) -> Option<&str> { self.status_text.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    pub fn location(&self) -> Option<&str> {
        self.header(header::LOCATION)
    }

    pub fn entity_tag(&self) -> Option<EntityTag> {
        self.header(header::ETAG).and_then(|v| v.parse().ok())
    }

    pub fn last_modified(&self) -> Option<SystemTime> {
        self.header(header::LAST_MODIFIED).and_then(headers::parse_http_date)
    }

    pub fn cache_control(&self) -> Option<CacheControl> {
        self.header(header::CACHE_CONTROL).and_then(|v| v.parse().ok())
    }

    pub fn links(&self) -> Vec<WebLink> {
        self.headers
            .get_all(header::LINK)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| WebLink::parse(v).ok())
            .flatten()
            .collect()
    }

    /// True if the response carries a body.
    pub fn has_entity(&self) -> bool {
        !self.body.is_empty()
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) {
        self.status_text = Some(text.into());
    }

    /// Replaces every value of `name`. Invalid values are dropped with a
    /// warning.
    pub fn set_header(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => warn!(header = %name, "dropping invalid response header value"),
        }
    }

    pub fn remove_header(&mut self, name: HeaderName) {
        self.headers.remove(name);
    }

    /// Drops the body, keeping `Content-Length` of the representation.
    pub fn without_body(mut self) -> Self {
        if !self.headers.contains_key(header::CONTENT_LENGTH) && !self.body.is_empty() {
            self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        self.body = Bytes::new();
        self
    }

    /// Converts into the hyper response type, setting `Content-Length` when
    /// the response does not already carry one.
    pub fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut headers = self.headers;
        if !headers.contains_key(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        }
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`ResponseContext`].
///
/// Header setters that receive a value which cannot appear in an HTTP
/// header log a warning and leave the header unset.
pub struct ResponseBuilder {
    status: StatusCode,
    status_text: Option<String>,
    headers: HeaderMap,
}

impl ResponseBuilder {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    /// Sets `name`, replacing earlier values.
    pub fn header(mut self, name: HeaderName, value: &str) -> Self {
        if let Some(value) = valid(&name, value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Appends a value for `name`, keeping earlier ones.
    pub fn add_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Some(value) = valid(&name, value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn entity_tag(self, tag: &EntityTag) -> Self {
        self.header(header::ETAG, &tag.to_string())
    }

    pub fn cache_control(self, cc: &CacheControl) -> Self {
        self.header(header::CACHE_CONTROL, &cc.to_string())
    }

    pub fn no_cache(self) -> Self {
        self.cache_control(&CacheControl::no_cache())
    }

    /// `max-age=seconds`, or `no-cache` when `seconds` is zero.
    pub fn max_age(self, seconds: u64) -> Self {
        if seconds == 0 {
            self.no_cache()
        } else {
            self.cache_control(&CacheControl::max_age(seconds))
        }
    }

    pub fn last_modified(self, time: SystemTime) -> Self {
        self.header(header::LAST_MODIFIED, &headers::fmt_http_date(time))
    }

    pub fn expires(self, time: SystemTime) -> Self {
        self.header(header::EXPIRES, &headers::fmt_http_date(time))
    }

    pub fn age(self, seconds: u64) -> Self {
        self.header(header::AGE, &seconds.to_string())
    }

    pub fn location(self, uri: &str) -> Self {
        self.header(header::LOCATION, uri)
    }

    pub fn content_location(self, uri: &str) -> Self {
        self.header(header::CONTENT_LOCATION, uri)
    }

    pub fn content_language(self, lang: &str) -> Self {
        self.header(header::CONTENT_LANGUAGE, lang)
    }

    /// The `Slug` header, percent-encoded so CR and LF never reach the wire.
    pub fn slug(self, slug: &str) -> Self {
        let encoded = utf8_percent_encode(slug, SLUG).to_string();
        self.header(HeaderName::from_static("slug"), &encoded)
    }

    /// `Allow`, listing `methods` in the order given.
    pub fn allow(self, methods: &[Method]) -> Self {
        let value = methods.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
        self.header(header::ALLOW, &value)
    }

    /// Appends a `Link` header carrying `links`.
    pub fn web_links(self, links: &[WebLink]) -> Self {
        if links.is_empty() {
            return self;
        }
        self.add_header(header::LINK, &WebLink::join(links))
    }

    pub fn web_link(self, link: WebLink) -> Self {
        self.web_links(&[link])
    }

    pub fn prefer(self, prefs: &[Preference]) -> Self {
        self.header(HeaderName::from_static("prefer"), &Preference::join(prefs))
    }

    pub fn preference_applied(self, prefs: &[Preference]) -> Self {
        self.header(HeaderName::from_static("preference-applied"), &Preference::join(prefs))
    }

    /// Terminate with a body of an arbitrary media type.
    pub fn body(self, content_type: &str, body: impl Into<Bytes>) -> ResponseContext {
        self.header(header::CONTENT_TYPE, content_type).finish(body.into())
    }

    /// Terminate with one of the common [`ContentType`]s.
    pub fn bytes(self, content_type: ContentType, body: impl Into<Bytes>) -> ResponseContext {
        self.body(content_type.as_str(), body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> ResponseContext {
        self.bytes(ContentType::Text, body.into())
    }

    /// Terminate with an `application/xml` body.
    pub fn xml(self, body: impl Into<String>) -> ResponseContext {
        self.bytes(ContentType::Xml, body.into())
    }

    /// Terminate with an `application/atom+xml` body.
    pub fn atom(self, body: impl Into<String>) -> ResponseContext {
        self.bytes(ContentType::Atom, body.into())
    }

    /// Terminate with no body (304, 204, 405 ...).
    pub fn no_body(self) -> ResponseContext {
        self.finish(Bytes::new())
    }

    fn finish(self, body: Bytes) -> ResponseContext {
        ResponseContext {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body,
        }
    }
}

fn valid(name: &HeaderName, value: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| warn!(header = %name, "dropping invalid response header value"))
        .ok()
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`ResponseContext`], for plain router handlers.
pub trait IntoResponse {
    fn into_response(self) -> ResponseContext;
}

impl IntoResponse for ResponseContext {
    fn into_response(self) -> ResponseContext { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> ResponseContext { ResponseContext::builder().text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> ResponseContext { ResponseContext::builder().text(self) }
}

/// Return a bare status from a handler: `return StatusCode::NO_CONTENT`.
impl IntoResponse for StatusCode {
    fn into_response(self) -> ResponseContext { ResponseContext::status_only(self) }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn typed_setters() {
        let modified = UNIX_EPOCH + Duration::from_secs(784_111_777);
        let res = ResponseContext::builder()
            .status(StatusCode::CREATED)
            .entity_tag(&EntityTag::weak("v1"))
            .last_modified(modified)
            .max_age(0)
            .allow(&[Method::Get, Method::Head])
            .web_link(WebLink::with_rel("/posts/1", "edit"))
            .preference_applied(&[Preference::new(Preference::RETURN_NO_CONTENT)])
            .no_body();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.header(header::ETAG), Some("W/\"v1\""));
        assert_eq!(res.last_modified(), Some(modified));
        assert_eq!(res.header(header::LAST_MODIFIED), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert_eq!(res.header(header::CACHE_CONTROL), Some("no-cache"));
        assert_eq!(res.header(header::ALLOW), Some("GET, HEAD"));
        assert!(res.links()[0].has_rel("edit"));
        assert_eq!(res.header("preference-applied"), Some("return-no-content"));
        assert!(!res.has_entity());
    }

    #[test]
    fn slug_never_carries_line_breaks() {
        let res = ResponseContext::builder().slug("evil\r\nSet-Cookie: x").no_body();
        assert_eq!(res.header("slug"), Some("evil%0D%0ASet-Cookie: x"));
        let res = ResponseContext::builder().slug("caf\u{e9} 100%").no_body();
        assert_eq!(res.header("slug"), Some("caf%C3%A9 100%25"));
    }

    #[test]
    fn invalid_header_values_are_dropped() {
        let res = ResponseContext::builder().location("/a\nb").no_body();
        assert!(res.location().is_none());
    }

    #[test]
    fn into_inner_sets_content_length() {
        let res = ResponseContext::builder().atom("<feed/>").into_inner();
        assert_eq!(res.headers()[header::CONTENT_LENGTH], "7");
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/atom+xml");
    }

    #[test]
    fn without_body_keeps_the_length() {
        let res = ResponseContext::builder().text("hello").without_body();
        assert!(!res.has_entity());
        assert_eq!(res.header(header::CONTENT_LENGTH), Some("5"));
    }

    #[test]
    fn handler_return_types() {
        assert_eq!(StatusCode::NO_CONTENT.into_response().status(), StatusCode::NO_CONTENT);
        let res = "hi".into_response();
        assert_eq!(res.content_type(), Some("text/plain; charset=utf-8"));
        assert_eq!(res.body().as_ref(), b"hi");
    }
}
