//! Incoming request context.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Extensions, Uri};
use percent_encoding::percent_decode_str;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::error::{Error, Result};
use crate::headers::{self, CacheControl, EntityTag, Preference, WebLink};
use crate::method::Method;
use crate::route_manager::RouteManager;
use crate::target::Target;

/// The authenticated party a request acts for.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Subject {
    principal: Option<String>,
}

impl Subject {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn new(principal: impl Into<String>) -> Self {
        Self { principal: Some(principal.into()) }
    }

    pub fn principal(&self) -> Option<&str> { self.principal.as_deref() }

    pub fn is_anonymous(&self) -> bool {
        self.principal.is_none()
    }
}

/// One incoming request, fully buffered, plus everything the provider
/// learns about it on the way through: its [`Target`], its [`Subject`] and
/// any attributes filters attach.
pub struct RequestContext {
    method: http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    context_path: String,
    target_path: String,
    base_uri: String,
    target: Option<Target>,
    subject: Option<Subject>,
    principal: Option<String>,
    attributes: Extensions,
    routes: Option<Arc<RouteManager>>,
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::default()
    }

    /// Wraps a buffered hyper request. `context_path` is the prefix the
    /// provider is mounted on; it is stripped from the target path.
    pub fn from_http(
        request: http::Request<Bytes>,
        context_path: &str,
        remote_addr: Option<SocketAddr>,
    ) -> Self {
        let (parts, body) = request.into_parts();
        Self::assemble(parts.method, parts.uri, parts.headers, body, context_path, remote_addr, None)
    }

    fn assemble(
        method: http::Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
        context_path: &str,
        remote_addr: Option<SocketAddr>,
        principal: Option<String>,
    ) -> Self {
        let context_path = normalize_context_path(context_path);
        let full = uri.path_and_query().map_or("/", |pq| pq.as_str());
        let target_path = match full.strip_prefix(context_path.as_str()) {
            Some("") => "/".to_owned(),
            Some(rest) if rest.starts_with('/') => rest.to_owned(),
            // `/atom?x` and `/atom;x` address the mount root.
            Some(rest) if rest.starts_with(['?', ';']) => format!("/{rest}"),
            _ => full.to_owned(),
        };
        let base_uri = base_uri(&uri, &headers);
        Self {
            method,
            uri,
            headers,
            body,
            remote_addr,
            context_path,
            target_path,
            base_uri,
            target: None,
            subject: None,
            principal,
            attributes: Extensions::new(),
            routes: None,
        }
    }

    pub fn method(&self) -> &http::Method { &self.method }

    /// The method as one the processors dispatch on, `None` for extension
    /// methods.
    pub fn known_method(&self) -> Option<Method> {
        Method::from_http(&self.method)
    }

    pub fn set_method(&mut self, method: http::Method) {
        self.method = method;
    }

    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// The body as UTF-8 text. Invalid UTF-8 is a 400.
    pub fn body_text(&self) -> Result<&str> {
        std::str::from_utf8(&self.body)
            .map_err(|_| Error::http(http::StatusCode::BAD_REQUEST, "request body is not valid UTF-8"))
    }

    /// The path prefix the provider is mounted on, without a trailing `/`.
    pub fn context_path(&self) -> &str { &self.context_path }

    /// Everything after the context path, query included.
    pub fn target_path(&self) -> &str { &self.target_path }

    /// `scheme://host` the client used to reach us.
    pub fn base_uri(&self) -> &str { &self.base_uri }

    /// The full request URI as the client saw it.
    pub fn resolved_uri(&self) -> String {
        let pq = self.uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("{}{pq}", self.base_uri)
    }

    pub fn target(&self) -> Option<&Target> { self.target.as_ref() }

    pub fn set_target(&mut self, target: Option<Target>) {
        self.target = target;
    }

    pub fn subject(&self) -> Option<&Subject> { self.subject.as_ref() }

    pub fn set_subject(&mut self, subject: Option<Subject>) {
        self.subject = subject;
    }

    /// The principal established upstream (e.g. by an authenticating proxy
    /// or filter).
    pub fn principal(&self) -> Option<&str> { self.principal.as_deref() }

    pub fn set_principal(&mut self, principal: Option<String>) {
        self.principal = principal;
    }

    /// Typed per-request attributes.
    pub fn attributes(&self) -> &Extensions { &self.attributes }
    pub fn attributes_mut(&mut self) -> &mut Extensions { &mut self.attributes }

    pub(crate) fn set_routes(&mut self, routes: Arc<RouteManager>) {
        self.routes = Some(routes);
    }

    /// A target variable, or failing that the first query parameter of that
    /// name.
    pub fn parameter(&self, name: &str) -> Option<Cow<'_, str>> {
        if let Some(value) = self.target.as_ref().and_then(|t| t.parameter(name)) {
            return Some(Cow::Borrowed(value));
        }
        self.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Every query value for `name`, in order.
    pub fn parameters(&self, name: &str) -> Vec<String> {
        self.query_pairs().filter(|(k, _)| k == name).map(|(_, v)| v.into_owned()).collect()
    }

    fn query_pairs(&self) -> form_urlencoded::Parse<'_> {
        form_urlencoded::parse(self.uri.query().unwrap_or_default().as_bytes())
    }

    // ── Headers ──────────────────────────────────────────────────────────────

    /// The first value of `name`, if it is visible ASCII.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of `name`, in order.
    pub fn header_values(&self, name: impl header::AsHeaderName) -> Vec<&str> {
        self.headers.get_all(name).iter().filter_map(|v| v.to_str().ok()).collect()
    }

    fn joined(&self, name: HeaderName) -> Option<String> {
        let values = self.header_values(name);
        (!values.is_empty()).then(|| values.join(", "))
    }

    pub fn accept(&self) -> Option<String> {
        self.joined(header::ACCEPT)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH).and_then(|v| v.trim().parse().ok())
    }

    /// The `Slug` header, percent-decoded (RFC 5023 §9.7).
    pub fn slug(&self) -> Option<String> {
        self.header("slug")
            .map(|s| percent_decode_str(s.trim()).decode_utf8_lossy().into_owned())
            .filter(|s| !s.is_empty())
    }

    /// `If-Match` tags. A malformed header yields an empty list, which can
    /// never match.
    pub fn if_match(&self) -> Option<Vec<EntityTag>> {
        self.entity_tags(header::IF_MATCH)
    }

    /// `If-None-Match` tags. A malformed header yields an empty list.
    pub fn if_none_match(&self) -> Option<Vec<EntityTag>> {
        self.entity_tags(header::IF_NONE_MATCH)
    }

    fn entity_tags(&self, name: HeaderName) -> Option<Vec<EntityTag>> {
        let value = self.joined(name)?;
        match EntityTag::parse_list(&value) {
            Ok(tags) => Some(tags),
            Err(e) => {
                debug!("ignoring malformed entity tags: {e}");
                Some(Vec::new())
            }
        }
    }

    pub fn if_modified_since(&self) -> Option<SystemTime> {
        self.header(header::IF_MODIFIED_SINCE).and_then(headers::parse_http_date)
    }

    pub fn if_unmodified_since(&self) -> Option<SystemTime> {
        self.header(header::IF_UNMODIFIED_SINCE).and_then(headers::parse_http_date)
    }

    pub fn cache_control(&self) -> Option<CacheControl> {
        let value = self.joined(header::CACHE_CONTROL)?;
        value.parse().map_err(|e| debug!("ignoring malformed Cache-Control: {e}")).ok()
    }

    /// Every preference across all `Prefer` headers.
    pub fn prefer(&self) -> Vec<Preference> {
        self.header_values("prefer").into_iter().flat_map(Preference::parse).collect()
    }

    pub fn prefers(&self, token: &str) -> bool {
        Preference::contains(&self.prefer(), token)
    }

    /// Links from every `Link` header. Malformed headers are skipped.
    pub fn links(&self) -> Vec<WebLink> {
        self.header_values(header::LINK)
            .into_iter()
            .filter_map(|v| WebLink::parse(v).map_err(|e| debug!("ignoring malformed Link: {e}")).ok())
            .flatten()
            .collect()
    }

    pub fn authorization(&self) -> Option<&str> {
        self.header(header::AUTHORIZATION)
    }

    // ── URL building ─────────────────────────────────────────────────────────

    /// Context-relative URL for the route named `key`. Variables missing
    /// from `params` are taken from this request's target.
    pub fn url_for(&self, key: &str, params: &[(&str, &str)]) -> Option<String> {
        self.routes.as_ref()?.url_for(self, key, params)
    }

    pub fn absolute_url_for(&self, key: &str, params: &[(&str, &str)]) -> Option<String> {
        self.routes.as_ref()?.absolute_url_for(self, key, params)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("context_path", &self.context_path)
            .field("target_path", &self.target_path)
            .field("target", &self.target)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

fn normalize_context_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed {
        "" => String::new(),
        p if p.starts_with('/') => p.to_owned(),
        p => format!("/{p}"),
    }
}

fn base_uri(uri: &Uri, headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let scheme = forwarded.or_else(|| uri.scheme_str()).unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

/// Builds a [`RequestContext`] piece by piece.
#[derive(Default)]
pub struct RequestContextBuilder {
    method: http::Method,
    uri: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    context_path: String,
    remote_addr: Option<SocketAddr>,
    principal: Option<String>,
    target: Option<Target>,
}

impl RequestContextBuilder {
    pub fn method(mut self, method: http::Method) -> Self {
        self.method = method;
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are
    /// dropped with a warning.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "dropping invalid request header"),
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into();
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn target(mut self, target: Target) -> Self {
        self.target = Some(target);
        self
    }

    /// An unparseable URI falls back to `/`.
    pub fn build(self) -> RequestContext {
        let uri = self
            .uri
            .and_then(|u| u.parse::<Uri>().map_err(|e| warn!("invalid request uri: {e}")).ok())
            .unwrap_or_default();
        let mut request = RequestContext::assemble(
            self.method,
            uri,
            self.headers,
            self.body,
            &self.context_path,
            self.remote_addr,
            self.principal,
        );
        request.target = self.target;
        request
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::target::TargetType;

    #[test]
    fn strips_the_context_path() {
        let req = RequestContext::builder().uri("/app/feed/1?x=2").context_path("/app/").build();
        assert_eq!(req.context_path(), "/app");
        assert_eq!(req.target_path(), "/feed/1?x=2");

        let root = RequestContext::builder().uri("/app").context_path("/app").build();
        assert_eq!(root.target_path(), "/");
        let query = RequestContext::builder().uri("/app?lang=en").context_path("/app").build();
        assert_eq!(query.target_path(), "/?lang=en");
        let matrix = RequestContext::builder().uri("/app;x").context_path("/app").build();
        assert_eq!(matrix.target_path(), "/;x");

        let unmounted = RequestContext::builder().uri("/feed").build();
        assert_eq!(unmounted.context_path(), "");
        assert_eq!(unmounted.target_path(), "/feed");
    }

    #[test]
    fn base_uri_honours_forwarded_proto() {
        let req = RequestContext::builder()
            .uri("/feed")
            .header("host", "example.org")
            .header("x-forwarded-proto", "https")
            .build();
        assert_eq!(req.base_uri(), "https://example.org");
        assert_eq!(req.resolved_uri(), "https://example.org/feed");
        assert_eq!(RequestContext::builder().uri("/").build().base_uri(), "http://localhost");
    }

    #[test]
    fn parameters_prefer_target_variables() {
        let mut params = HashMap::new();
        params.insert("entry".to_owned(), "from-path".to_owned());
        let req = RequestContext::builder()
            .uri("/feed/x?entry=from-query&page=2&tag=a&tag=b%20c")
            .target(Target::new(TargetType::Entry, "/feed/x").with_params(params))
            .build();
        assert_eq!(req.parameter("entry").as_deref(), Some("from-path"));
        assert_eq!(req.parameter("page").as_deref(), Some("2"));
        assert_eq!(req.parameters("tag"), vec!["a", "b c"]);
        assert!(req.parameter("missing").is_none());
    }

    #[test]
    fn typed_headers() {
        let req = RequestContext::builder()
            .method(http::Method::PUT)
            .uri("/feed/1")
            .header("slug", "Hello%20World")
            .header("if-match", "\"a\", W/\"b\"")
            .header("if-none-match", "garbage")
            .header("if-modified-since", "Sun, 06 Nov 1994 08:49:37 GMT")
            .header("cache-control", "no-cache, max-age=5")
            .header("prefer", "return-no-content")
            .header("link", "</x>; rel=related")
            .header("content-length", "12")
            .build();
        assert_eq!(req.known_method(), Some(Method::Put));
        assert_eq!(req.slug().as_deref(), Some("Hello World"));
        assert_eq!(req.if_match().map(|t| t.len()), Some(2));
        assert_eq!(req.if_none_match(), Some(Vec::new()));
        assert!(req.if_modified_since().is_some());
        assert!(req.if_unmodified_since().is_none());
        assert_eq!(req.cache_control().and_then(|cc| cc.max_age), Some(5));
        assert!(req.prefers("return-no-content"));
        assert!(req.links()[0].has_rel("related"));
        assert_eq!(req.content_length(), Some(12));
        assert!(req.authorization().is_none());
    }

    #[test]
    fn invalid_utf8_bodies_are_bad_requests() {
        let req = RequestContext::builder().body(vec![0xff, 0xfe]).build();
        let err = req.body_text().unwrap_err();
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }
}
