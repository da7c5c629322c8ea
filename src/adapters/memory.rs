//! A complete collection kept in memory.
//!
//! Entries are stored as the Atom documents clients send; the feed wraps
//! them in a generated `atom:feed`. With media enabled, non-Atom POSTs
//! create a media resource plus a generated media-link entry.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::{Entry as Slot, OccupiedEntry};
use futures::FutureExt;
use futures::future::BoxFuture;
use http::StatusCode;
use tracing::{debug, info, warn};

use crate::adapter::{ACCEPT_ENTRY, CollectionAdapter, MediaCollectionAdapter, Transactional};
use crate::conditional;
use crate::config::{CollectionConfig, ProviderConfig};
use crate::error::{Error, Result};
use crate::headers::{self, EntityTag, Preference, WebLink};
use crate::helper::{self, escape};
use crate::request::RequestContext;
use crate::response::{ContentType, ResponseContext};
use crate::workspace::{ATOM_NS, collection_href};

const ATOM: &str = "application/atom+xml";

#[derive(Clone, Debug)]
struct Media {
    content_type: String,
    body: Bytes,
}

#[derive(Clone, Debug)]
struct Member {
    /// The Atom entry document, verbatim.
    entry: String,
    media: Option<Media>,
    updated: SystemTime,
    etag: EntityTag,
    /// Bumped on every write; orders the feed newest first.
    revision: u64,
}

impl Member {
    fn new(name: &str, entry: String, media: Option<Media>, revision: u64) -> Self {
        let etag = member_etag(name, &entry, media.as_ref());
        Self { entry, media, updated: SystemTime::now(), etag, revision }
    }

    fn media_etag(&self) -> EntityTag {
        self.etag.variation("media")
    }
}

fn member_etag(name: &str, entry: &str, media: Option<&Media>) -> EntityTag {
    let media_bytes: &[u8] = media.map_or(&[], |m| m.body.as_ref());
    EntityTag::generate([name.as_bytes(), entry.as_bytes(), media_bytes])
}

/// An entity collection backed by a [`DashMap`].
#[derive(Debug)]
pub struct MemoryCollection {
    href: String,
    title: String,
    accepts: Vec<String>,
    media: bool,
    page_size: usize,
    max_age: u64,
    members: DashMap<String, Member>,
    revision: AtomicU64,
}

impl MemoryCollection {
    pub fn new(href: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            href: href.into().trim_matches('/').to_owned(),
            title: title.into(),
            accepts: Vec::new(),
            media: false,
            page_size: 20,
            max_age: 0,
            members: DashMap::new(),
            revision: AtomicU64::new(0),
        }
    }

    pub fn from_config(collection: &CollectionConfig, provider: &ProviderConfig) -> Self {
        Self::new(collection.href.as_str(), collection.title.as_str())
            .with_accepts(collection.accepts.clone())
            .with_media(collection.media)
            .with_page_size(provider.page_size)
            .with_max_age(provider.max_age)
    }

    /// Accept media resources as well as entries.
    pub fn with_media(mut self, media: bool) -> Self {
        self.media = media;
        self
    }

    pub fn with_accepts(mut self, accepts: Vec<String>) -> Self {
        self.accepts = accepts;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// `max-age` for entry and media responses; 0 sends `no-cache`.
    pub fn with_max_age(mut self, seconds: u64) -> Self {
        self.max_age = seconds;
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn next_revision(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn feed_path(&self, request: &RequestContext) -> String {
        collection_href(request, &self.href)
    }

    fn member_path(&self, request: &RequestContext, name: &str) -> String {
        format!("{}/{name}", self.feed_path(request))
    }

    fn member_name(request: &RequestContext) -> Option<String> {
        request.parameter("entry").map(|n| n.into_owned()).filter(|n| !n.is_empty())
    }

    /// Claims a free resource name derived from the request's `Slug`, or a
    /// generated one. Taken names get a numeric suffix.
    fn insert(&self, request: &RequestContext, build: impl Fn(&str, u64) -> Member) -> (String, Member) {
        let base = request
            .slug()
            .map(|slug| helper::sanitize_slug_with(&slug, "", true))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.generated_name());
        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 { base.clone() } else { format!("{base}-{suffix}") };
            match self.members.entry(name.clone()) {
                Slot::Vacant(slot) => {
                    let member = build(&name, self.next_revision());
                    slot.insert(member.clone());
                    return (name, member);
                }
                Slot::Occupied(_) => suffix += 1,
            }
        }
    }

    fn generated_name(&self) -> String {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_nanos());
        let seed = self.revision.load(Ordering::Relaxed);
        let tag = EntityTag::generate([nanos.to_string(), seed.to_string()]);
        tag.tag().chars().take(16).collect()
    }

    fn edit_links(&self, request: &RequestContext, name: &str, member: &Member) -> Vec<WebLink> {
        let edit = self.member_path(request, name);
        let mut links = vec![WebLink::with_rel(edit.as_str(), "edit")];
        if member.media.is_some() {
            links.push(WebLink::with_rel(format!("{edit};media"), "edit-media"));
        }
        links
    }

    fn entry_response(&self, request: &RequestContext, name: &str, member: &Member, status: StatusCode) -> ResponseContext {
        let builder = ResponseContext::builder()
            .status(status)
            .entity_tag(&member.etag)
            .last_modified(member.updated)
            .web_links(&self.edit_links(request, name, member));
        if status == StatusCode::CREATED {
            let location = format!("{}{}", request.base_uri(), self.member_path(request, name));
            let builder = builder.location(&location).content_location(&location);
            return match applied_no_content(request) {
                Some(pref) => builder.preference_applied(&[pref]).no_body(),
                None => builder.bytes(ContentType::AtomEntry, member.entry.clone()),
            };
        }
        let builder = builder.max_age(self.max_age);
        let minimal = if request.method() == http::Method::PUT { applied_no_content(request) } else { None };
        match minimal {
            Some(pref) => builder.status(StatusCode::NO_CONTENT).preference_applied(&[pref]).no_body(),
            None => builder.bytes(ContentType::AtomEntry, member.entry.clone()),
        }
    }

    fn feed_document(&self, request: &RequestContext, page: &[(String, Member)], updated: SystemTime) -> String {
        let feed = format!("{}{}", request.base_uri(), self.feed_path(request));
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
        let _ = write!(
            out,
            "<feed xmlns=\"{ATOM_NS}\"><id>{id}</id><title type=\"text\">{title}</title>\
             <updated>{updated}</updated><link rel=\"self\" href=\"{id}\"/>",
            id = escape(&feed),
            title = escape(&self.title),
            updated = headers::fmt_rfc3339(updated),
        );
        for (_, member) in page {
            out.push_str(strip_declaration(&member.entry));
        }
        out.push_str("</feed>");
        out
    }

    fn media_link_entry(&self, request: &RequestContext, name: &str, content_type: &str, title: &str) -> String {
        let edit = self.member_path(request, name);
        format!(
            "<entry xmlns=\"{ATOM_NS}\"><id>{id}</id><title type=\"text\">{title}</title>\
             <updated>{updated}</updated><summary type=\"text\"/>\
             <content type=\"{ct}\" src=\"{edit};media\"/>\
             <link rel=\"edit\" href=\"{edit}\"/><link rel=\"edit-media\" href=\"{edit};media\"/></entry>",
            id = escape(&format!("{}{edit}", request.base_uri())),
            title = escape(title),
            updated = headers::fmt_rfc3339(SystemTime::now()),
            ct = escape(content_type),
            edit = escape(&edit),
        )
    }

    fn read_entry(&self, request: &RequestContext) -> Result<String> {
        if !helper::is_atom(request) {
            return Err(Error::response(helper::not_supported("expected an Atom entry")));
        }
        let body = request.body_text()?.trim();
        if !body.contains("<entry") {
            return Err(Error::response(helper::bad_request("body is not an Atom entry")));
        }
        Ok(body.to_owned())
    }

    fn find(&self, request: &RequestContext) -> Result<(String, Member)> {
        let name = Self::member_name(request).ok_or_else(|| Error::response(helper::not_found("")))?;
        let member = self.members.get(&name).map(|m| m.clone());
        match member {
            Some(member) => Ok((name, member)),
            None => Err(Error::response(helper::not_found(""))),
        }
    }

    fn get_feed_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        if helper::negotiate(request, &[ATOM]).is_none() {
            return Ok(helper::not_acceptable(""));
        }
        let mut members: Vec<(String, Member)> =
            self.members.iter().map(|r| (r.key().clone(), r.value().clone())).collect();
        members.sort_by(|a, b| b.1.revision.cmp(&a.1.revision));

        let etag = EntityTag::generate(members.iter().map(|(_, m)| m.etag.tag().to_owned()));
        let updated = members.iter().map(|(_, m)| m.updated).max().unwrap_or(UNIX_EPOCH);
        if let Some(response) = conditional::evaluate(request, Some(&etag), Some(updated)) {
            return Ok(response);
        }

        let size = helper::page_size(request, "count", self.page_size);
        let offset = helper::offset(request, "page", size);
        let page_no = if size == 0 { 1 } else { (offset / size).saturating_add(1) };
        let page: Vec<(String, Member)> = members.iter().skip(offset).take(size).cloned().collect();

        let feed = self.feed_path(request);
        let page_link = |n: usize, rel: &str| WebLink::with_rel(format!("{feed}?page={n}&count={size}"), rel);
        let mut links = vec![page_link(1, "first")];
        if page_no > 1 {
            links.push(page_link(page_no - 1, "previous"));
        }
        if size > 0 && offset.saturating_add(size) < members.len() {
            links.push(page_link(page_no + 1, "next"));
        }

        debug!(collection = %self.href, total = members.len(), offset, size, "feed page");
        Ok(ResponseContext::builder()
            .entity_tag(&etag)
            .last_modified(updated)
            .no_cache()
            .web_links(&links)
            .bytes(ContentType::AtomFeed, self.feed_document(request, &page, updated)))
    }

    fn post_entry_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        let entry = self.read_entry(request)?;
        let (name, member) = self.insert(request, |name, revision| Member::new(name, entry.clone(), None, revision));
        info!(collection = %self.href, name, "entry created");
        Ok(self.entry_response(request, &name, &member, StatusCode::CREATED))
    }

    fn get_entry_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        let (name, member) = self.find(request)?;
        if let Some(response) = conditional::evaluate(request, Some(&member.etag), Some(member.updated)) {
            return Ok(response);
        }
        if helper::negotiate(request, &[ATOM]).is_none() {
            return Ok(helper::not_acceptable(""));
        }
        Ok(self.entry_response(request, &name, &member, StatusCode::OK))
    }

    /// The member's map slot, locked until dropped so that precondition
    /// checks and the write that follows see the same revision.
    fn occupied(&self, request: &RequestContext) -> Result<(String, OccupiedEntry<'_, String, Member>)> {
        let name = Self::member_name(request).ok_or_else(|| Error::response(helper::not_found("")))?;
        match self.members.entry(name.clone()) {
            Slot::Occupied(slot) => Ok((name, slot)),
            Slot::Vacant(_) => Err(Error::response(helper::not_found(""))),
        }
    }

    fn put_entry_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        let (name, mut slot) = self.occupied(request)?;
        let entry = self.read_entry(request)?;
        let current = slot.get();
        if let Some(response) = conditional::evaluate(request, Some(&current.etag), Some(current.updated)) {
            return Ok(response);
        }
        let member = Member::new(&name, entry, current.media.clone(), self.next_revision());
        slot.insert(member.clone());
        drop(slot);
        info!(collection = %self.href, name, "entry updated");
        Ok(self.entry_response(request, &name, &member, StatusCode::OK))
    }

    fn delete_entry_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        let (name, slot) = self.occupied(request)?;
        let current = slot.get();
        if let Some(response) = conditional::evaluate(request, Some(&current.etag), Some(current.updated)) {
            return Ok(response);
        }
        slot.remove();
        info!(collection = %self.href, name, "entry deleted");
        Ok(helper::no_content())
    }

    fn post_media_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        let Some(content_type) = request.content_type().map(str::to_owned) else {
            return Ok(helper::not_supported("media resources need a Content-Type"));
        };
        let title = request.slug().unwrap_or_default();
        let media = Media { content_type: content_type.clone(), body: request.body().clone() };
        let (name, member) = self.insert(request, |name, revision| {
            let title = if title.is_empty() { name } else { title.as_str() };
            let entry = self.media_link_entry(request, name, &content_type, title);
            Member::new(name, entry, Some(media.clone()), revision)
        });
        info!(collection = %self.href, name, bytes = request.body().len(), "media created");
        Ok(self.entry_response(request, &name, &member, StatusCode::CREATED))
    }

    fn get_media_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        let (_, member) = self.find(request)?;
        let Some(media) = &member.media else {
            return Ok(helper::not_found("entry has no media resource"));
        };
        let etag = member.media_etag();
        if let Some(response) = conditional::evaluate(request, Some(&etag), Some(member.updated)) {
            return Ok(response);
        }
        Ok(ResponseContext::builder()
            .entity_tag(&etag)
            .last_modified(member.updated)
            .max_age(self.max_age)
            .body(&media.content_type, media.body.clone()))
    }

    fn put_media_now(&self, request: &RequestContext) -> Result<ResponseContext> {
        let (name, mut slot) = self.occupied(request)?;
        let current = slot.get();
        let Some(previous) = &current.media else {
            return Ok(helper::not_found("entry has no media resource"));
        };
        if let Some(response) = conditional::evaluate(request, Some(&current.media_etag()), Some(current.updated)) {
            return Ok(response);
        }
        let content_type = request
            .content_type()
            .map_or_else(|| previous.content_type.clone(), str::to_owned);
        let media = Media { content_type, body: request.body().clone() };
        let member = Member::new(&name, current.entry.clone(), Some(media), self.next_revision());
        let etag = member.media_etag();
        slot.insert(member);
        drop(slot);
        info!(collection = %self.href, name, "media updated");
        Ok(ResponseContext::builder().entity_tag(&etag).no_body())
    }
}

fn strip_declaration(doc: &str) -> &str {
    let doc = doc.trim_start();
    match doc.strip_prefix("<?xml").and_then(|rest| rest.split_once("?>")) {
        Some((_, rest)) => rest.trim_start(),
        None => doc,
    }
}

/// The no-content preference the client sent, echoed back as applied.
fn applied_no_content(request: &RequestContext) -> Option<Preference> {
    if !helper::prefer_return_no_content(request) {
        return None;
    }
    request
        .prefer()
        .into_iter()
        .find(|p| p.matches(Preference::RETURN_NO_CONTENT) || p.matches(Preference::RETURN))
}

impl CollectionAdapter for MemoryCollection {
    fn href(&self) -> &str { &self.href }
    fn title(&self) -> &str { &self.title }

    fn accepts(&self) -> Vec<String> {
        match (self.accepts.is_empty(), self.media) {
            (false, _) => self.accepts.clone(),
            (true, false) => vec![ACCEPT_ENTRY.to_owned()],
            (true, true) => vec![ACCEPT_ENTRY.to_owned(), "*/*".to_owned()],
        }
    }

    fn get_feed<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.get_feed_now(request) }.boxed()
    }

    fn post_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.post_entry_now(request) }.boxed()
    }

    fn get_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.get_entry_now(request) }.boxed()
    }

    fn put_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.put_entry_now(request) }.boxed()
    }

    fn delete_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.delete_entry_now(request) }.boxed()
    }

    fn media(&self) -> Option<&dyn MediaCollectionAdapter> {
        if self.media { Some(self) } else { None }
    }

    fn transactional(&self) -> Option<&dyn Transactional> {
        Some(self)
    }
}

impl MediaCollectionAdapter for MemoryCollection {
    fn get_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.get_media_now(request) }.boxed()
    }

    fn post_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.post_media_now(request) }.boxed()
    }

    fn put_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.put_media_now(request) }.boxed()
    }

    /// Removes the media resource together with its media-link entry.
    fn delete_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { self.delete_entry_now(request) }.boxed()
    }

    fn head_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { Ok(self.get_media_now(request)?.without_body()) }.boxed()
    }

    fn options_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { Ok(helper::options(helper::default_methods_for(request))) }.boxed()
    }
}

impl Transactional for MemoryCollection {
    fn start<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<()>> {
        debug!(collection = %self.href, method = %request.method(), "transaction start");
        async { Ok(()) }.boxed()
    }

    fn end<'a>(&'a self, _request: &'a RequestContext, response: &'a ResponseContext) -> BoxFuture<'a, ()> {
        debug!(collection = %self.href, status = response.status().as_u16(), "transaction end");
        async {}.boxed()
    }

    fn compensate<'a>(&'a self, _request: &'a RequestContext, error: &'a Error) -> BoxFuture<'a, ()> {
        warn!(collection = %self.href, "transaction compensated: {error}");
        async {}.boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::target::{Target, TargetType};

    const ENTRY: &str = "<?xml version=\"1.0\"?><entry xmlns=\"http://www.w3.org/2005/Atom\"><title>Hello</title></entry>";

    fn request(method: http::Method, entry: Option<&str>, headers: &[(&str, &str)], body: &str) -> RequestContext {
        let mut params = HashMap::from([("collection".to_owned(), "posts".to_owned())]);
        let (target_type, path) = match entry {
            Some(name) => {
                params.insert("entry".to_owned(), name.to_owned());
                (TargetType::Entry, format!("/posts/{name}"))
            }
            None => (TargetType::Collection, "/posts".to_owned()),
        };
        headers
            .iter()
            .fold(RequestContext::builder().method(method).uri(path.clone()).header("host", "example.org"), |b, (n, v)| {
                b.header(n, v)
            })
            .body(body.to_owned())
            .target(Target::new(target_type, path).with_params(params))
            .build()
    }

    fn post(collection: &MemoryCollection, slug: &str) -> ResponseContext {
        let req = request(http::Method::POST, None, &[("content-type", ATOM), ("slug", slug)], ENTRY);
        collection.post_entry_now(&req).unwrap()
    }

    #[test]
    fn post_creates_entries_under_sanitized_slugs() {
        let posts = MemoryCollection::new("/posts/", "Posts");
        let res = post(&posts, "Hello World");
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.location(), Some("http://example.org/posts/hello_world"));
        assert_eq!(res.header(http::header::CONTENT_LOCATION), res.location());
        assert_eq!(res.content_type(), Some("application/atom+xml;type=entry"));
        assert!(res.entity_tag().is_some());
        assert!(res.last_modified().is_some());
        assert!(res.links().iter().any(|l| l.has_rel("edit") && l.href() == "/posts/hello_world"));

        let again = post(&posts, "Hello World");
        assert_eq!(again.location(), Some("http://example.org/posts/hello_world-1"));
        assert_eq!(posts.len(), 2);
    }

    #[test]
    fn post_rejects_non_atom_bodies() {
        let posts = MemoryCollection::new("posts", "Posts");
        let req = request(http::Method::POST, None, &[("content-type", "text/plain")], "hi");
        let err = posts.post_entry_now(&req).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let req = request(http::Method::POST, None, &[("content-type", ATOM)], "<feed/>");
        assert_eq!(posts.post_entry_now(&req).unwrap_err().status(), StatusCode::BAD_REQUEST);
        assert!(posts.is_empty());
    }

    #[test]
    fn post_honours_return_minimal() {
        let posts = MemoryCollection::new("posts", "Posts");
        let req = request(
            http::Method::POST,
            None,
            &[("content-type", ATOM), ("prefer", "return=minimal")],
            ENTRY,
        );
        let res = posts.post_entry_now(&req).unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert!(res.body().is_empty());
        assert_eq!(res.header("preference-applied"), Some("return=minimal"));
    }

    #[test]
    fn get_entry_is_conditional() {
        let posts = MemoryCollection::new("posts", "Posts").with_max_age(60);
        let etag = post(&posts, "a").entity_tag().unwrap();

        let res = posts.get_entry_now(&request(http::Method::GET, Some("a"), &[], "")).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.body().as_ref(), ENTRY.as_bytes());
        assert_eq!(res.header(http::header::CACHE_CONTROL), Some("max-age=60"));

        let tag = etag.to_string();
        let res = posts.get_entry_now(&request(http::Method::GET, Some("a"), &[("if-none-match", tag.as_str())], "")).unwrap();
        assert_eq!(res.status(), StatusCode::NOT_MODIFIED);

        let err = posts.get_entry_now(&request(http::Method::GET, Some("missing"), &[], "")).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn put_and_delete_check_preconditions() {
        let posts = MemoryCollection::new("posts", "Posts");
        let etag = post(&posts, "a").entity_tag().unwrap().to_string();
        let updated = ENTRY.replace("Hello", "Bye");

        let stale = request(http::Method::PUT, Some("a"), &[("content-type", ATOM), ("if-match", "\"stale\"")], &updated);
        assert_eq!(posts.put_entry_now(&stale).unwrap().status(), StatusCode::PRECONDITION_FAILED);

        let fresh = request(http::Method::PUT, Some("a"), &[("content-type", ATOM), ("if-match", etag.as_str())], &updated);
        let res = posts.put_entry_now(&fresh).unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_ne!(res.entity_tag().map(|t| t.to_string()), Some(etag.clone()));
        assert!(std::str::from_utf8(res.body()).unwrap().contains("Bye"));

        let minimal = request(http::Method::PUT, Some("a"), &[("content-type", ATOM), ("prefer", "return-no-content")], ENTRY);
        assert_eq!(posts.put_entry_now(&minimal).unwrap().status(), StatusCode::NO_CONTENT);

        let old = request(http::Method::DELETE, Some("a"), &[("if-match", etag.as_str())], "");
        assert_eq!(posts.delete_entry_now(&old).unwrap().status(), StatusCode::PRECONDITION_FAILED);
        let res = posts.delete_entry_now(&request(http::Method::DELETE, Some("a"), &[], "")).unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(posts.is_empty());

        let missing = request(http::Method::PUT, Some("a"), &[("content-type", ATOM)], ENTRY);
        assert_eq!(posts.put_entry_now(&missing).unwrap_err().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn feed_pages_newest_first() {
        let posts = MemoryCollection::new("posts", "Posts").with_page_size(2);
        for slug in ["one", "two", "three"] {
            let entry = ENTRY.replace("Hello", slug);
            let req = request(http::Method::POST, None, &[("content-type", ATOM), ("slug", slug)], &entry);
            posts.post_entry_now(&req).unwrap();
        }

        let res = posts.get_feed_now(&request(http::Method::GET, None, &[], "")).unwrap();
        assert_eq!(res.content_type(), Some("application/atom+xml;type=feed"));
        assert_eq!(res.header(http::header::CACHE_CONTROL), Some("no-cache"));
        let body = std::str::from_utf8(res.body()).unwrap().to_owned();
        assert!(body.contains("<id>http://example.org/posts</id>"));
        let three = body.find("<title>three</title>").unwrap();
        let two = body.find("<title>two</title>").unwrap();
        assert!(three < two);
        assert!(!body.contains("<title>one</title>"));
        assert!(!body.contains("<?xml version=\"1.0\"?>"));
        let rels: Vec<String> = res.links().iter().flat_map(|l| l.rels().to_vec()).collect();
        assert_eq!(rels, ["first", "next"]);

        let mut req = request(http::Method::GET, None, &[], "");
        req = RequestContext::builder()
            .uri("/posts?page=2")
            .header("host", "example.org")
            .target(req.target().cloned().unwrap())
            .build();
        let res = posts.get_feed_now(&req).unwrap();
        let body = std::str::from_utf8(res.body()).unwrap().to_owned();
        assert!(body.contains("<title>one</title>"));
        let rels: Vec<String> = res.links().iter().flat_map(|l| l.rels().to_vec()).collect();
        assert_eq!(rels, ["first", "previous"]);

        let tag = res.entity_tag().unwrap().to_string();
        let cached = RequestContext::builder()
            .uri("/posts")
            .header("if-none-match", &tag)
            .target(req.target().cloned().unwrap())
            .build();
        assert_eq!(posts.get_feed_now(&cached).unwrap().status(), StatusCode::NOT_MODIFIED);

        let json_only = request(http::Method::GET, None, &[("accept", "application/json")], "");
        assert_eq!(posts.get_feed_now(&json_only).unwrap().status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn huge_page_numbers_yield_an_empty_page() {
        let posts = MemoryCollection::new("posts", "Posts");
        post(&posts, "a");
        let target = request(http::Method::GET, None, &[], "").target().cloned().unwrap();
        for query in ["page=9223372036854775807", "page=9223372036854775807&count=1"] {
            let req = RequestContext::builder().uri(format!("/posts?{query}")).target(target.clone()).build();
            let res = posts.get_feed_now(&req).unwrap();
            assert_eq!(res.status(), StatusCode::OK);
            let body = std::str::from_utf8(res.body()).unwrap().to_owned();
            assert!(!body.contains("<title>Hello</title>"));
            assert!(!res.links().iter().any(|l| l.has_rel("next")));
        }
    }

    #[test]
    fn concurrent_conditional_puts_admit_one_writer() {
        let posts = MemoryCollection::new("posts", "Posts");
        for round in 0..200 {
            let etag = post(&posts, "a").entity_tag().unwrap().to_string();
            let barrier = std::sync::Barrier::new(2);
            let statuses: Vec<StatusCode> = std::thread::scope(|scope| {
                let writers: Vec<_> = (0..2)
                    .map(|writer| {
                        let (posts, barrier, etag) = (&posts, &barrier, etag.as_str());
                        scope.spawn(move || {
                            let body = ENTRY.replace("Hello", &format!("round {round} writer {writer}"));
                            let req = request(
                                http::Method::PUT,
                                Some("a"),
                                &[("content-type", ATOM), ("if-match", etag)],
                                &body,
                            );
                            barrier.wait();
                            posts.put_entry_now(&req).unwrap().status()
                        })
                    })
                    .collect();
                writers.into_iter().map(|w| w.join().unwrap()).collect()
            });
            assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1, "round {round}: {statuses:?}");
            assert!(statuses.contains(&StatusCode::PRECONDITION_FAILED));

            let delete = request(http::Method::DELETE, Some("a"), &[("if-match", etag.as_str())], "");
            assert_eq!(posts.delete_entry_now(&delete).unwrap().status(), StatusCode::PRECONDITION_FAILED);
            posts.delete_entry_now(&request(http::Method::DELETE, Some("a"), &[], "")).unwrap();
            assert!(posts.is_empty());
        }
    }

    #[test]
    fn media_resources_have_media_link_entries() {
        let images = MemoryCollection::new("images", "Images").with_media(true);
        assert!(images.media().is_some());
        assert_eq!(images.accepts(), [ACCEPT_ENTRY, "*/*"]);

        let req = request(http::Method::POST, None, &[("content-type", "image/png"), ("slug", "Logo")], "PNG");
        let res = images.post_media_now(&req).unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.location(), Some("http://example.org/images/logo"));
        assert!(res.links().iter().any(|l| l.has_rel("edit-media") && l.href() == "/images/logo;media"));
        let entry = std::str::from_utf8(res.body()).unwrap().to_owned();
        assert!(entry.contains("<content type=\"image/png\" src=\"/images/logo;media\"/>"));
        assert!(entry.contains("<title type=\"text\">Logo</title>"));

        let res = images.get_media_now(&request(http::Method::GET, Some("logo"), &[], "")).unwrap();
        assert_eq!(res.content_type(), Some("image/png"));
        assert_eq!(res.body().as_ref(), b"PNG");

        let put = request(http::Method::PUT, Some("logo"), &[("content-type", "image/gif")], "GIF");
        assert_eq!(images.put_media_now(&put).unwrap().status(), StatusCode::OK);
        let res = images.get_media_now(&request(http::Method::GET, Some("logo"), &[], "")).unwrap();
        assert_eq!(res.content_type(), Some("image/gif"));

        let res = images.delete_entry_now(&request(http::Method::DELETE, Some("logo"), &[], "")).unwrap();
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        assert!(images.is_empty());
    }

    #[test]
    fn plain_collections_have_no_media() {
        let posts = MemoryCollection::new("posts", "Posts");
        assert!(posts.media().is_none());
        assert_eq!(posts.accepts(), [ACCEPT_ENTRY]);
        post(&posts, "a");
        let res = posts.get_media_now(&request(http::Method::GET, Some("a"), &[], "")).unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn generated_names_without_slug() {
        let posts = MemoryCollection::new("posts", "Posts");
        let req = request(http::Method::POST, None, &[("content-type", ATOM), ("slug", "***")], ENTRY);
        let res = posts.post_entry_now(&req).unwrap();
        let location = res.location().unwrap();
        let name = location.rsplit('/').next().unwrap();
        assert_eq!(name.len(), 16);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
