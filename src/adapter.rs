//! Collection adapters: the pluggable storage behind a provider.
//!
//! A [`CollectionAdapter`] implements create/read/update/delete for one
//! collection. Optional capabilities (media resources, transactions,
//! categories documents) are separate traits an adapter exposes through
//! [`CollectionAdapter::media`], [`CollectionAdapter::transactional`] and
//! [`CollectionAdapter::categories_adapter`].
//!
//! Every operation returns a boxed future so the traits stay object safe:
//!
//! ```rust,ignore
//! fn get_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
//!     async move { Ok(helper::not_found("")) }.boxed()
//! }
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::{Error, Result};
use crate::helper;
use crate::request::RequestContext;
use crate::response::ResponseContext;

/// Default `app:accept` value of a collection.
pub const ACCEPT_ENTRY: &str = "application/atom+xml;type=entry";

fn not_allowed<'a>(request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
    async move { Ok(helper::not_allowed_for(request)) }.boxed()
}

/// Create, read, update and delete for one collection of entries.
pub trait CollectionAdapter: Send + Sync {
    /// Collection href, relative to the provider's context path.
    fn href(&self) -> &str;

    fn title(&self) -> &str;

    /// Media ranges listed as `app:accept` in the service document.
    fn accepts(&self) -> Vec<String> {
        vec![ACCEPT_ENTRY.to_owned()]
    }

    /// Category sets advertised in the service document.
    fn categories(&self) -> Vec<CategoriesInfo> {
        Vec::new()
    }

    fn get_feed<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>>;

    fn post_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>>;

    fn get_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>>;

    fn put_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>>;

    fn delete_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>>;

    /// `HEAD` on an entry: the `GET` response without its body.
    fn head_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { Ok(self.get_entry(request).await?.without_body()) }.boxed()
    }

    fn options_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { Ok(helper::options(helper::default_methods_for(request))) }.boxed()
    }

    fn patch_entry<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    /// `POST` addressed to an entry rather than its collection.
    fn post_item<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    fn head_feed<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { Ok(self.get_feed(request).await?.without_body()) }.boxed()
    }

    fn options_feed<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        async move { Ok(helper::options(helper::default_methods_for(request))) }.boxed()
    }

    /// Any request the processors do not dispatch: extension methods, or
    /// methods a target type does not define.
    fn extension_request<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    fn media(&self) -> Option<&dyn MediaCollectionAdapter> {
        None
    }

    fn transactional(&self) -> Option<&dyn Transactional> {
        None
    }

    fn categories_adapter(&self) -> Option<&dyn CategoriesAdapter> {
        None
    }
}

/// Media resources (RFC 5023 §9.6) alongside their media-link entries.
pub trait MediaCollectionAdapter: Send + Sync {
    fn get_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    fn post_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    fn put_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    fn delete_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    fn head_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }

    fn options_media<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
        not_allowed(request)
    }
}

/// Hooks wrapped around every request the adapter processes.
///
/// `start` runs before the processor; an error aborts the request. `end`
/// runs exactly once with the final response, after `compensate` when the
/// request failed.
pub trait Transactional: Send + Sync {
    fn start<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<()>>;

    fn end<'a>(&'a self, request: &'a RequestContext, response: &'a ResponseContext) -> BoxFuture<'a, ()>;

    fn compensate<'a>(&'a self, request: &'a RequestContext, error: &'a Error) -> BoxFuture<'a, ()>;
}

/// Serves the categories document (`application/atomcat+xml`).
pub trait CategoriesAdapter: Send + Sync {
    fn get_categories<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>>;
}

/// One `app:categories` element of a collection.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CategoriesInfo {
    /// Out-of-line categories document. When set, the inline fields are
    /// ignored.
    pub href: Option<String>,
    pub fixed: bool,
    pub scheme: Option<String>,
    pub categories: Vec<CategoryInfo>,
}

impl CategoriesInfo {
    pub fn out_of_line(href: impl Into<String>) -> Self {
        Self { href: Some(href.into()), ..Self::default() }
    }

    pub fn inline(fixed: bool, scheme: Option<String>, categories: Vec<CategoryInfo>) -> Self {
        Self { href: None, fixed, scheme, categories }
    }
}

/// An `atom:category`.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CategoryInfo {
    pub term: String,
    pub scheme: Option<String>,
    pub label: Option<String>,
}

impl CategoryInfo {
    pub fn new(term: impl Into<String>) -> Self {
        Self { term: term.into(), ..Self::default() }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }
}
