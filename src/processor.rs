//! Request processors: method dispatch for each target type.
//!
//! A processor maps the request method onto an adapter operation. Methods it
//! does not know yield `Ok(None)`, and the provider hands the request to
//! [`CollectionAdapter::extension_request`].

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::adapter::CollectionAdapter;
use crate::error::Result;
use crate::helper;
use crate::method::Method;
use crate::request::RequestContext;
use crate::response::{ContentType, ResponseContext};
use crate::workspace::{self, WorkspaceManager};

/// Dispatches one request for a target type.
pub trait RequestProcessor: Send + Sync {
    fn process<'a>(
        &'a self,
        request: &'a RequestContext,
        workspaces: &'a dyn WorkspaceManager,
        adapter: Option<&'a dyn CollectionAdapter>,
    ) -> BoxFuture<'a, Result<Option<ResponseContext>>>;
}

async fn some(fut: BoxFuture<'_, Result<ResponseContext>>) -> Result<Option<ResponseContext>> {
    fut.await.map(Some)
}

/// The service document.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServiceRequestProcessor;

impl RequestProcessor for ServiceRequestProcessor {
    fn process<'a>(
        &'a self,
        request: &'a RequestContext,
        workspaces: &'a dyn WorkspaceManager,
        _adapter: Option<&'a dyn CollectionAdapter>,
    ) -> BoxFuture<'a, Result<Option<ResponseContext>>> {
        async move {
            let document = || {
                let body = workspace::service_document(request, workspaces.workspaces(request));
                ResponseContext::builder().no_cache().bytes(ContentType::AtomService, body)
            };
            Ok(match request.known_method() {
                Some(Method::Get) => Some(document()),
                Some(Method::Head) => Some(document().without_body()),
                Some(Method::Options) => Some(helper::options(helper::default_methods_for(request))),
                _ => None,
            })
        }
        .boxed()
    }
}

/// Feeds: list and create.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectionRequestProcessor;

impl RequestProcessor for CollectionRequestProcessor {
    fn process<'a>(
        &'a self,
        request: &'a RequestContext,
        _workspaces: &'a dyn WorkspaceManager,
        adapter: Option<&'a dyn CollectionAdapter>,
    ) -> BoxFuture<'a, Result<Option<ResponseContext>>> {
        async move {
            let Some(adapter) = adapter else {
                return Ok(Some(helper::not_found("")));
            };
            match request.known_method() {
                Some(Method::Get) => some(adapter.get_feed(request)).await,
                Some(Method::Head) => some(adapter.head_feed(request)).await,
                Some(Method::Options) => some(adapter.options_feed(request)).await,
                Some(Method::Post) => match adapter.media() {
                    Some(media) if !helper::is_atom(request) => some(media.post_media(request)).await,
                    _ => some(adapter.post_entry(request)).await,
                },
                _ => Ok(None),
            }
        }
        .boxed()
    }
}

/// Member entries.
#[derive(Clone, Copy, Debug, Default)]
pub struct EntryRequestProcessor;

impl RequestProcessor for EntryRequestProcessor {
    fn process<'a>(
        &'a self,
        request: &'a RequestContext,
        _workspaces: &'a dyn WorkspaceManager,
        adapter: Option<&'a dyn CollectionAdapter>,
    ) -> BoxFuture<'a, Result<Option<ResponseContext>>> {
        async move {
            let Some(adapter) = adapter else {
                return Ok(Some(helper::not_found("")));
            };
            match request.known_method() {
                Some(Method::Get) => some(adapter.get_entry(request)).await,
                Some(Method::Post) => some(adapter.post_item(request)).await,
                Some(Method::Put) => some(adapter.put_entry(request)).await,
                Some(Method::Delete) => some(adapter.delete_entry(request)).await,
                Some(Method::Head) => some(adapter.head_entry(request)).await,
                Some(Method::Options) => some(adapter.options_entry(request)).await,
                Some(Method::Patch) => some(adapter.patch_entry(request)).await,
                _ => Ok(None),
            }
        }
        .boxed()
    }
}

/// Media resources. Adapters without media support answer 405.
#[derive(Clone, Copy, Debug, Default)]
pub struct MediaRequestProcessor;

impl RequestProcessor for MediaRequestProcessor {
    fn process<'a>(
        &'a self,
        request: &'a RequestContext,
        _workspaces: &'a dyn WorkspaceManager,
        adapter: Option<&'a dyn CollectionAdapter>,
    ) -> BoxFuture<'a, Result<Option<ResponseContext>>> {
        async move {
            let Some(adapter) = adapter else {
                return Ok(Some(helper::not_found("")));
            };
            let Some(media) = adapter.media() else {
                return Ok(Some(helper::not_allowed_for(request)));
            };
            match request.known_method() {
                Some(Method::Get) => some(media.get_media(request)).await,
                Some(Method::Post) => some(media.post_media(request)).await,
                Some(Method::Put) => some(media.put_media(request)).await,
                Some(Method::Delete) => some(media.delete_media(request)).await,
                Some(Method::Head) => some(media.head_media(request)).await,
                Some(Method::Options) => some(media.options_media(request)).await,
                _ => Ok(None),
            }
        }
        .boxed()
    }
}

/// Categories documents.
#[derive(Clone, Copy, Debug, Default)]
pub struct CategoriesRequestProcessor;

impl RequestProcessor for CategoriesRequestProcessor {
    fn process<'a>(
        &'a self,
        request: &'a RequestContext,
        _workspaces: &'a dyn WorkspaceManager,
        adapter: Option<&'a dyn CollectionAdapter>,
    ) -> BoxFuture<'a, Result<Option<ResponseContext>>> {
        async move {
            let Some(categories) = adapter.and_then(|a| a.categories_adapter()) else {
                return Ok(Some(helper::not_found("")));
            };
            match request.known_method() {
                Some(Method::Get) => some(categories.get_categories(request)).await,
                Some(Method::Head) => Ok(Some(categories.get_categories(request).await?.without_body())),
                Some(Method::Options) => Ok(Some(helper::options(helper::default_methods_for(request)))),
                _ => Ok(None),
            }
        }
        .boxed()
    }
}
