//! The provider: target resolution, filters and request processing.
//!
//! A [`Provider`] owns everything needed to answer AtomPub requests for one
//! mount point:
//!
//! ```text
//! handle(request)
//!   ├─ resolve target     TargetResolver (RouteManager by default)
//!   ├─ resolve subject    SubjectResolver
//!   ├─ filters            Filter, in registration order
//!   └─ process
//!        ├─ processor     TargetType -> RequestProcessor
//!        ├─ adapter       WorkspaceManager
//!        └─ transaction   start / compensate / end
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::adapter::{CollectionAdapter, Transactional};
use crate::error::{Error, Result};
use crate::helper;
use crate::middleware::{Filter, FilterChain};
use crate::processor::{
    CategoriesRequestProcessor, CollectionRequestProcessor, EntryRequestProcessor, MediaRequestProcessor,
    RequestProcessor, ServiceRequestProcessor,
};
use crate::request::{RequestContext, Subject};
use crate::resolver::TargetResolver;
use crate::response::ResponseContext;
use crate::route::Route;
use crate::route_manager::RouteManager;
use crate::target::{Target, TargetType};
use crate::workspace::{DefaultWorkspaceManager, WorkspaceInfo, WorkspaceManager};

/// Decides who a request acts for.
pub trait SubjectResolver: Send + Sync {
    fn resolve(&self, request: &RequestContext) -> Option<Subject>;
}

/// Uses the principal established upstream; requests without one are
/// anonymous.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrincipalSubjectResolver;

impl SubjectResolver for PrincipalSubjectResolver {
    fn resolve(&self, request: &RequestContext) -> Option<Subject> {
        Some(request.principal().map_or_else(Subject::anonymous, Subject::new))
    }
}

/// Serves the collections of its workspaces under a base path.
pub struct Provider {
    base: String,
    properties: HashMap<String, String>,
    filters: Vec<Arc<dyn Filter>>,
    processors: HashMap<TargetType, Arc<dyn RequestProcessor>>,
    routes: Arc<RouteManager>,
    resolver: Arc<dyn TargetResolver>,
    workspaces: Arc<dyn WorkspaceManager>,
    subjects: Arc<dyn SubjectResolver>,
}

impl Provider {
    /// Starts a provider whose default routes live under `base`.
    pub fn builder(base: &str) -> ProviderBuilder {
        ProviderBuilder::new(base)
    }

    /// The route prefix, always ending in `/`.
    pub fn base(&self) -> &str { &self.base }
    pub fn routes(&self) -> &RouteManager { &self.routes }
    pub fn target_resolver(&self) -> &dyn TargetResolver { self.resolver.as_ref() }
    pub fn workspace_manager(&self) -> &dyn WorkspaceManager { self.workspaces.as_ref() }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Property names, sorted.
    pub fn property_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.properties.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn url_for(&self, request: &RequestContext, key: &str, params: &[(&str, &str)]) -> Option<String> {
        self.routes.url_for(request, key, params)
    }

    /// Resolves the request's target and subject, then runs it through the
    /// filters and [`process`](Self::process).
    pub async fn handle(&self, mut request: RequestContext) -> ResponseContext {
        request.set_routes(Arc::clone(&self.routes));
        let target = self
            .resolver
            .resolve(&request)
            .unwrap_or_else(|| Target::not_found(request.target_path()));
        request.set_target(Some(target));
        let subject = self.subjects.resolve(&request);
        request.set_subject(subject);
        FilterChain::new(self, &self.filters).next(request).await
    }

    /// Dispatches a resolved request to its processor and adapter.
    ///
    /// Never fails: every error becomes a response. When the adapter is
    /// [`Transactional`], `end` runs exactly once with the final response.
    pub async fn process(&self, request: &RequestContext) -> ResponseContext {
        let Some(target) = request.target().filter(|t| *t.target_type() != TargetType::NotFound) else {
            debug!(path = request.target_path(), "no target");
            return helper::not_found("");
        };
        let Some(processor) = self.processors.get(target.target_type()) else {
            debug!(target_type = %target.target_type(), "no processor for target type");
            return helper::not_found("");
        };
        let adapter = self.workspaces.collection_adapter(request);
        if adapter.is_none() && *target.target_type() != TargetType::Service {
            debug!(path = request.target_path(), "no collection adapter");
            return helper::not_found("");
        }
        let adapter = adapter.as_deref();
        let transaction = adapter.and_then(|a| a.transactional());

        let response = match self.run(request, processor.as_ref(), adapter, transaction).await {
            Ok(response) => response,
            Err(err) => {
                if err.status().is_client_error() {
                    info!(status = err.status().as_u16(), "request failed: {err}");
                } else {
                    error!(status = err.status().as_u16(), "request failed: {err}");
                }
                if let Some(transaction) = transaction {
                    transaction.compensate(request, &err).await;
                }
                match err {
                    Error::Response(response) => *response,
                    _ => helper::server_error(""),
                }
            }
        };
        if let Some(transaction) = transaction {
            transaction.end(request, &response).await;
        }
        response
    }

    async fn run(
        &self,
        request: &RequestContext,
        processor: &dyn RequestProcessor,
        adapter: Option<&dyn CollectionAdapter>,
        transaction: Option<&dyn Transactional>,
    ) -> Result<ResponseContext> {
        if let Some(transaction) = transaction {
            transaction.start(request).await?;
        }
        match processor.process(request, self.workspaces.as_ref(), adapter).await? {
            Some(response) => Ok(response),
            None => match adapter {
                Some(adapter) => adapter.extension_request(request).await,
                None => Ok(helper::not_allowed_for(request)),
            },
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("base", &self.base)
            .field("filters", &self.filters.len())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

enum PendingRoute {
    Typed { key: String, pattern: String, target_type: TargetType, adapter: Option<Arc<dyn CollectionAdapter>> },
    Compiled(Route, Option<TargetType>),
}

/// Assembles a [`Provider`].
///
/// Routes added here are consulted before the default ones, so a custom
/// pattern can shadow `feed` or `entry`.
pub struct ProviderBuilder {
    base: String,
    routes: Vec<PendingRoute>,
    manager: Option<RouteManager>,
    workspaces: Vec<WorkspaceInfo>,
    workspace_manager: Option<Arc<dyn WorkspaceManager>>,
    filters: Vec<Arc<dyn Filter>>,
    processors: HashMap<TargetType, Arc<dyn RequestProcessor>>,
    properties: HashMap<String, String>,
    resolver: Option<Arc<dyn TargetResolver>>,
    subjects: Arc<dyn SubjectResolver>,
}

impl ProviderBuilder {
    fn new(base: &str) -> Self {
        let base = format!("/{}", base.trim_matches('/'));
        let base = if base == "/" { base } else { format!("{base}/") };
        let mut processors: HashMap<TargetType, Arc<dyn RequestProcessor>> = HashMap::new();
        processors.insert(TargetType::Service, Arc::new(ServiceRequestProcessor));
        processors.insert(TargetType::Collection, Arc::new(CollectionRequestProcessor));
        processors.insert(TargetType::Entry, Arc::new(EntryRequestProcessor));
        processors.insert(TargetType::Media, Arc::new(MediaRequestProcessor));
        processors.insert(TargetType::Categories, Arc::new(CategoriesRequestProcessor));
        Self {
            base,
            routes: Vec::new(),
            manager: None,
            workspaces: Vec::new(),
            workspace_manager: None,
            filters: Vec::new(),
            processors,
            properties: HashMap::new(),
            resolver: None,
            subjects: Arc::new(PrincipalSubjectResolver),
        }
    }

    /// Adds a route resolving to `target_type`. The pattern is compiled by
    /// [`build`](Self::build).
    pub fn route(mut self, key: &str, pattern: &str, target_type: TargetType) -> Self {
        self.routes.push(PendingRoute::Typed {
            key: key.to_owned(),
            pattern: pattern.to_owned(),
            target_type,
            adapter: None,
        });
        self
    }

    /// Adds a route whose targets are always served by `adapter`.
    pub fn route_with_adapter(
        mut self,
        key: &str,
        pattern: &str,
        target_type: TargetType,
        adapter: Arc<dyn CollectionAdapter>,
    ) -> Self {
        self.routes.push(PendingRoute::Typed {
            key: key.to_owned(),
            pattern: pattern.to_owned(),
            target_type,
            adapter: Some(adapter),
        });
        self
    }

    /// Adds a compiled route, e.g. one with defaults or requirements. A
    /// `None` type makes it a URL-building route only.
    pub fn compiled_route(mut self, route: Route, target_type: impl Into<Option<TargetType>>) -> Self {
        self.routes.push(PendingRoute::Compiled(route, target_type.into()));
        self
    }

    /// Replaces the default routes with `manager`. Routes added with
    /// [`route`](Self::route) are still registered on top of it.
    pub fn routes(mut self, manager: RouteManager) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn workspace(mut self, workspace: WorkspaceInfo) -> Self {
        self.workspaces.push(workspace);
        self
    }

    /// Uses `manager` instead of the workspaces added with
    /// [`workspace`](Self::workspace).
    pub fn workspace_manager(mut self, manager: Arc<dyn WorkspaceManager>) -> Self {
        self.workspace_manager = Some(manager);
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Installs or replaces the processor for `target_type`.
    pub fn processor(mut self, target_type: TargetType, processor: Arc<dyn RequestProcessor>) -> Self {
        self.processors.insert(target_type, processor);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn properties(mut self, properties: impl IntoIterator<Item = (String, String)>) -> Self {
        self.properties.extend(properties);
        self
    }

    /// Resolves targets with `resolver` instead of the route manager. The
    /// routes are still used to build URLs.
    pub fn target_resolver(mut self, resolver: Arc<dyn TargetResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn subject_resolver(mut self, resolver: Arc<dyn SubjectResolver>) -> Self {
        self.subjects = resolver;
        self
    }

    /// Compiles the routes. Fails with [`Error::InvalidRoute`] on the first
    /// bad pattern.
    pub fn build(self) -> Result<Provider> {
        let (mut manager, defaults) = match self.manager {
            Some(manager) => (manager, false),
            None => (RouteManager::new(), true),
        };
        for pending in self.routes {
            manager = match pending {
                PendingRoute::Typed { key, pattern, target_type, adapter: Some(adapter) } => {
                    manager.add_route_with_adapter(&key, &pattern, target_type, adapter)?
                }
                PendingRoute::Typed { key, pattern, target_type, adapter: None } => {
                    manager.add_route(&key, &pattern, target_type)?
                }
                PendingRoute::Compiled(route, target_type) => manager.route(route, target_type),
            };
        }
        if defaults {
            let base = &self.base;
            manager = manager
                .add_route("service", base, TargetType::Service)?
                .add_route("feed", &format!("{base}:collection"), TargetType::Collection)?
                .add_route("entry", &format!("{base}:collection/:entry"), TargetType::Entry)?
                .add_route("categories", &format!("{base}:collection/:entry;categories"), TargetType::Categories)?
                .add_route("media", &format!("{base}:collection/:entry;media"), TargetType::Media)?;
        }

        let workspaces = self.workspace_manager.unwrap_or_else(|| {
            let manager = self.workspaces.into_iter().fold(DefaultWorkspaceManager::new(), |m, w| m.with_workspace(w));
            Arc::new(manager)
        });
        debug!(base = %self.base, filters = self.filters.len(), "provider built");
        let routes = Arc::new(manager);
        let resolver = self.resolver.unwrap_or_else(|| Arc::clone(&routes) as Arc<dyn TargetResolver>);
        Ok(Provider {
            base: self.base,
            properties: self.properties,
            filters: self.filters,
            processors: self.processors,
            routes,
            resolver,
            workspaces,
            subjects: self.subjects,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::FutureExt;
    use futures::future::BoxFuture;
    use http::StatusCode;

    use super::*;
    use crate::middleware::MethodOverride;

    /// Records adapter calls and transaction hooks in order.
    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<String>>,
        fail_with: Option<StatusCode>,
        fail_start: bool,
    }

    impl Journal {
        fn push(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn answer(&self, op: &'static str) -> BoxFuture<'_, Result<ResponseContext>> {
            self.push(op);
            let fail_with = self.fail_with;
            async move {
                match fail_with {
                    Some(StatusCode::INTERNAL_SERVER_ERROR) => Err(Error::adapter("boom")),
                    Some(status) => Err(Error::http(status, "refused")),
                    None => Ok(ResponseContext::status_only(StatusCode::OK)),
                }
            }
            .boxed()
        }
    }

    impl CollectionAdapter for Journal {
        fn href(&self) -> &str { "posts" }
        fn title(&self) -> &str { "Posts" }
        fn get_feed<'a>(&'a self, _: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> { self.answer("get_feed") }
        fn post_entry<'a>(&'a self, _: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> { self.answer("post_entry") }
        fn get_entry<'a>(&'a self, _: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> { self.answer("get_entry") }
        fn put_entry<'a>(&'a self, _: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> { self.answer("put_entry") }
        fn delete_entry<'a>(&'a self, _: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> { self.answer("delete_entry") }

        fn extension_request<'a>(&'a self, request: &'a RequestContext) -> BoxFuture<'a, Result<ResponseContext>> {
            self.push(format!("extension {}", request.method()));
            async { Ok(ResponseContext::status_only(StatusCode::MULTI_STATUS)) }.boxed()
        }

        fn transactional(&self) -> Option<&dyn Transactional> {
            Some(self)
        }
    }

    impl Transactional for Journal {
        fn start<'a>(&'a self, _: &'a RequestContext) -> BoxFuture<'a, Result<()>> {
            self.push("start");
            let fail = self.fail_start;
            async move {
                if fail { Err(Error::http(StatusCode::SERVICE_UNAVAILABLE, "busy")) } else { Ok(()) }
            }
            .boxed()
        }

        fn end<'a>(&'a self, _: &'a RequestContext, response: &'a ResponseContext) -> BoxFuture<'a, ()> {
            self.push(format!("end {}", response.status().as_u16()));
            async {}.boxed()
        }

        fn compensate<'a>(&'a self, _: &'a RequestContext, error: &'a Error) -> BoxFuture<'a, ()> {
            self.push(format!("compensate {}", error.status().as_u16()));
            async {}.boxed()
        }
    }

    fn provider(journal: Arc<Journal>) -> Provider {
        Provider::builder("/")
            .workspace(WorkspaceInfo::new("Blog").with_collection(journal))
            .property("author", "ada")
            .property("mode", "test")
            .build()
            .unwrap()
    }

    fn request(method: http::Method, uri: &str) -> RequestContext {
        RequestContext::builder().method(method).uri(uri).build()
    }

    #[tokio::test]
    async fn resolves_default_routes() {
        let journal = Arc::new(Journal::default());
        let provider = provider(Arc::clone(&journal));

        assert_eq!(provider.handle(request(http::Method::GET, "/posts")).await.status(), StatusCode::OK);
        assert_eq!(provider.handle(request(http::Method::PUT, "/posts/1")).await.status(), StatusCode::OK);
        assert_eq!(journal.events(), ["start", "get_feed", "end 200", "start", "put_entry", "end 200"]);

        let service = provider.handle(request(http::Method::GET, "/")).await;
        assert_eq!(service.content_type(), Some("application/atomsvc+xml"));
        assert_eq!(provider.handle(request(http::Method::GET, "/a/b/c")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(provider.handle(request(http::Method::GET, "/missing/1")).await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn client_errors_compensate_and_keep_their_response() {
        let journal = Arc::new(Journal { fail_with: Some(StatusCode::CONFLICT), ..Journal::default() });
        let provider = provider(Arc::clone(&journal));
        let res = provider.handle(request(http::Method::DELETE, "/posts/1")).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(res.status_text(), Some("refused"));
        assert_eq!(journal.events(), ["start", "delete_entry", "compensate 409", "end 409"]);
    }

    #[tokio::test]
    async fn adapter_failures_become_server_errors() {
        let journal = Arc::new(Journal { fail_with: Some(StatusCode::INTERNAL_SERVER_ERROR), ..Journal::default() });
        let provider = provider(Arc::clone(&journal));
        let res = provider.handle(request(http::Method::GET, "/posts/1")).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(journal.events(), ["start", "get_entry", "compensate 500", "end 500"]);
    }

    #[tokio::test]
    async fn failed_starts_skip_the_processor() {
        let journal = Arc::new(Journal { fail_start: true, ..Journal::default() });
        let provider = provider(Arc::clone(&journal));
        let res = provider.handle(request(http::Method::GET, "/posts")).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(res.status_text(), Some("busy"));
        assert_eq!(journal.events(), ["start", "compensate 503", "end 503"]);
    }

    #[tokio::test]
    async fn unknown_methods_reach_the_extension_hook() {
        let journal = Arc::new(Journal::default());
        let provider = provider(Arc::clone(&journal));
        let propfind = http::Method::from_bytes(b"PROPFIND").unwrap();
        let res = provider.handle(request(propfind, "/posts/1")).await;
        assert_eq!(res.status(), StatusCode::MULTI_STATUS);
        assert_eq!(journal.events(), ["start", "extension PROPFIND", "end 207"]);
    }

    #[tokio::test]
    async fn filters_run_before_processing() {
        let journal = Arc::new(Journal::default());
        let provider = Provider::builder("/")
            .workspace(WorkspaceInfo::new("Blog").with_collection(Arc::clone(&journal) as Arc<dyn CollectionAdapter>))
            .filter(MethodOverride::default())
            .build()
            .unwrap();
        let req = RequestContext::builder()
            .method(http::Method::POST)
            .uri("/posts/1")
            .header("x-http-method-override", "DELETE")
            .build();
        provider.handle(req).await;
        assert_eq!(journal.events(), ["start", "delete_entry", "end 200"]);
    }

    #[tokio::test]
    async fn custom_routes_and_processors() {
        struct Ping;
        impl RequestProcessor for Ping {
            fn process<'a>(
                &'a self,
                _: &'a RequestContext,
                _: &'a dyn WorkspaceManager,
                _: Option<&'a dyn CollectionAdapter>,
            ) -> BoxFuture<'a, Result<Option<ResponseContext>>> {
                async { Ok(Some(ResponseContext::builder().text("pong"))) }.boxed()
            }
        }

        let journal: Arc<dyn CollectionAdapter> = Arc::new(Journal::default());
        let provider = Provider::builder("/api")
            .route_with_adapter("ping", "/api/ping", TargetType::named("ping"), journal)
            .processor(TargetType::named("PING"), Arc::new(Ping))
            .build()
            .unwrap();
        assert_eq!(provider.base(), "/api/");
        let res = provider.handle(request(http::Method::GET, "/api/ping")).await;
        assert_eq!(res.body().as_ref(), b"pong");

        let res = provider.handle(request(http::Method::GET, "/api/")).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[test]
    fn properties_and_url_building() {
        let provider = provider(Arc::new(Journal::default()));
        assert_eq!(provider.property("author"), Some("ada"));
        assert_eq!(provider.property("missing"), None);
        assert_eq!(provider.property_names(), ["author", "mode"]);

        let mut req = RequestContext::builder().uri("/app/posts").context_path("/app").build();
        req.set_target(provider.routes().resolve(&req));
        assert_eq!(provider.url_for(&req, "entry", &[("entry", "hello")]).as_deref(), Some("/app/posts/hello"));
    }

    #[tokio::test]
    async fn a_custom_route_manager_replaces_the_defaults() {
        let manager = RouteManager::new().add_route("home", "/home", TargetType::Service).unwrap();
        let provider = Provider::builder("/").routes(manager).build().unwrap();
        assert_eq!(provider.handle(request(http::Method::GET, "/home")).await.status(), StatusCode::OK);
        assert_eq!(provider.handle(request(http::Method::GET, "/")).await.status(), StatusCode::NOT_FOUND);
        assert!(provider.routes().get("feed").is_none());
    }

    #[tokio::test]
    async fn a_target_resolver_replaces_route_matching() {
        let journal = Arc::new(Journal::default());
        let resolver = crate::resolver::RegexTargetResolver::new()
            .pattern_with_fields(r"/items/([0-9]+)", TargetType::Entry, &["entry"])
            .unwrap();
        let provider = Provider::builder("/")
            .route_with_adapter("items", "/items/:entry", TargetType::Entry, Arc::clone(&journal) as Arc<dyn CollectionAdapter>)
            .target_resolver(Arc::new(resolver))
            .build()
            .unwrap();

        let mut req = request(http::Method::GET, "/items/7");
        req.set_target(provider.target_resolver().resolve(&req));
        assert_eq!(req.target().and_then(|t| t.parameter("entry")), Some("7"));
        assert_eq!(provider.url_for(&req, "items", &[]).as_deref(), Some("/items/7"));

        assert_eq!(provider.handle(request(http::Method::GET, "/items/x")).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(provider.handle(request(http::Method::GET, "/posts")).await.status(), StatusCode::NOT_FOUND);
        assert!(journal.events().is_empty());
    }

    #[test]
    fn subjects_follow_the_principal() {
        let anonymous = request(http::Method::GET, "/");
        assert_eq!(PrincipalSubjectResolver.resolve(&anonymous), Some(Subject::anonymous()));
        let named = RequestContext::builder().uri("/").principal("ada").build();
        assert_eq!(PrincipalSubjectResolver.resolve(&named).and_then(|s| s.principal().map(str::to_owned)).as_deref(), Some("ada"));
    }
}
