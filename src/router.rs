//! Request router: plain handlers and provider mounts.
//!
//! One radix tree per HTTP method for plain handlers, checked first, so a
//! lookup costs O(path length) whatever the number of routes. Anything they
//! do not match goes to the provider mounted on the longest matching
//! prefix. Everything else is a 404.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::error::{Error, Result};
use crate::handler::{BoxedHandler, Handler};
use crate::helper;
use crate::provider::Provider;
use crate::request::RequestContext;
use crate::response::ResponseContext;
use crate::target::{Target, TargetType};

struct Mount {
    prefix: String,
    provider: Arc<Provider>,
}

impl Mount {
    /// `/atom` covers `/atom`, `/atom/...` and `/atom;...` but not `/atomic`.
    /// The root mount has an empty prefix and covers everything.
    fn covers(&self, path: &str) -> bool {
        self.prefix.is_empty()
            || path
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(['/', ';']))
    }
}

/// The application router. Build it once at startup and pass it to
/// [`Server::serve`](crate::Server::serve). Every builder method returns
/// `self`, so registrations chain.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use abdera::{Provider, RequestContext, Router};
/// # async fn healthz(_: RequestContext) -> &'static str { "ok" }
/// # let provider = Arc::new(Provider::builder("/").build()?);
/// Router::new()
///     .on(http::Method::GET, "/healthz", healthz)
///     .mount("/atom", provider);
/// # Ok::<(), abdera::Error>(())
/// ```
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    mounts: Vec<Mount>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plain handler. Path variables use `{name}` syntax and are
    /// read back with [`RequestContext::parameter`].
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`. Use [`try_on`](Self::try_on) to handle that.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.try_on(method, path, handler).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_on(mut self, method: Method, path: &str, handler: impl Handler) -> Result<Self> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .map_err(|e| Error::InvalidRoute { pattern: path.to_owned(), reason: e.to_string() })?;
        Ok(self)
    }

    /// Serves every path under `prefix` with `provider`. The prefix becomes
    /// the requests' context path.
    pub fn mount(mut self, prefix: &str, provider: Arc<Provider>) -> Self {
        let trimmed = prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() { String::new() } else { format!("/{trimmed}") };
        self.mounts.push(Mount { prefix, provider });
        // Longest prefix first, so `call` can take the first mount covering
        // the path. The sort is stable: equal prefixes keep mount order.
        self.mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        self
    }

    /// Routes one buffered request.
    pub async fn call(&self, request: http::Request<Bytes>) -> ResponseContext {
        self.call_from(request, None).await
    }

    /// [`call`](Self::call) for a request received from `remote_addr`.
    pub async fn call_from(&self, request: http::Request<Bytes>, remote_addr: Option<SocketAddr>) -> ResponseContext {
        let head = request.method() == Method::HEAD;
        let path = request.uri().path().to_owned();

        let response = if let Some((handler, params)) = self.lookup(request.method(), &path) {
            // Plain handlers have no route manager; they see their matchit
            // variables as the parameters of an `Unknown` target.
            let mut ctx = RequestContext::from_http(request, "", remote_addr);
            ctx.set_target(Some(Target::new(TargetType::Unknown, path).with_params(params)));
            handler.call(ctx).await
        } else if let Some(mount) = self.mounts.iter().find(|m| m.covers(&path)) {
            let ctx = RequestContext::from_http(request, &mount.prefix, remote_addr);
            mount.provider.handle(ctx).await
        } else {
            debug!(path, "no route or mount");
            helper::not_found("")
        };

        // HEAD keeps the GET headers, Content-Length included, minus the body.
        if head { response.without_body() } else { response }
    }

    /// Exact method first; `HEAD` falls back to the `GET` handler.
    fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let found = self.routes.get(method).and_then(|tree| tree.at(path).ok());
        let found = match found {
            None if *method == Method::HEAD => self.routes.get(&Method::GET).and_then(|tree| tree.at(path).ok()),
            found => found,
        }?;
        let params = found.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Some((Arc::clone(found.value), params))
    }
}
