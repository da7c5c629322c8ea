//! Target resolution and URL building over a set of named [`Route`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::adapter::CollectionAdapter;
use crate::error::Result;
use crate::request::RequestContext;
use crate::route::Route;
use crate::target::{Target, TargetType};

struct TargetRoute {
    route: Arc<Route>,
    target_type: TargetType,
    adapter: Option<Arc<dyn CollectionAdapter>>,
}

/// Resolves requests to [`Target`]s and builds URLs from route keys.
///
/// Routes registered with a target type take part in resolution, in
/// registration order. Every route, typed or not, can be used by
/// [`url_for`](Self::url_for).
#[derive(Default)]
pub struct RouteManager {
    routes: HashMap<String, Arc<Route>>,
    targets: Vec<TargetRoute>,
}

impl RouteManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and registers `pattern` under `key`. Pass `None` as the type
    /// for a route that is only used to build URLs.
    pub fn add_route(
        self,
        key: &str,
        pattern: &str,
        target_type: impl Into<Option<TargetType>>,
    ) -> Result<Self> {
        Ok(self.route(Route::new(key, pattern)?, target_type))
    }

    /// Registers `pattern` and binds every target it resolves to `adapter`.
    pub fn add_route_with_adapter(
        mut self,
        key: &str,
        pattern: &str,
        target_type: TargetType,
        adapter: Arc<dyn CollectionAdapter>,
    ) -> Result<Self> {
        let route = Arc::new(Route::new(key, pattern)?);
        self.routes.insert(key.to_owned(), Arc::clone(&route));
        self.targets.push(TargetRoute { route, target_type, adapter: Some(adapter) });
        Ok(self)
    }

    /// Registers an already compiled route, e.g. one with defaults or
    /// requirements.
    pub fn route(mut self, route: Route, target_type: impl Into<Option<TargetType>>) -> Self {
        let route = Arc::new(route);
        self.routes.insert(route.key().to_owned(), Arc::clone(&route));
        if let Some(target_type) = target_type.into() {
            self.targets.push(TargetRoute { route, target_type, adapter: None });
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Route> {
        self.routes.get(key).map(Arc::as_ref)
    }

    /// Resolves the request's target path (query stripped).
    pub fn resolve(&self, request: &RequestContext) -> Option<Target> {
        self.resolve_path(request.target_path())
    }

    /// Exact pattern matches win; otherwise the first matching route in
    /// registration order.
    pub fn resolve_path(&self, path: &str) -> Option<Target> {
        let path = path.split_once('?').map_or(path, |(p, _)| p);
        let found = self
            .targets
            .iter()
            .find(|t| t.route.pattern() == path)
            .or_else(|| self.targets.iter().find(|t| t.route.matches(path)));
        let Some(found) = found else {
            debug!(path, "no route matches");
            return None;
        };
        let mut target = Target::new(found.target_type.clone(), path)
            .with_route_key(found.route.key())
            .with_params(found.route.parse(path));
        if let Some(adapter) = &found.adapter {
            target = target.with_adapter(Arc::clone(adapter));
        }
        Some(target)
    }

    /// Context path plus the expanded route `key`. Route variables missing
    /// from `params` come from the request's current target.
    pub fn url_for(&self, request: &RequestContext, key: &str, params: &[(&str, &str)]) -> Option<String> {
        let route = self.routes.get(key)?;
        let mut merged: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.trim_start_matches(':').to_owned(), (*v).to_owned()))
            .collect();
        if let Some(target) = request.target() {
            for var in route.variables() {
                let supplied = merged.iter().any(|(k, v)| k == var && !v.is_empty());
                if supplied {
                    continue;
                }
                if let Some(value) = target.parameter(var) {
                    merged.push((var.clone(), value.to_owned()));
                }
            }
        }
        Some(format!("{}{}", request.context_path(), route.expand(merged)))
    }

    /// [`url_for`](Self::url_for) prefixed with the request's base URI.
    pub fn absolute_url_for(
        &self,
        request: &RequestContext,
        key: &str,
        params: &[(&str, &str)],
    ) -> Option<String> {
        self.url_for(request, key, params).map(|url| format!("{}{url}", request.base_uri()))
    }
}
