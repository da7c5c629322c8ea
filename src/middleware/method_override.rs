use futures::future::BoxFuture;
use http::Method;
use tracing::debug;

use super::{Filter, FilterChain};
use crate::request::RequestContext;
use crate::response::ResponseContext;

const OVERRIDE_HEADERS: [&str; 2] = ["x-http-method-override", "x-method-override"];

/// Lets clients that can only send `GET` and `POST` tunnel other methods
/// through a `POST` with `X-HTTP-Method-Override` (or `X-Method-Override`).
///
/// Only the configured methods may be tunnelled; by default `DELETE`,
/// `PUT`, `PATCH` and `HEAD`.
#[derive(Clone, Debug)]
pub struct MethodOverride {
    methods: Vec<Method>,
}

impl MethodOverride {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self { methods: methods.into_iter().collect() }
    }

    /// The method `request` should be treated as, if it carries an
    /// acceptable override.
    pub fn overridden(&self, request: &RequestContext) -> Option<Method> {
        if request.method() != Method::POST {
            return None;
        }
        let requested = OVERRIDE_HEADERS.iter().find_map(|h| request.header(*h))?;
        let method = Method::from_bytes(requested.trim().to_ascii_uppercase().as_bytes()).ok()?;
        self.methods.contains(&method).then_some(method)
    }
}

impl Default for MethodOverride {
    fn default() -> Self {
        Self::new([Method::DELETE, Method::PUT, Method::PATCH, Method::HEAD])
    }
}

impl Filter for MethodOverride {
    fn filter<'a>(&'a self, mut request: RequestContext, chain: FilterChain<'a>) -> BoxFuture<'a, ResponseContext> {
        if let Some(method) = self.overridden(&request) {
            debug!(%method, "method override");
            request.set_method(method);
        }
        chain.next(request)
    }
}
