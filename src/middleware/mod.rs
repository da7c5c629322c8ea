//! Provider filters.
//!
//! Filters see every request a [`Provider`] handles, after its target and
//! subject are resolved and before the request processor runs. Each filter
//! either answers the request itself or passes it on with
//! [`FilterChain::next`]:
//!
//! ```rust,ignore
//! impl Filter for RequireAuth {
//!     fn filter<'a>(&'a self, request: RequestContext, chain: FilterChain<'a>) -> BoxFuture<'a, ResponseContext> {
//!         if request.authorization().is_none() {
//!             return async { helper::unauthorized("") }.boxed();
//!         }
//!         chain.next(request)
//!     }
//! }
//! ```
//!
//! Built-in filters:
//! - [`Trace`]: per-request span with method, path, target, status, latency
//! - [`MethodOverride`]: `X-HTTP-Method-Override` on `POST`

mod method_override;
mod trace;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::provider::Provider;
use crate::request::RequestContext;
use crate::response::ResponseContext;

pub use method_override::MethodOverride;
pub use trace::Trace;

/// A step in the provider's request pipeline.
pub trait Filter: Send + Sync {
    fn filter<'a>(&'a self, request: RequestContext, chain: FilterChain<'a>) -> BoxFuture<'a, ResponseContext>;
}

/// The filters still to run, ending in [`Provider::process`].
#[derive(Clone, Copy)]
pub struct FilterChain<'a> {
    provider: &'a Provider,
    filters: &'a [std::sync::Arc<dyn Filter>],
}

impl<'a> FilterChain<'a> {
    pub(crate) fn new(provider: &'a Provider, filters: &'a [std::sync::Arc<dyn Filter>]) -> Self {
        Self { provider, filters }
    }

    /// Runs the next filter, or the provider once every filter has run.
    pub fn next(self, request: RequestContext) -> BoxFuture<'a, ResponseContext> {
        match self.filters.split_first() {
            Some((filter, rest)) => filter.filter(request, FilterChain { provider: self.provider, filters: rest }),
            None => {
                let provider = self.provider;
                async move { provider.process(&request).await }.boxed()
            }
        }
    }

    pub fn provider(&self) -> &'a Provider {
        self.provider
    }
}
