//! Plain route handlers and their type erasure.
//!
//! Routes that are not AtomPub targets (health probes, static documents)
//! are served by ordinary async functions:
//!
//! ```text
//! async fn ping(req: RequestContext) -> impl IntoResponse   ← user writes this
//!        ↓ router.on(Method::GET, "/ping", ping)
//! Arc::new(FnHandler(ping))                                 ← BoxedHandler
//!        ↓
//! handler.call(req) at request time                         ← one vtable call
//! ```
//!
//! Path variables are exposed through [`RequestContext::parameter`].

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::request::RequestContext;
use crate::response::{IntoResponse, ResponseContext};

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: RequestContext) -> BoxFuture<'static, ResponseContext>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every `async fn(RequestContext) -> impl IntoResponse`.
///
/// Sealed: only the blanket impl below satisfies it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: RequestContext) -> BoxFuture<'static, ResponseContext> {
        let fut = (self.0)(req);
        async move { fut.await.into_response() }.boxed()
    }
}
