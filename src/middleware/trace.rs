use std::time::Instant;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{Instrument, field, info, info_span};

use super::{Filter, FilterChain};
use crate::request::RequestContext;
use crate::response::ResponseContext;

/// Wraps each request in a `request` span and logs its completion with the
/// status and latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Filter for Trace {
    fn filter<'a>(&'a self, request: RequestContext, chain: FilterChain<'a>) -> BoxFuture<'a, ResponseContext> {
        let target = request.target().map_or("NONE".to_owned(), |t| t.target_type().to_string());
        let span = info_span!(
            "request",
            method = %request.method(),
            path = %request.target_path(),
            target = %target,
            status = field::Empty,
            latency_ms = field::Empty,
        );
        let started = Instant::now();
        let recorder = span.clone();
        async move {
            let response = chain.next(request).await;
            let status = response.status().as_u16();
            let latency_ms = started.elapsed().as_millis() as u64;
            recorder.record("status", status);
            recorder.record("latency_ms", latency_ms);
            info!(status, latency_ms, "request completed");
            response
        }
        .instrument(span)
        .boxed()
    }
}
