//! HTTP server and graceful shutdown.
//!
//! On SIGTERM or Ctrl-C the server:
//! 1. stops accepting connections,
//! 2. lets every in-flight connection task run to completion,
//! 3. returns from [`Server::serve`].
//!
//! Under an orchestrator that sends SIGTERM and then waits a grace period
//! before killing the process, make that period longer than the slowest
//! request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::helper;
use crate::response::ResponseContext;
use crate::router::Router;

/// Request bodies larger than this are refused with 413 unless
/// [`Server::max_body`] says otherwise.
pub const DEFAULT_MAX_BODY: usize = 8 * 1024 * 1024;

/// The HTTP server.
#[derive(Debug)]
pub struct Server {
    addr: SocketAddr,
    max_body: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Fails with [`Error::InvalidAddress`] unless `addr` is a
    /// `host:port` socket address.
    pub fn bind(addr: &str) -> Result<Self> {
        let addr = addr.parse().map_err(|_| Error::InvalidAddress(addr.to_owned()))?;
        Ok(Self { addr, max_body: DEFAULT_MAX_BODY })
    }

    /// Caps buffered request bodies at `bytes`. Larger bodies get 413.
    pub fn max_body(mut self, bytes: usize) -> Self {
        self.max_body = bytes;
        self
    }

    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Accepts connections and dispatches them through `router` until a
    /// shutdown signal arrives and every in-flight connection has finished.
    pub async fn serve(self, router: Router) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;

        // Shared by every connection task; the routing tables and mounted
        // providers are never copied.
        let router = Arc::new(router);
        let max_body = self.max_body;

        info!(addr = %self.addr, max_body, "abdera listening");

        // Every connection task lands here so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        // `select!` polls the same shutdown future on every iteration, so it
        // has to stay put in memory: pin it on the stack.
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Poll arms in order. Shutdown comes first so a pending
                // signal wins over a backlog of queued connections.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    // hyper has its own IO traits; TokioIo bridges tokio's
                    // AsyncRead/AsyncWrite to them.
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // One service per connection. hyper calls the closure
                        // for each request on it, HTTP/1.1 keep-alive and
                        // HTTP/2 streams alike.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, remote_addr, max_body).await }
                        });

                        // The auto builder speaks whichever of HTTP/1.1 and
                        // HTTP/2 the client opens with.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connections as we go; otherwise the JoinSet
                // holds every completed task until shutdown.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        // Drain: the listener is closed, wait out what is still running.
        while tasks.join_next().await.is_some() {}

        info!("abdera stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Buffers the request body and hands the request to the router.
///
/// Infallible: unreadable or oversized bodies and everything the router
/// reports become responses, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<hyper::body::Incoming>,
    remote_addr: SocketAddr,
    max_body: usize,
) -> std::result::Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match read_body(body, max_body, remote_addr).await {
        Ok(body) => body,
        Err(response) => return Ok(response.into_inner()),
    };
    let response = router.call_from(http::Request::from_parts(parts, body), Some(remote_addr)).await;
    Ok(response.into_inner())
}

/// Collects at most `limit` bytes of `body`.
async fn read_body<B>(body: B, limit: usize, peer: SocketAddr) -> std::result::Result<Bytes, ResponseContext>
where
    B: Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(%peer, limit, "request body too large");
            Err(helper::payload_too_large(&format!("request body exceeds {limit} bytes")))
        }
        Err(e) => {
            warn!(%peer, "failed to read request body: {e}");
            Err(helper::bad_request("unreadable request body"))
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. Only Ctrl-C exists off Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    // Never resolves, which disables the arm below.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 4000))
    }

    #[test]
    fn bind_rejects_bad_addresses() {
        let server = Server::bind("127.0.0.1:8080").unwrap();
        assert_eq!(server.addr().port(), 8080);
        assert_eq!(server.max_body, DEFAULT_MAX_BODY);
        assert_eq!(server.max_body(16).max_body, 16);
        assert!(matches!(Server::bind("localhost"), Err(Error::InvalidAddress(a)) if a == "localhost"));
    }

    #[tokio::test]
    async fn bodies_within_the_limit_are_collected() {
        let body = read_body(Full::new(Bytes::from_static(b"<entry/>")), 8, peer()).await.unwrap();
        assert_eq!(body.as_ref(), b"<entry/>");
    }

    #[tokio::test]
    async fn oversized_bodies_are_refused() {
        let res = read_body(Full::new(Bytes::from_static(b"<entry/>!")), 8, peer()).await.unwrap_err();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(res.content_type(), Some("application/xml"));
    }
}
