//! axum side of the server-handle contract: request events come from the
//! [`track_request`] middleware, live connections from a counting make
//! service handed to `axum::serve`.

use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::{
    extract::Request, middleware::from_fn_with_state, response::Response, serve::IncomingStream,
    Router,
};
use parking_lot::RwLock;
use tower::Service;

use crate::engine::RequestRecorder;
use crate::error::ProbeError;
use crate::metrics::RequestSample;
use crate::middleware::track_request;
use crate::probes::ServerHandle;

// ─── HttpStats ───────────────────────────────────────────────────

/// Shared instrumentation state for one axum server.
///
/// ```no_run
/// # use statsbeat::HttpStats;
/// # async fn demo(router: axum::Router) -> std::io::Result<()> {
/// let stats = HttpStats::new();
/// let app = stats.instrument(router);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, stats.make_service(app)).await
/// # }
/// ```
#[derive(Clone, Default)]
pub struct HttpStats {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    recorder: RwLock<Option<RequestRecorder>>,
    live: AtomicUsize,
}

impl HttpStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// This server as the engine sees it.
    pub fn handle(&self) -> Arc<dyn ServerHandle> {
        Arc::new(self.clone())
    }

    /// Add the request listener to `router`.
    pub fn instrument(&self, router: Router) -> Router {
        router.layer(from_fn_with_state(self.clone(), track_request))
    }

    /// Make service for `axum::serve` that counts open connections.
    pub fn make_service(&self, router: Router) -> CountedService {
        CountedService {
            router,
            stats: self.clone(),
        }
    }

    /// Forward one completed request to the subscribed engine, if any.
    pub fn record(&self, sample: RequestSample) {
        if let Some(recorder) = self.inner.recorder.read().as_ref() {
            recorder.record(sample);
        }
    }

    pub fn live_connections(&self) -> usize {
        self.inner.live.load(Ordering::Relaxed)
    }

    /// Account for a connection opened outside [`make_service`](Self::make_service).
    /// The count drops again when the guard is dropped.
    pub fn open_connection(&self) -> ConnectionGuard {
        self.inner.live.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            inner: self.inner.clone(),
        }
    }
}

#[async_trait]
impl ServerHandle for HttpStats {
    fn subscribe(&self, recorder: RequestRecorder) {
        *self.inner.recorder.write() = Some(recorder);
    }

    async fn connection_count(&self) -> Result<usize, ProbeError> {
        Ok(self.live_connections())
    }
}

/// Keeps one connection counted while alive.
pub struct ConnectionGuard {
    inner: Arc<Inner>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.inner.live.fetch_sub(1, Ordering::Relaxed);
    }
}

// ─── Connection counting ─────────────────────────────────────────

/// Make service returned by [`HttpStats::make_service`].
#[derive(Clone)]
pub struct CountedService {
    router: Router,
    stats: HttpStats,
}

impl<'a> Service<IncomingStream<'a>> for CountedService {
    type Response = CountedConnection;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _stream: IncomingStream<'a>) -> Self::Future {
        ready(Ok(CountedConnection {
            router: self.router.clone(),
            _guard: Arc::new(self.stats.open_connection()),
        }))
    }
}

/// Per-connection service. Every clone shares the guard, so the
/// connection stops being counted once hyper drops the last of them.
#[derive(Clone)]
pub struct CountedConnection {
    router: Router,
    _guard: Arc<ConnectionGuard>,
}

impl Service<Request> for CountedConnection {
    type Response = Response;
    type Error = Infallible;
    type Future = <Router as Service<Request>>::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Service::<Request>::poll_ready(&mut self.router, cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        Service::<Request>::call(&mut self.router, req)
    }
}
