use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{header::CONTENT_LENGTH, HeaderMap},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::metrics::RequestSample;
use crate::server::HttpStats;

/// Request listener for axum: times the inner service and reports one
/// [`RequestSample`] per completed request to whichever engine is
/// subscribed to `stats`.
///
/// Sizes are body sizes: the exact size hint when the body knows it,
/// otherwise `Content-Length`, otherwise the hint's lower bound.
pub async fn track_request(State(stats): State<HttpStats>, req: Request, next: Next) -> Response {
    let request_bytes = {
        let hint = req.body().size_hint();
        body_bytes(req.headers(), hint.exact(), hint.lower())
    };

    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed = start.elapsed();

    let response_bytes = {
        let hint = response.body().size_hint();
        body_bytes(response.headers(), hint.exact(), hint.lower())
    };

    stats.record(RequestSample {
        elapsed_ms: elapsed.as_secs_f64() * 1000.0,
        request_bytes,
        response_bytes,
    });

    response
}

fn body_bytes(headers: &HeaderMap, exact: Option<u64>, lower: u64) -> u64 {
    exact.or_else(|| content_length(headers)).unwrap_or(lower)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(CONTENT_LENGTH)?.to_str().ok()?.trim().parse().ok()
}
