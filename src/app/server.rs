use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use super::{handlers, stream};
use crate::AppState;
use statsbeat::HttpStats;

/// Builds the demo `Router`: a couple of endpoints to generate traffic,
/// the stats endpoints, and the request listener on top.
pub fn create_router(state: Arc<AppState>, stats: &HttpStats) -> Router {
    let router = Router::new()
        // ── Traffic endpoints ───────────────────────────────────
        .route("/api/hello", get(handlers::hello))
        .route("/api/echo", post(handlers::echo))
        // ── Stats ───────────────────────────────────────────────
        .route("/api/stats", get(stream::get_stats))
        .route("/api/stats/stream", get(stream::stats_stream))
        // ── Provide shared state to all routes above ────────────
        .with_state(state);

    // Global middleware (applied bottom-up)
    stats.instrument(router).layer(CorsLayer::permissive())
}
