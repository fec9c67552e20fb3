use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

use crate::AppState;
use statsbeat::Snapshot;

/// Snapshot plus the time it was taken, as served to HTTP clients.
#[derive(Debug, Clone, Serialize)]
pub struct StatsView {
    pub taken_at: DateTime<Utc>,
    pub metrics: Snapshot,
}

impl From<Snapshot> for StatsView {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            taken_at: snapshot.taken_at(),
            metrics: snapshot,
        }
    }
}

// ─── GET /api/stats ──────────────────────────────────────────────
/// Latest snapshot as JSON (`null` before the first tick).

pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<Option<StatsView>> {
    Json(state.latest.borrow().clone().map(StatsView::from))
}

// ─── GET /api/stats/stream ───────────────────────────────────────
/// Server-Sent Events endpoint.
/// Pushes every new snapshot as JSON as soon as the engine emits it.

pub async fn stats_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = WatchStream::new(state.latest.clone()).filter_map(|latest| {
        let view = StatsView::from(latest?);
        let json = serde_json::to_string(&view).unwrap_or_default();
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
