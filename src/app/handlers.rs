use axum::{body::Bytes, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Hello {
    pub message: &'static str,
}

// ─── GET /api/hello ──────────────────────────────────────────────

pub async fn hello() -> Json<Hello> {
    Json(Hello {
        message: "hello from statsbeat",
    })
}

// ─── POST /api/echo ──────────────────────────────────────────────
/// Returns the request body unchanged, so request and response sizes
/// track each other in the snapshot.

pub async fn echo(body: Bytes) -> Bytes {
    body
}
