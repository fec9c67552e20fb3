use tokio::time::Instant;

use super::ServerHandle;
use crate::error::ProbeError;

/// Time, in microseconds, the calling task waits after yielding to the
/// back of the runtime's queue. Grows with the backlog of ready tasks
/// ahead of it, not with CPU work done by the probe itself.
pub async fn scheduler_latency() -> u64 {
    let yielded = Instant::now();
    tokio::task::yield_now().await;
    (yielded.elapsed().as_secs_f64() * 1_000_000.0).round() as u64
}

/// Pass-through query of the server's open connections.
pub async fn connection_count(server: &dyn ServerHandle) -> Result<usize, ProbeError> {
    server.connection_count().await
}
