pub mod accumulator;
pub mod counter;
pub mod cpu;
pub mod snapshot;

pub use accumulator::Mean;
pub use counter::{IntervalCounter, RequestRates};
pub use cpu::CpuGauge;
pub use snapshot::{labels, MetricValue, Snapshot};

/// One completed request, as reported by the request listener.
/// This is the "write" side: the HTTP middleware builds these and pushes
/// them towards the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestSample {
    /// Handler wall time in milliseconds (fractional)
    pub elapsed_ms: f64,
    /// Request body size in bytes
    pub request_bytes: u64,
    /// Response body size in bytes
    pub response_bytes: u64,
}
