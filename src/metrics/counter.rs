use tokio::time::Instant;

use super::{Mean, RequestSample};

// ─── Public types ────────────────────────────────────────────────

/// Request totals for exactly one measurement period.
///
/// The engine owns the only live instance. At a period boundary it reads
/// the rates and replaces the counter with a fresh one; the old value is
/// simply dropped.
#[derive(Debug, Clone)]
pub struct IntervalCounter {
    started: Instant,
    requests: u64,
    response_time: Mean,
    request_bytes: Mean,
    response_bytes: Mean,
}

/// Rates derived from one closed period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestRates {
    pub elapsed_ms: f64,
    pub requests_per_sec: f64,
    /// Mean handler time (ms)
    pub response_time_ms: f64,
    pub mean_request_bytes: f64,
    pub mean_response_bytes: f64,
    /// Request bytes per elapsed millisecond, i.e. KB/s
    pub rx_kbs: f64,
    /// Response bytes per elapsed millisecond, i.e. KB/s
    pub tx_kbs: f64,
}

// ─── IntervalCounter impl ────────────────────────────────────────

impl IntervalCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(started: Instant) -> Self {
        Self {
            started,
            requests: 0,
            response_time: Mean::new(),
            request_bytes: Mean::new(),
            response_bytes: Mean::new(),
        }
    }

    pub fn record(&mut self, sample: &RequestSample) {
        self.requests += 1;
        self.response_time.push(sample.elapsed_ms);
        self.request_bytes.push(sample.request_bytes as f64);
        self.response_bytes.push(sample.response_bytes as f64);
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn response_time(&self) -> &Mean {
        &self.response_time
    }

    pub fn request_bytes(&self) -> &Mean {
        &self.request_bytes
    }

    pub fn response_bytes(&self) -> &Mean {
        &self.response_bytes
    }

    /// Derive the period's rates as of `now`. A zero-length period reports
    /// zero rates rather than dividing by zero.
    pub fn rates(&self, now: Instant) -> RequestRates {
        let elapsed_ms = now.saturating_duration_since(self.started).as_secs_f64() * 1000.0;
        let per_ms = |total: f64| {
            if elapsed_ms > 0.0 {
                total / elapsed_ms
            } else {
                0.0
            }
        };

        RequestRates {
            elapsed_ms,
            requests_per_sec: per_ms(self.requests as f64 * 1000.0),
            response_time_ms: self.response_time.mean(),
            mean_request_bytes: self.request_bytes.mean(),
            mean_response_bytes: self.response_bytes.mean(),
            rx_kbs: per_ms(self.request_bytes.sum()),
            tx_kbs: per_ms(self.response_bytes.sum()),
        }
    }
}

impl Default for IntervalCounter {
    fn default() -> Self {
        Self::new()
    }
}
