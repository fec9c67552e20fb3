#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use statsbeat::{HostProbe, ProbeError, ProcessMemory, RequestRecorder, RequestSample, ServerHandle};

/// Host probe with fixed, easy-to-check readings.
pub struct FixedHost;

impl HostProbe for FixedHost {
    fn load_average(&mut self) -> f64 {
        2.0
    }

    fn cpu_count(&self) -> usize {
        4
    }

    fn available_memory(&mut self) -> u64 {
        2_000_000_000
    }

    fn process_memory(&mut self) -> ProcessMemory {
        ProcessMemory {
            rss: 50_000_000,
            heap: 20_000_000,
        }
    }

    fn cpu_time(&mut self) -> Duration {
        Duration::ZERO
    }
}

/// What the mock server does when the engine asks for its connections.
pub enum OnQuery {
    Report(usize),
    /// Fail the next `n` queries, then report 0.
    FailTimes(usize),
    /// Record this sample through the subscribed recorder while the query
    /// is in flight, then report 1.
    RecordDuring(RequestSample),
}

pub struct MockServer {
    recorder: Mutex<Option<RequestRecorder>>,
    on_query: Mutex<OnQuery>,
    pub queries: AtomicUsize,
}

impl MockServer {
    pub fn new(on_query: OnQuery) -> Self {
        Self {
            recorder: Mutex::new(None),
            on_query: Mutex::new(on_query),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.recorder.lock().is_some()
    }

    pub fn request(&self, sample: RequestSample) {
        let recorder = self.recorder.lock().clone().expect("engine subscribed");
        recorder.record(sample);
    }
}

#[async_trait]
impl ServerHandle for MockServer {
    fn subscribe(&self, recorder: RequestRecorder) {
        *self.recorder.lock() = Some(recorder);
    }

    async fn connection_count(&self) -> Result<usize, ProbeError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut on_query = self.on_query.lock();
        let injected = match *on_query {
            OnQuery::Report(n) => return Ok(n),
            OnQuery::FailTimes(0) => return Ok(0),
            OnQuery::FailTimes(ref mut n) => {
                *n -= 1;
                return Err(ProbeError::connections("listener closed"));
            }
            OnQuery::RecordDuring(sample) => sample,
        };
        *on_query = OnQuery::Report(1);
        drop(on_query);

        self.request(injected);
        Ok(1)
    }
}

pub fn sample(elapsed_ms: f64, request_bytes: u64, response_bytes: u64) -> RequestSample {
    RequestSample {
        elapsed_ms,
        request_bytes,
        response_bytes,
    }
}
