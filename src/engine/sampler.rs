use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::FeatureSet;
use crate::error::ProbeError;
use crate::metrics::{labels, CpuGauge, IntervalCounter, MetricValue, RequestSample, Snapshot};
use crate::probes::{latency, HostProbe, ServerHandle};

pub(crate) type SharedHost = Arc<Mutex<Box<dyn HostProbe>>>;

const BYTES_PER_MB: f64 = 1_000_000.0;

// ─── Sampler ─────────────────────────────────────────────────────

/// Per-period state owned by the engine task: the live request counter,
/// the CPU baseline and the probes. Only the owning task touches it, so
/// one cycle cannot interleave with another.
pub(crate) struct Sampler {
    features: FeatureSet,
    host: SharedHost,
    server: Option<Arc<dyn ServerHandle>>,
    counter: IntervalCounter,
    cpu: CpuGauge,
}

impl Sampler {
    pub(crate) fn new(
        features: FeatureSet,
        host: SharedHost,
        server: Option<Arc<dyn ServerHandle>>,
    ) -> Self {
        let cpu_time = host.lock().cpu_time();
        Self {
            features: features.effective(server.is_some()),
            host,
            server,
            counter: IntervalCounter::new(),
            cpu: CpuGauge::new(cpu_time, std::time::Instant::now()),
        }
    }

    pub(crate) fn features(&self) -> FeatureSet {
        self.features
    }

    pub(crate) fn record(&mut self, sample: &RequestSample) {
        self.counter.record(sample);
    }

    /// Run one full cycle: synchronous reads, concurrent async probes,
    /// merge. The period closes even when a probe fails, so a failed tick
    /// never leaks its requests into the next one.
    pub(crate) async fn collect(&mut self) -> Result<Snapshot, ProbeError> {
        let now = Instant::now();
        let mut snapshot = Snapshot::new(Utc::now());

        self.read_host(&mut snapshot);
        self.read_requests(&mut snapshot, now);
        let probed = self.read_async().await;

        self.counter = IntervalCounter::starting_at(now);

        let (evloop, numconn) = probed?;
        if let Some(us) = evloop {
            snapshot.push(labels::EVLOOP, MetricValue::Int(us as i64));
        }
        if let Some(count) = numconn {
            snapshot.push(labels::NUMCONN, MetricValue::Int(count as i64));
        }
        Ok(snapshot)
    }

    fn read_host(&mut self, snapshot: &mut Snapshot) {
        let f = self.features;
        let mut host = self.host.lock();

        if f.contains(FeatureSet::SYSLOAD) {
            let cores = host.cpu_count().max(1) as f64;
            let load = host.load_average() / cores * 100.0;
            snapshot.push(labels::SYSLOAD, MetricValue::rounded(load));
        }
        if f.contains(FeatureSet::FREEMEM) {
            let free = host.available_memory() as f64 / BYTES_PER_MB;
            snapshot.push(labels::FREEMEM, MetricValue::rounded(free));
        }
        if f.contains(FeatureSet::CPU) {
            let pct = self.cpu.read(host.cpu_time(), std::time::Instant::now());
            snapshot.push(labels::CPU, MetricValue::rounded(pct));
        }
        if f.intersects(FeatureSet::RSS | FeatureSet::HEAP) {
            let mem = host.process_memory();
            if f.contains(FeatureSet::RSS) {
                snapshot.push(labels::RSS, MetricValue::rounded(mem.rss as f64 / BYTES_PER_MB));
            }
            if f.contains(FeatureSet::HEAP) {
                snapshot.push(labels::HEAP, MetricValue::rounded(mem.heap as f64 / BYTES_PER_MB));
            }
        }
    }

    fn read_requests(&self, snapshot: &mut Snapshot, now: Instant) {
        let f = self.features;
        if !f.intersects(FeatureSet::REQUEST_DERIVED) {
            return;
        }
        let rates = self.counter.rates(now);

        if f.contains(FeatureSet::RPS) {
            snapshot.push(labels::RPS, MetricValue::rounded(rates.requests_per_sec));
        }
        if f.contains(FeatureSet::RESTIME) {
            snapshot.push(labels::RESTIME, MetricValue::Float(rates.response_time_ms));
        }
        if f.contains(FeatureSet::REQBYTES) {
            snapshot.push(labels::REQBYTES, MetricValue::rounded(rates.mean_request_bytes));
        }
        if f.contains(FeatureSet::RESBYTES) {
            snapshot.push(labels::RESBYTES, MetricValue::rounded(rates.mean_response_bytes));
        }
        if f.contains(FeatureSet::RXRATE) {
            snapshot.push(labels::RXRATE, MetricValue::rounded(rates.rx_kbs));
        }
        if f.contains(FeatureSet::TXRATE) {
            snapshot.push(labels::TXRATE, MetricValue::rounded(rates.tx_kbs));
        }
    }

    /// Both probes run concurrently and both are awaited, even when one
    /// fails early.
    async fn read_async(&self) -> Result<(Option<u64>, Option<usize>), ProbeError> {
        let evloop = async {
            if self.features.contains(FeatureSet::EVLOOP) {
                Some(latency::scheduler_latency().await)
            } else {
                None
            }
        };
        let numconn = async {
            match &self.server {
                Some(server) if self.features.contains(FeatureSet::NUMCONN) => {
                    latency::connection_count(server.as_ref()).await.map(Some)
                }
                _ => Ok(None),
            }
        };

        let (evloop, numconn) = tokio::join!(evloop, numconn);
        Ok((evloop, numconn?))
    }
}
