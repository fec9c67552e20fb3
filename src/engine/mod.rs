//! The snapshot engine: one owner task per running engine that folds in
//! request samples, runs one measurement cycle per tick and delivers the
//! result.

mod recorder;
mod sampler;

pub use recorder::{RequestRecorder, DEFAULT_QUEUE_CAPACITY};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{FeatureSet, StatsConfig};
use crate::error::StatsError;
use crate::metrics::{RequestSample, Snapshot};
use crate::probes::{HostProbe, ServerHandle, SysinfoProbe};

use recorder::RequestQueue;
#[cfg(test)]
pub(crate) use recorder::channel as test_channel;
use sampler::{Sampler, SharedHost};

// ─── Observer ────────────────────────────────────────────────────

/// Single subscriber for finished snapshots.
///
/// Called on the engine task; it must not block for long and must not
/// register a new observer on the same engine from inside the callback.
pub trait SnapshotObserver: Send {
    fn on_snapshot(&mut self, snapshot: Snapshot);
}

impl<F> SnapshotObserver for F
where
    F: FnMut(Snapshot) + Send,
{
    fn on_snapshot(&mut self, snapshot: Snapshot) {
        self(snapshot)
    }
}

type SharedObserver = Arc<Mutex<Option<Box<dyn SnapshotObserver>>>>;

// ─── StatsEngine ─────────────────────────────────────────────────

/// Periodic sampler. Build it from a resolved [`StatsConfig`], optionally
/// register an observer, then [`start`](Self::start) it inside a tokio
/// runtime.
pub struct StatsEngine {
    config: StatsConfig,
    host: SharedHost,
    observer: SharedObserver,
    queue_capacity: usize,
    running: Option<Running>,
}

struct Running {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StatsEngine {
    /// Engine reading the current process through [`SysinfoProbe`].
    pub fn new(config: StatsConfig) -> Result<Self, StatsError> {
        Ok(Self::with_host_probe(config, SysinfoProbe::new()?))
    }

    /// Engine configured from the `STATS_BEAT` environment variable.
    pub fn from_env() -> Result<Self, StatsError> {
        Self::new(StatsConfig::resolve(None)?)
    }

    pub fn with_host_probe(config: StatsConfig, probe: impl HostProbe + 'static) -> Self {
        Self {
            config,
            host: Arc::new(Mutex::new(Box::new(probe))),
            observer: Arc::new(Mutex::new(None)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            running: None,
        }
    }

    /// Bound of the request queue between the listener and the engine.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Register the observer, replacing any previous one. From the next
    /// tick on snapshots go here instead of the log.
    pub fn on_snapshot(&self, observer: impl SnapshotObserver + 'static) {
        *self.observer.lock() = Some(Box::new(observer));
    }

    /// Remove the observer; snapshots go back to the log.
    pub fn clear_observer(&self) {
        *self.observer.lock() = None;
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Features that would actually be sampled with or without a server.
    pub fn effective_features(&self, has_server: bool) -> FeatureSet {
        self.config.features.effective(has_server)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }

    /// Arm the timer. Without a `server` every server-dependent metric is
    /// switched off. A non-positive period leaves the engine idle and is
    /// not an error.
    pub fn start(&mut self, server: Option<Arc<dyn ServerHandle>>) -> Result<(), StatsError> {
        if self.is_running() {
            return Err(StatsError::AlreadyRunning);
        }
        let Some(period) = self.config.interval() else {
            debug!(period = self.config.period, "stats period not positive, engine stays idle");
            return Ok(());
        };
        let runtime = Handle::try_current()?;

        let sampler = Sampler::new(self.config.features, self.host.clone(), server.clone());
        let features = sampler.features();

        let queue = match &server {
            Some(server) if features.intersects(FeatureSet::REQUEST_DERIVED) => {
                let (recorder, queue) = recorder::channel(self.queue_capacity);
                server.subscribe(recorder);
                Some(queue)
            }
            _ => None,
        };

        let first_tick = Instant::now()
            .checked_add(period)
            .ok_or(StatsError::PeriodOutOfRange(period))?;

        let (stop, stop_rx) = watch::channel(false);
        let task = runtime.spawn(run(
            first_tick,
            period,
            sampler,
            queue,
            self.observer.clone(),
            stop_rx,
        ));

        info!(
            period_secs = period.as_secs_f64(),
            features = ?features,
            "stats engine started"
        );
        self.running = Some(Running { stop, task });
        Ok(())
    }

    /// Cancel future ticks. An in-flight cycle still completes; no final
    /// snapshot is flushed. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop.send(true);
            debug!("stats engine stopped");
        }
    }
}

impl Drop for StatsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─── Engine task ─────────────────────────────────────────────────

/// Owner loop. The cycle is awaited inline, so at most one is in flight;
/// ticks that come due meanwhile are skipped, and samples that arrive
/// meanwhile wait in the queue for the next period.
async fn run(
    first_tick: Instant,
    period: Duration,
    mut sampler: Sampler,
    mut queue: Option<RequestQueue>,
    observer: SharedObserver,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = stop.changed() => break,

            _ = ticker.tick() => {
                if let Some(queue) = queue.as_mut() {
                    for sample in queue.drain() {
                        sampler.record(&sample);
                    }
                    let dropped = queue.take_dropped();
                    if dropped > 0 {
                        warn!(dropped, "request queue full, samples discarded this period");
                    }
                }

                match sampler.collect().await {
                    Ok(snapshot) => deliver(&observer, snapshot),
                    Err(err) => error!(error = %err, "stats cycle failed, snapshot skipped"),
                }
            }

            Some(sample) = next_sample(&mut queue) => sampler.record(&sample),
        }
    }
}

async fn next_sample(queue: &mut Option<RequestQueue>) -> Option<RequestSample> {
    match queue {
        Some(queue) => queue.recv().await,
        None => std::future::pending().await,
    }
}

fn deliver(observer: &SharedObserver, snapshot: Snapshot) {
    let mut observer = observer.lock();
    match observer.as_mut() {
        Some(observer) => observer.on_snapshot(snapshot),
        None => info!(target: "statsbeat", "{}", snapshot.to_json()),
    }
}
