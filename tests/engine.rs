//! Timer-driven engine behaviour, run on tokio's paused clock.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use common::{sample, FixedHost, MockServer, OnQuery};
use statsbeat::metrics::labels;
use statsbeat::{
    FeatureSet, MetricValue, ProbeError, RequestRecorder, ServerHandle, Snapshot, StatsConfig,
    StatsEngine, StatsError,
};

fn engine(config: StatsConfig) -> (StatsEngine, mpsc::UnboundedReceiver<Snapshot>) {
    let engine = StatsEngine::with_host_probe(config, FixedHost);
    let (tx, rx) = mpsc::unbounded_channel();
    engine.on_snapshot(move |snapshot: Snapshot| {
        let _ = tx.send(snapshot);
    });
    (engine, rx)
}

fn handle<S: ServerHandle + 'static>(server: &Arc<S>) -> Option<Arc<dyn ServerHandle>> {
    Some(server.clone() as Arc<dyn ServerHandle>)
}

// =============================================================================
// End-to-end periods
// =============================================================================

#[tokio::test(start_paused = true)]
async fn one_request_then_an_empty_period() {
    let server = Arc::new(MockServer::new(OnQuery::Report(0)));
    let config = StatsConfig::new(1.0).enable(
        FeatureSet::SYSLOAD
            | FeatureSet::FREEMEM
            | FeatureSet::RPS
            | FeatureSet::RESTIME
            | FeatureSet::REQBYTES
            | FeatureSet::RESBYTES,
    );
    let (mut engine, mut rx) = engine(config);
    engine.start(handle(&server)).unwrap();
    assert!(server.is_subscribed());

    server.request(sample(50.0, 100, 200));

    let first = rx.recv().await.unwrap();
    assert_eq!(first.get(labels::SYSLOAD), Some(MetricValue::Int(50)));
    assert_eq!(first.get(labels::FREEMEM), Some(MetricValue::Int(2000)));
    assert_eq!(first.get(labels::RPS), Some(MetricValue::Int(1)));
    assert_eq!(first.get(labels::RESTIME), Some(MetricValue::Float(50.0)));
    assert_eq!(first.get(labels::REQBYTES), Some(MetricValue::Int(100)));
    assert_eq!(first.get(labels::RESBYTES), Some(MetricValue::Int(200)));

    let second = rx.recv().await.unwrap();
    assert_eq!(second.get(labels::RPS), Some(MetricValue::Int(0)));
    assert_eq!(second.get(labels::RESTIME), Some(MetricValue::Float(0.0)));
    assert_eq!(second.get(labels::REQBYTES), Some(MetricValue::Int(0)));
    assert_eq!(second.get(labels::RESBYTES), Some(MetricValue::Int(0)));
    assert!(second.taken_at() >= first.taken_at());

    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn byte_rates_use_the_period_length() {
    let server = Arc::new(MockServer::new(OnQuery::Report(3)));
    let config = StatsConfig::new(2.0).enable(FeatureSet::SERVER_DEPENDENT);
    let (mut engine, mut rx) = engine(config);
    engine.start(handle(&server)).unwrap();

    server.request(sample(10.0, 3_000, 10_000));
    server.request(sample(20.0, 1_000, 2_000));

    let snap = rx.recv().await.unwrap();
    let labels: Vec<_> = snap.labels().collect();
    assert_eq!(
        labels,
        vec![
            labels::RPS,
            labels::RESTIME,
            labels::REQBYTES,
            labels::RESBYTES,
            labels::RXRATE,
            labels::TXRATE,
            labels::NUMCONN
        ]
    );
    assert_eq!(snap.get(labels::RPS), Some(MetricValue::Int(1)));
    assert_eq!(snap.get(labels::RESTIME), Some(MetricValue::Float(15.0)));
    assert_eq!(snap.get(labels::RXRATE), Some(MetricValue::Int(2)));
    assert_eq!(snap.get(labels::TXRATE), Some(MetricValue::Int(6)));
    assert_eq!(snap.get(labels::NUMCONN), Some(MetricValue::Int(3)));
}

// =============================================================================
// Period boundaries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn request_during_a_cycle_lands_in_the_next_period() {
    let server = Arc::new(MockServer::new(OnQuery::RecordDuring(sample(10.0, 300, 400))));
    let config =
        StatsConfig::new(1.0).enable(FeatureSet::RPS | FeatureSet::REQBYTES | FeatureSet::NUMCONN);
    let (mut engine, mut rx) = engine(config);
    engine.start(handle(&server)).unwrap();

    let closing = rx.recv().await.unwrap();
    assert_eq!(closing.get(labels::RPS), Some(MetricValue::Int(0)));
    assert_eq!(closing.get(labels::REQBYTES), Some(MetricValue::Int(0)));

    let next = rx.recv().await.unwrap();
    assert_eq!(next.get(labels::RPS), Some(MetricValue::Int(1)));
    assert_eq!(next.get(labels::REQBYTES), Some(MetricValue::Int(300)));

    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_is_skipped_but_still_resets() {
    let server = Arc::new(MockServer::new(OnQuery::FailTimes(1)));
    let config =
        StatsConfig::new(1.0).enable(FeatureSet::RPS | FeatureSet::RESTIME | FeatureSet::NUMCONN);
    let (mut engine, mut rx) = engine(config);
    engine.start(handle(&server)).unwrap();

    server.request(sample(50.0, 10, 10));

    // First delivered snapshot comes from the second tick.
    let snap = rx.recv().await.unwrap();
    assert_eq!(server.queries.load(Ordering::SeqCst), 2);
    assert_eq!(snap.get(labels::RPS), Some(MetricValue::Int(0)));
    assert_eq!(snap.get(labels::RESTIME), Some(MetricValue::Float(0.0)));
    assert_eq!(snap.get(labels::NUMCONN), Some(MetricValue::Int(0)));

    engine.stop();
}

// =============================================================================
// Feature gating
// =============================================================================

#[tokio::test(start_paused = true)]
async fn serverless_start_reports_no_server_metrics() {
    let (mut engine, mut rx) = engine(StatsConfig::new(1.0).with_all());
    assert!(!engine
        .effective_features(false)
        .intersects(FeatureSet::SERVER_DEPENDENT));
    engine.start(None).unwrap();

    let snap = rx.recv().await.unwrap();
    for label in [
        labels::RPS,
        labels::RESTIME,
        labels::REQBYTES,
        labels::RESBYTES,
        labels::RXRATE,
        labels::TXRATE,
        labels::NUMCONN,
    ] {
        assert!(!snap.contains(label), "{label} should be absent");
    }
    assert_eq!(
        snap.labels().collect::<Vec<_>>(),
        vec![
            labels::SYSLOAD,
            labels::FREEMEM,
            labels::CPU,
            labels::RSS,
            labels::HEAP,
            labels::EVLOOP
        ]
    );
    assert_eq!(snap.get(labels::RSS), Some(MetricValue::Int(50)));
    assert_eq!(snap.get(labels::HEAP), Some(MetricValue::Int(20)));
}

#[tokio::test(start_paused = true)]
async fn server_is_not_subscribed_without_request_metrics() {
    let server = Arc::new(MockServer::new(OnQuery::Report(7)));
    let config = StatsConfig::new(1.0).enable(FeatureSet::SYSLOAD | FeatureSet::NUMCONN);
    let (mut engine, mut rx) = engine(config);
    engine.start(handle(&server)).unwrap();
    assert!(!server.is_subscribed());

    let snap = rx.recv().await.unwrap();
    assert_eq!(snap.get(labels::NUMCONN), Some(MetricValue::Int(7)));
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn zero_period_never_ticks() {
    let unset = StatsConfig::resolve_with(None, |_| None).unwrap();
    for config in [StatsConfig::new(0.0).with_all(), unset] {
        let server = Arc::new(MockServer::new(OnQuery::Report(1)));
        let (mut engine, mut rx) = engine(config);
        engine.start(handle(&server)).unwrap();
        assert!(!engine.is_running());
        assert!(!server.is_subscribed());

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(server.queries.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() {
    let (mut engine, mut rx) = engine(StatsConfig::new(1.0).enable(FeatureSet::SYSLOAD));
    engine.stop();

    engine.start(None).unwrap();
    assert!(engine.is_running());
    engine.stop();
    engine.stop();
    assert!(!engine.is_running());

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn restart_after_stop() {
    let (mut engine, mut rx) = engine(StatsConfig::new(1.0).enable(FeatureSet::FREEMEM));
    engine.start(None).unwrap();
    assert!(matches!(engine.start(None), Err(StatsError::AlreadyRunning)));
    engine.stop();

    engine.start(None).unwrap();
    let snap = rx.recv().await.unwrap();
    assert_eq!(snap.get(labels::FREEMEM), Some(MetricValue::Int(2000)));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_engine_stops_it() {
    let (mut engine, mut rx) = engine(StatsConfig::new(1.0).enable(FeatureSet::SYSLOAD));
    engine.start(None).unwrap();
    drop(engine);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn sub_millisecond_period_still_ticks() {
    let (mut engine, mut rx) = engine(StatsConfig::new(1e-12).enable(FeatureSet::SYSLOAD));
    engine.start(None).unwrap();

    let snap = rx.recv().await.unwrap();
    assert_eq!(snap.get(labels::SYSLOAD), Some(MetricValue::Int(50)));
    assert!(engine.is_running());
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn huge_period_starts_without_panicking() {
    let (mut engine, mut rx) = engine(StatsConfig::new(1e20).enable(FeatureSet::SYSLOAD));
    engine.start(None).unwrap();
    assert!(engine.is_running());

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert!(engine.is_running());
    assert!(rx.try_recv().is_err());
    engine.stop();
}

#[test]
fn start_needs_a_runtime() {
    let mut engine = StatsEngine::with_host_probe(StatsConfig::new(1.0), FixedHost);
    assert!(matches!(engine.start(None), Err(StatsError::NoRuntime(_))));

    let mut idle = StatsEngine::with_host_probe(StatsConfig::disabled(), FixedHost);
    assert!(idle.start(None).is_ok());
}

// =============================================================================
// At most one cycle in flight
// =============================================================================

/// Server whose connection query takes longer than the period.
#[derive(Default)]
struct SlowServer {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    queries: AtomicUsize,
}

#[async_trait]
impl ServerHandle for SlowServer {
    fn subscribe(&self, _recorder: RequestRecorder) {}

    async fn connection_count(&self) -> Result<usize, ProbeError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(0)
    }
}

#[tokio::test(start_paused = true)]
async fn slow_probe_never_overlaps_cycles() {
    let server = Arc::new(SlowServer::default());
    let (mut engine, mut rx) = engine(StatsConfig::new(1.0).enable(FeatureSet::NUMCONN));
    engine.start(handle(&server)).unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    engine.stop();

    let mut delivered = 0;
    while rx.try_recv().is_ok() {
        delivered += 1;
    }
    assert_eq!(server.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(delivered >= 2);
    assert!(delivered < 10);
}

#[tokio::test(start_paused = true)]
async fn stop_lets_the_in_flight_cycle_finish() {
    let server = Arc::new(SlowServer::default());
    let (mut engine, mut rx) = engine(StatsConfig::new(1.0).enable(FeatureSet::NUMCONN));
    engine.start(handle(&server)).unwrap();

    // Tick at 1s, probe busy until 3.5s.
    tokio::time::sleep(Duration::from_millis(1500)).await;
    engine.stop();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.queries.load(Ordering::SeqCst), 1);
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}
