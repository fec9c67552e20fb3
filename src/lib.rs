//! Periodic process health and HTTP throughput snapshots.
//!
//! A [`StatsEngine`] wakes up once per configured period, reads host
//! metrics (load, memory, CPU), runs the asynchronous probes (scheduler
//! latency, live connections) and folds in the request counters gathered
//! since the previous tick. The merged [`Snapshot`] goes to the registered
//! observer or, when there is none, to the `tracing` log as JSON.
//!
//! ```no_run
//! use statsbeat::{HttpStats, StatsConfig, StatsEngine};
//!
//! # async fn demo(router: axum::Router) -> Result<(), Box<dyn std::error::Error>> {
//! let stats = HttpStats::new();
//! let mut engine = StatsEngine::new(StatsConfig::resolve(Some("period=5&all"))?)?;
//! engine.start(Some(stats.handle()))?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, stats.make_service(stats.instrument(router))).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod probes;
pub mod server;

pub use config::{FeatureSet, StatsConfig};
pub use engine::{RequestRecorder, SnapshotObserver, StatsEngine};
pub use error::{ConfigError, ProbeError, StatsError};
pub use metrics::{MetricValue, RequestSample, Snapshot};
pub use probes::{HostProbe, ProcessMemory, ServerHandle, SysinfoProbe};
pub use server::HttpStats;
