//! Measurement sources the engine reads once per tick.
//!
//! Host readers are synchronous and never suspend. The scheduler-latency
//! and connection-count probes are asynchronous and run concurrently.

pub mod host;
pub mod latency;

pub use host::SysinfoProbe;

use std::time::Duration;

use async_trait::async_trait;

use crate::engine::RequestRecorder;
use crate::error::ProbeError;

/// Resident and heap size of the current process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessMemory {
    pub rss: u64,
    pub heap: u64,
}

/// Synchronous host and process readers.
pub trait HostProbe: Send {
    /// 1-minute load average.
    fn load_average(&mut self) -> f64;

    /// Logical CPUs, at least 1.
    fn cpu_count(&self) -> usize;

    /// Memory available to new allocations, in bytes.
    fn available_memory(&mut self) -> u64;

    fn process_memory(&mut self) -> ProcessMemory;

    /// Total user + system CPU time consumed by this process so far.
    fn cpu_time(&mut self) -> Duration;
}

/// What the engine needs from an attached server.
#[async_trait]
pub trait ServerHandle: Send + Sync {
    /// Route completed-request events to `recorder` from now on, replacing
    /// any previous subscriber.
    fn subscribe(&self, recorder: RequestRecorder);

    /// Currently open transport connections.
    async fn connection_count(&self) -> Result<usize, ProbeError>;
}
