use std::time::{Duration, Instant};

/// Process CPU utilization since the previous read.
///
/// Every [`read`](CpuGauge::read) measures the window since the baseline
/// and makes the current point the new baseline, so consecutive reads
/// cover contiguous, non-overlapping windows.
#[derive(Debug, Clone, Copy)]
pub struct CpuGauge {
    baseline_cpu: Duration,
    baseline_wall: Instant,
}

impl CpuGauge {
    /// Baseline at `cpu_time` consumed so far, observed at `now`.
    pub fn new(cpu_time: Duration, now: Instant) -> Self {
        Self {
            baseline_cpu: cpu_time,
            baseline_wall: now,
        }
    }

    /// Percent of one core used since the baseline (may exceed 100 on
    /// multi-core hosts), then rebaseline.
    pub fn read(&mut self, cpu_time: Duration, now: Instant) -> f64 {
        let cpu = cpu_time.saturating_sub(self.baseline_cpu);
        let wall = now.saturating_duration_since(self.baseline_wall);
        self.baseline_cpu = cpu_time;
        self.baseline_wall = now;

        if wall.is_zero() {
            return 0.0;
        }
        cpu.as_secs_f64() / wall.as_secs_f64() * 100.0
    }
}
