//! Host metrics via `sysinfo`, with process CPU time from `getrusage`.

use std::time::Duration;

use sysinfo::{
    CpuRefreshKind, MemoryRefreshKind, Pid, Process, ProcessRefreshKind, ProcessesToUpdate,
    RefreshKind, System,
};
use tracing::debug;

use super::{HostProbe, ProcessMemory};
use crate::error::StatsError;

#[cfg(target_os = "linux")]
const STATM_FILE: &str = "/proc/self/statm";

/// Default [`HostProbe`] for the running process.
///
/// Only the pieces each metric needs are refreshed: memory for
/// `freemem`, our own process entry for `rss`/`heap`.
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
    cpus: usize,
}

impl SysinfoProbe {
    pub fn new() -> Result<Self, StatsError> {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );
        let pid = sysinfo::get_current_pid().map_err(|e| StatsError::Host(e.to_string()))?;
        let cpus = system.cpus().len().max(1);

        Ok(Self { system, pid, cpus })
    }

    fn refresh_process(&mut self) -> Option<&Process> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::nothing().with_memory().with_cpu(),
        );
        self.system.process(self.pid)
    }
}

impl HostProbe for SysinfoProbe {
    fn load_average(&mut self) -> f64 {
        System::load_average().one
    }

    fn cpu_count(&self) -> usize {
        self.cpus
    }

    fn available_memory(&mut self) -> u64 {
        self.system
            .refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        self.system.available_memory()
    }

    fn process_memory(&mut self) -> ProcessMemory {
        let Some(process) = self.refresh_process() else {
            debug!("current process missing from sysinfo table");
            return ProcessMemory::default();
        };
        let rss = process.memory();
        let virtual_memory = process.virtual_memory();

        ProcessMemory {
            rss,
            heap: data_segment_bytes().unwrap_or(virtual_memory),
        }
    }

    #[cfg(unix)]
    fn cpu_time(&mut self) -> Duration {
        rusage_cpu_time().unwrap_or_default()
    }

    #[cfg(not(unix))]
    fn cpu_time(&mut self) -> Duration {
        self.refresh_process()
            .map(|p| Duration::from_millis(p.accumulated_cpu_time()))
            .unwrap_or_default()
    }
}

// ─── OS readers ──────────────────────────────────────────────────

#[cfg(unix)]
fn rusage_cpu_time() -> Option<Duration> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the struct we hand it.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        debug!("getrusage failed: {}", std::io::Error::last_os_error());
        return None;
    }
    // SAFETY: rc == 0 means the kernel filled the struct.
    let usage = unsafe { usage.assume_init() };
    Some(to_duration(usage.ru_utime) + to_duration(usage.ru_stime))
}

#[cfg(unix)]
fn to_duration(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}

/// Data segment (heap + anonymous mappings) from `/proc/self/statm`.
#[cfg(target_os = "linux")]
fn data_segment_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string(STATM_FILE).ok()?;
    let pages: u64 = statm.split_whitespace().nth(5)?.parse().ok()?;
    // SAFETY: sysconf has no memory-safety preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    (page_size > 0).then(|| pages * page_size as u64)
}

#[cfg(not(target_os = "linux"))]
fn data_segment_bytes() -> Option<u64> {
    None
}
