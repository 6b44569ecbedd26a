//! Memory and CPU readings from procfs.

use std::path::Path;
use std::time::Duration;

/// RAM usage reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RamReading {
    pub used_mb: u64,
    pub available_mb: u64,
}

impl RamReading {
    /// Read `<proc_root>/meminfo`; zeros when unreadable.
    pub fn read(proc_root: &Path) -> Self {
        std::fs::read_to_string(proc_root.join("meminfo"))
            .ok()
            .map(|s| Self::parse(&s))
            .unwrap_or_default()
    }

    pub fn parse(meminfo: &str) -> Self {
        let mut total_kb = 0u64;
        let mut avail_kb = None;
        let mut free_kb = 0u64;
        for line in meminfo.lines() {
            let value = || -> u64 {
                line.split_whitespace()
                    .nth(1)
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0)
            };
            if line.starts_with("MemTotal:") {
                total_kb = value();
            } else if line.starts_with("MemAvailable:") {
                avail_kb = Some(value());
            } else if line.starts_with("MemFree:") {
                free_kb = value();
            }
        }
        // Kernels older than 3.14 lack MemAvailable.
        let avail_kb = avail_kb.unwrap_or(free_kb).min(total_kb);
        Self {
            used_mb: (total_kb - avail_kb) / 1024,
            available_mb: avail_kb / 1024,
        }
    }
}

/// Cumulative busy/idle jiffies summed over every core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub busy: u64,
    pub idle: u64,
}

impl CpuTimes {
    pub fn read(proc_root: &Path) -> Option<Self> {
        let stat = std::fs::read_to_string(proc_root.join("stat")).ok()?;
        Self::parse(&stat)
    }

    /// Sum the per-core `cpuN` lines of /proc/stat.
    /// Fields: user nice system idle iowait irq softirq steal ...
    pub fn parse(stat: &str) -> Option<Self> {
        let mut busy = 0u64;
        let mut idle = 0u64;
        let mut cores = 0usize;
        for line in stat.lines() {
            let mut fields = line.split_whitespace();
            let Some(label) = fields.next() else { continue };
            if !label.starts_with("cpu") || label == "cpu" {
                continue;
            }
            let vals: Vec<u64> = fields.filter_map(|v| v.parse().ok()).collect();
            if vals.len() < 4 {
                return None;
            }
            let core_idle = vals[3] + vals.get(4).copied().unwrap_or(0);
            let core_total: u64 = vals.iter().take(8).sum();
            idle += core_idle;
            busy += core_total - core_idle;
            cores += 1;
        }
        (cores > 0).then_some(Self { busy, idle })
    }

    /// Utilization between two readings, 0–100.
    pub fn usage_percent(before: Self, after: Self) -> f64 {
        let busy = after.busy.saturating_sub(before.busy);
        let idle = after.idle.saturating_sub(before.idle);
        if busy + idle == 0 {
            return 0.0;
        }
        (busy as f64 / (busy + idle) as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Read counters twice `window` apart. Any read failure yields 0.0.
pub async fn sample_cpu_percent(proc_root: &Path, window: Duration) -> f64 {
    let Some(before) = CpuTimes::read(proc_root) else {
        return 0.0;
    };
    tokio::time::sleep(window).await;
    let Some(after) = CpuTimes::read(proc_root) else {
        return 0.0;
    };
    CpuTimes::usage_percent(before, after)
}
