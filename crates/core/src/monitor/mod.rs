//! Resource sampling.
//!
//! [`ResourceMonitor::sample`] takes a fresh [`ResourceSnapshot`] from the
//! OS. It waits for the CPU sampling window and, when the network is down,
//! for the latency probe timeout, so it belongs on a background task.

pub mod hardware;
pub mod metrics;
pub mod network;
pub mod system;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::types::ResourceSnapshot;
use hardware::BatteryReading;
use metrics::MetricsRegistry;
use system::RamReading;

/// Battery level reported when the host has no battery.
const NO_BATTERY_LEVEL: u8 = 100;
/// Temperature reported when the battery does not expose one.
const UNKNOWN_TEMPERATURE_C: f64 = 25.0;

/// Monitor tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorCfg {
    /// Wait between the two CPU counter reads.
    pub cpu_sample_window: Duration,
    pub probe_host: String,
    pub probe_port: u16,
    pub probe_timeout: Duration,
    /// Latency reported when the probe fails.
    pub latency_failure_ms: u64,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            cpu_sample_window: Duration::from_millis(360),
            probe_host: "8.8.8.8".into(),
            probe_port: 53,
            probe_timeout: Duration::from_secs(3),
            latency_failure_ms: 5000,
        }
    }
}

/// Anything that can produce a resource snapshot.
#[async_trait]
pub trait ResourceSource: Send + Sync {
    async fn sample(&self) -> ResourceSnapshot;
}

/// Samples the host through procfs, sysfs and a TCP probe.
#[derive(Debug)]
pub struct ResourceMonitor {
    cfg: MonitorCfg,
    metrics: Arc<MetricsRegistry>,
    proc_root: PathBuf,
    power_supply_root: PathBuf,
}

impl ResourceMonitor {
    pub fn new(cfg: MonitorCfg, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            cfg,
            metrics,
            proc_root: PathBuf::from("/proc"),
            power_supply_root: PathBuf::from("/sys/class/power_supply"),
        }
    }

    /// Read from alternate procfs / power-supply roots.
    pub fn with_roots(mut self, proc_root: impl Into<PathBuf>, power_supply_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self.power_supply_root = power_supply_root.into();
        self
    }

    pub fn cfg(&self) -> &MonitorCfg {
        &self.cfg
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn record_metric(&self, key: &str, value: f64) {
        self.metrics.record_metric(key, value);
    }

    pub fn increment_counter(&self, key: &str) -> u64 {
        self.metrics.increment_counter(key)
    }

    async fn take_snapshot(&self) -> ResourceSnapshot {
        let ram = RamReading::read(&self.proc_root);
        let battery = BatteryReading::read(&self.power_supply_root);

        let (cpu_usage_percent, network_latency_ms) = tokio::join!(
            system::sample_cpu_percent(&self.proc_root, self.cfg.cpu_sample_window),
            network::probe_latency_ms(
                &self.cfg.probe_host,
                self.cfg.probe_port,
                self.cfg.probe_timeout,
                self.cfg.latency_failure_ms,
            ),
        );

        ResourceSnapshot {
            memory_used_mb: ram.used_mb,
            memory_available_mb: ram.available_mb,
            cpu_usage_percent,
            battery_level: battery.level.unwrap_or(NO_BATTERY_LEVEL),
            battery_temperature_c: battery.temperature_c.unwrap_or(UNKNOWN_TEMPERATURE_C),
            network_latency_ms,
            captured_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ResourceSource for ResourceMonitor {
    async fn sample(&self) -> ResourceSnapshot {
        let snapshot = self.take_snapshot().await;
        self.metrics.increment_counter("monitor.samples");
        snapshot
    }
}

/// Replays a fixed snapshot. Used when the host cannot or should not be probed.
#[derive(Debug, Clone)]
pub struct FixedSource {
    snapshot: Arc<parking_lot::RwLock<ResourceSnapshot>>,
}

impl FixedSource {
    pub fn new(snapshot: ResourceSnapshot) -> Self {
        Self { snapshot: Arc::new(parking_lot::RwLock::new(snapshot)) }
    }

    /// Change what subsequent samples return.
    pub fn set(&self, snapshot: ResourceSnapshot) {
        *self.snapshot.write() = snapshot;
    }
}

#[async_trait]
impl ResourceSource for FixedSource {
    async fn sample(&self) -> ResourceSnapshot {
        ResourceSnapshot { captured_at: Utc::now(), ..*self.snapshot.read() }
    }
}
