//! Applying a strategy's actions.
//!
//! Only `ClearMemoryCache` does anything beyond bookkeeping: it is passed
//! to the [`MemoryReclaimer`]. The other actions are recorded as metrics
//! for whatever schedules background work to read.

use crate::monitor::metrics::MetricsRegistry;
use crate::types::{OptimizationAction, OptimizationStrategy};

/// Receives best-effort memory reclamation hints.
pub trait MemoryReclaimer: Send + Sync {
    /// Try to free roughly `target_mb`. Returns what was actually freed, if known.
    fn reclaim(&self, target_mb: u64) -> Option<u64>;
}

/// Does nothing. The process has no caches of its own to drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReclaimer;

impl MemoryReclaimer for NoopReclaimer {
    fn reclaim(&self, _target_mb: u64) -> Option<u64> {
        None
    }
}

/// Apply `strategy`'s actions in declared order.
pub fn apply(strategy: &OptimizationStrategy, metrics: &MetricsRegistry, reclaimer: &dyn MemoryReclaimer) {
    metrics.increment_counter(&format!("strategy.{}", strategy_key(strategy.name)));
    for action in &strategy.actions {
        apply_one(action, metrics, reclaimer);
        metrics.increment_counter(&format!("action.{}", action.tag()));
    }
}

fn apply_one(action: &OptimizationAction, metrics: &MetricsRegistry, reclaimer: &dyn MemoryReclaimer) {
    match *action {
        OptimizationAction::ClearMemoryCache { target_mb } => {
            metrics.record_metric("memory_cache_clear_target_mb", target_mb as f64);
            if let Some(freed) = reclaimer.reclaim(target_mb) {
                metrics.add_counter("memory_reclaimed_mb", freed);
            }
            tracing::debug!(target_mb, "memory cache clear requested");
        }
        OptimizationAction::ReduceBackgroundProcessing { percent } => {
            metrics.record_metric("background_reduction_percent", f64::from(percent));
        }
        OptimizationAction::ThrottleCpuIntensive { percent } => {
            metrics.record_metric("cpu_throttle_percent", f64::from(percent));
        }
        OptimizationAction::DelayNonCriticalTasks { minutes } => {
            metrics.record_metric("non_critical_delay_minutes", f64::from(minutes));
        }
    }
}

/// "Memory Optimization" -> "memory_optimization".
fn strategy_key(name: &str) -> String {
    name.to_ascii_lowercase().replace(' ', "_")
}
