//! Maps a resource snapshot to one optimization strategy.
//!
//! A fixed cascade, first match wins: memory, CPU, battery, thermal, then
//! the balanced default. Memory comes first because running out of it is
//! the fastest way to lose work on a constrained device.

use crate::types::{OptimizationAction, OptimizationStrategy, ResourceSnapshot};

/// CPU utilization (%) above which the CPU strategy applies.
pub const CPU_HIGH_PERCENT: f64 = 80.0;
/// Pressure subtracted before scaling the memory reduction.
const MEMORY_REDUCTION_BASELINE: f64 = 0.7;
const MEMORY_REDUCTION_MIN: u32 = 10;
const MEMORY_REDUCTION_MAX: u32 = 50;

pub const MEMORY_OPTIMIZATION: &str = "Memory Optimization";
pub const CPU_OPTIMIZATION: &str = "CPU Optimization";
pub const BATTERY_CONSERVATION: &str = "Battery Conservation";
pub const THERMAL_MANAGEMENT: &str = "Thermal Management";
pub const BALANCED_PERFORMANCE: &str = "Balanced Performance";

/// Select the strategy for `snapshot`. Pure.
pub fn select(snapshot: &ResourceSnapshot) -> OptimizationStrategy {
    if snapshot.is_low_memory() {
        memory_optimization(snapshot)
    } else if snapshot.cpu_usage_percent > CPU_HIGH_PERCENT {
        OptimizationStrategy {
            name: CPU_OPTIMIZATION,
            priority: 2,
            actions: vec![
                OptimizationAction::ThrottleCpuIntensive { percent: 30 },
                OptimizationAction::DelayNonCriticalTasks { minutes: 3 },
            ],
            estimated_improvement_percent: 25,
        }
    } else if snapshot.is_battery_low() {
        OptimizationStrategy {
            name: BATTERY_CONSERVATION,
            priority: 1,
            actions: vec![
                OptimizationAction::ReduceBackgroundProcessing { percent: 60 },
                OptimizationAction::ThrottleCpuIntensive { percent: 50 },
                OptimizationAction::DelayNonCriticalTasks { minutes: 10 },
            ],
            estimated_improvement_percent: 40,
        }
    } else if snapshot.is_overheating() {
        OptimizationStrategy {
            name: THERMAL_MANAGEMENT,
            priority: 1,
            actions: vec![
                OptimizationAction::ThrottleCpuIntensive { percent: 70 },
                OptimizationAction::ReduceBackgroundProcessing { percent: 40 },
                OptimizationAction::DelayNonCriticalTasks { minutes: 15 },
            ],
            estimated_improvement_percent: 35,
        }
    } else {
        OptimizationStrategy {
            name: BALANCED_PERFORMANCE,
            priority: 3,
            actions: vec![
                OptimizationAction::ClearMemoryCache { target_mb: 50 },
                OptimizationAction::DelayNonCriticalTasks { minutes: 1 },
            ],
            estimated_improvement_percent: 5,
        }
    }
}

/// Percent of load to shed under memory pressure, clamped to 10..=50.
pub fn memory_reduction_percent(pressure: f64) -> u32 {
    let raw = ((pressure - MEMORY_REDUCTION_BASELINE) * 100.0).round();
    if raw.is_nan() || raw < f64::from(MEMORY_REDUCTION_MIN) {
        return MEMORY_REDUCTION_MIN;
    }
    raw.min(f64::from(MEMORY_REDUCTION_MAX)) as u32
}

fn memory_optimization(snapshot: &ResourceSnapshot) -> OptimizationStrategy {
    let reduction = memory_reduction_percent(snapshot.memory_pressure());
    OptimizationStrategy {
        name: MEMORY_OPTIMIZATION,
        priority: 1,
        actions: vec![
            OptimizationAction::ClearMemoryCache {
                target_mb: snapshot.memory_used_mb * u64::from(reduction) / 100,
            },
            OptimizationAction::ReduceBackgroundProcessing { percent: reduction },
            OptimizationAction::DelayNonCriticalTasks { minutes: 5 },
        ],
        estimated_improvement_percent: reduction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{calm, snapshot};

    #[test]
    fn memory_scenario() {
        let s = select(&snapshot(900, 100, 10.0, 80, 25.0, 50));
        assert_eq!(s.name, MEMORY_OPTIMIZATION);
        assert_eq!(s.priority, 1);
        assert_eq!(s.estimated_improvement_percent, 20);
        assert_eq!(
            s.actions,
            vec![
                OptimizationAction::ClearMemoryCache { target_mb: 180 },
                OptimizationAction::ReduceBackgroundProcessing { percent: 20 },
                OptimizationAction::DelayNonCriticalTasks { minutes: 5 },
            ]
        );
    }

    #[test]
    fn reduction_is_clamped() {
        assert_eq!(memory_reduction_percent(0.86), 16);
        assert_eq!(memory_reduction_percent(0.95), 25);
        assert_eq!(memory_reduction_percent(1.0), 30);
        assert_eq!(memory_reduction_percent(0.72), 10);
        assert_eq!(memory_reduction_percent(1.5), 50);
        assert_eq!(memory_reduction_percent(f64::NAN), 10);
        for used in [860u64, 950, 1000] {
            let s = select(&snapshot(used, 1000 - used, 0.0, 100, 20.0, 10));
            assert_eq!(s.name, MEMORY_OPTIMIZATION);
            assert!((10..=50).contains(&s.estimated_improvement_percent));
        }
    }

    #[test]
    fn memory_preempts_everything() {
        let s = select(&snapshot(950, 50, 99.0, 5, 60.0, 5000));
        assert_eq!(s.name, MEMORY_OPTIMIZATION);
    }

    #[test]
    fn cascade_order() {
        assert_eq!(select(&snapshot(100, 900, 95.0, 5, 60.0, 50)).name, CPU_OPTIMIZATION);
        // exactly 80 is not high
        assert_eq!(select(&snapshot(100, 900, 80.0, 80, 25.0, 50)).name, BALANCED_PERFORMANCE);
        assert_eq!(select(&snapshot(100, 900, 10.0, 5, 60.0, 50)).name, BATTERY_CONSERVATION);
        assert_eq!(select(&snapshot(100, 900, 10.0, 50, 45.0, 50)).name, THERMAL_MANAGEMENT);
        assert_eq!(select(&calm()).name, BALANCED_PERFORMANCE);
    }

    #[test]
    fn fixed_strategies() {
        let cpu = select(&snapshot(100, 900, 95.0, 80, 25.0, 50));
        assert_eq!(cpu.priority, 2);
        assert_eq!(cpu.estimated_improvement_percent, 25);

        let battery = select(&snapshot(100, 900, 10.0, 10, 25.0, 50));
        assert_eq!(battery.actions[0], OptimizationAction::ReduceBackgroundProcessing { percent: 60 });
        assert_eq!(battery.estimated_improvement_percent, 40);

        let thermal = select(&snapshot(100, 900, 10.0, 80, 41.0, 50));
        assert_eq!(thermal.actions[0], OptimizationAction::ThrottleCpuIntensive { percent: 70 });
        assert_eq!(thermal.actions[2], OptimizationAction::DelayNonCriticalTasks { minutes: 15 });

        let balanced = select(&calm());
        assert_eq!(balanced.priority, 3);
        assert_eq!(balanced.actions[0], OptimizationAction::ClearMemoryCache { target_mb: 50 });
    }

    #[test]
    fn select_is_deterministic() {
        let snaps = [
            calm(),
            snapshot(900, 100, 10.0, 80, 25.0, 50),
            snapshot(100, 900, 95.0, 10, 45.0, 5000),
            snapshot(0, 0, 0.0, 0, 0.0, 0),
        ];
        for s in &snaps {
            assert_eq!(select(s), select(s));
        }
    }
}
