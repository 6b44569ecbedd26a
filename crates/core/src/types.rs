use std::collections::BTreeMap;
use std::time::Duration;

use ballast_llm::provider::ChatMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Memory pressure above which a snapshot counts as low on memory.
pub const LOW_MEMORY_PRESSURE: f64 = 0.85;
/// Battery temperature (°C) above which the device counts as overheating.
pub const OVERHEAT_TEMPERATURE_C: f64 = 40.0;
/// Battery level (%) below which the battery counts as low.
pub const LOW_BATTERY_PERCENT: u8 = 20;

// ── Resource state ──────────────────────────────────────────────

/// Point-in-time system resource reading. Derived flags are computed on
/// every call, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub memory_used_mb: u64,
    pub memory_available_mb: u64,
    /// 0–100.
    pub cpu_usage_percent: f64,
    /// 0–100.
    pub battery_level: u8,
    pub battery_temperature_c: f64,
    pub network_latency_ms: u64,
    pub captured_at: DateTime<Utc>,
}

impl ResourceSnapshot {
    /// used / (used + available); 0 when nothing is known.
    pub fn memory_pressure(&self) -> f64 {
        let total = self.memory_used_mb + self.memory_available_mb;
        if total == 0 {
            return 0.0;
        }
        self.memory_used_mb as f64 / total as f64
    }

    pub fn is_low_memory(&self) -> bool {
        self.memory_pressure() > LOW_MEMORY_PRESSURE
    }

    pub fn is_overheating(&self) -> bool {
        self.battery_temperature_c > OVERHEAT_TEMPERATURE_C
    }

    pub fn is_battery_low(&self) -> bool {
        self.battery_level < LOW_BATTERY_PERCENT
    }

    /// One-line human readable summary.
    pub fn summary(&self) -> String {
        format!(
            "memory {}/{} MB ({:.0}%), cpu {:.1}%, battery {}% at {:.1}°C, latency {} ms",
            self.memory_used_mb,
            self.memory_used_mb + self.memory_available_mb,
            self.memory_pressure() * 100.0,
            self.cpu_usage_percent,
            self.battery_level,
            self.battery_temperature_c,
            self.network_latency_ms,
        )
    }
}

// ── Strategy ────────────────────────────────────────────────────

/// One mitigation step. Pure data; the engine interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizationAction {
    ReduceBackgroundProcessing { percent: u32 },
    ClearMemoryCache { target_mb: u64 },
    ThrottleCpuIntensive { percent: u32 },
    DelayNonCriticalTasks { minutes: u32 },
}

impl OptimizationAction {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ReduceBackgroundProcessing { .. } => "reduce_background_processing",
            Self::ClearMemoryCache { .. } => "clear_memory_cache",
            Self::ThrottleCpuIntensive { .. } => "throttle_cpu_intensive",
            Self::DelayNonCriticalTasks { .. } => "delay_non_critical_tasks",
        }
    }
}

/// Ordered mitigation plan chosen for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationStrategy {
    pub name: &'static str,
    /// Lower is more urgent.
    pub priority: u8,
    /// Applied in this order, never reordered.
    pub actions: Vec<OptimizationAction>,
    /// Informational.
    pub estimated_improvement_percent: u32,
}

// ── Tasks ───────────────────────────────────────────────────────

/// Bookkeeping priority. The engine never reorders on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum TaskPriority {
    Low = 1,
    #[default]
    Normal = 5,
    High = 10,
    Critical = 15,
}

impl TaskPriority {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Default budget for the remote tiers of one conversation query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Unit of work submitted to the execution engine.
#[derive(Debug, Clone)]
pub enum Task {
    ConversationQuery {
        messages: Vec<ChatMessage>,
        timeout: Duration,
        /// When set, history is loaded from and the exchange appended to
        /// the conversation store.
        session_id: Option<Uuid>,
        priority: TaskPriority,
    },
    SystemAnalysis {
        kind: String,
        priority: TaskPriority,
    },
    UserInteraction {
        kind: String,
        payload: serde_json::Value,
        priority: TaskPriority,
    },
}

impl Task {
    pub fn conversation(messages: Vec<ChatMessage>) -> Self {
        Task::ConversationQuery {
            messages,
            timeout: DEFAULT_QUERY_TIMEOUT,
            session_id: None,
            priority: TaskPriority::Normal,
        }
    }

    pub fn analysis(kind: impl Into<String>) -> Self {
        Task::SystemAnalysis { kind: kind.into(), priority: TaskPriority::Normal }
    }

    pub fn interaction(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Task::UserInteraction { kind: kind.into(), payload, priority: TaskPriority::Normal }
    }

    pub fn with_priority(mut self, new: TaskPriority) -> Self {
        match &mut self {
            Task::ConversationQuery { priority, .. }
            | Task::SystemAnalysis { priority, .. }
            | Task::UserInteraction { priority, .. } => *priority = new,
        }
        self
    }

    pub fn priority(&self) -> TaskPriority {
        match self {
            Task::ConversationQuery { priority, .. }
            | Task::SystemAnalysis { priority, .. }
            | Task::UserInteraction { priority, .. } => *priority,
        }
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Task::ConversationQuery { .. } => "conversation_query",
            Task::SystemAnalysis { .. } => "system_analysis",
            Task::UserInteraction { .. } => "user_interaction",
        }
    }
}

// ── Execution ───────────────────────────────────────────────────

/// Outcome handed back to the submitter of a task.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success {
        text: String,
        metadata: BTreeMap<String, String>,
    },
    Error {
        message: String,
        code: String,
    },
    Cancelled,
}

impl ExecutionResult {
    pub fn success(text: impl Into<String>) -> Self {
        ExecutionResult::Success { text: text.into(), metadata: BTreeMap::new() }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutionResult::Error { message: message.into(), code: code.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }
}

/// History entry for one `execute` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub task_type: &'static str,
    pub priority: TaskPriority,
    pub strategy: &'static str,
    pub execution_time_ms: u64,
    pub before: ResourceSnapshot,
    pub after: ResourceSnapshot,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Snapshot with explicit fields and a fixed timestamp.
    pub fn snapshot(used: u64, available: u64, cpu: f64, battery: u8, temp: f64, latency: u64) -> ResourceSnapshot {
        ResourceSnapshot {
            memory_used_mb: used,
            memory_available_mb: available,
            cpu_usage_percent: cpu,
            battery_level: battery,
            battery_temperature_c: temp,
            network_latency_ms: latency,
            captured_at: DateTime::<Utc>::default(),
        }
    }

    pub fn calm() -> ResourceSnapshot {
        snapshot(400, 600, 10.0, 80, 25.0, 50)
    }
}
