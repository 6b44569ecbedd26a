use std::collections::HashMap;
use std::time::Duration;

use ballast_llm::chain::ChainPolicy;
use ballast_llm::http::HttpTimeouts;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::monitor::MonitorCfg;

/// All ballast parameters. Loaded from the `ballast_config` table at startup.
/// First boot writes defaults; subsequent boots read existing values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallastCfg {
    // resource monitor
    pub monitor_interval_secs: u64,
    pub cpu_sample_window_ms: u64,
    pub latency_probe_host: String,
    pub latency_probe_port: u16,
    pub latency_probe_timeout_ms: u64,
    pub latency_failure_ms: u64,

    // execution engine
    pub history_capacity: usize,
    pub query_timeout_secs: u64,
    pub conversation_history_turns: usize,

    // provider chain
    pub chain_policy: String,
    pub provider_connect_timeout_secs: u64,
    pub provider_request_timeout_secs: u64,
    pub completion_max_tokens: u32,
    pub completion_temperature: f32,

    // offline generator
    pub offline_vocab_size: usize,

    // shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for BallastCfg {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 30,
            cpu_sample_window_ms: 360,
            latency_probe_host: "8.8.8.8".into(),
            latency_probe_port: 53,
            latency_probe_timeout_ms: 3000,
            latency_failure_ms: 5000,
            history_capacity: 1000,
            query_timeout_secs: 120,
            conversation_history_turns: crate::engine::handlers::DEFAULT_HISTORY_TURNS,
            chain_policy: "fall_through_all".into(),
            provider_connect_timeout_secs: 30,
            provider_request_timeout_secs: 90,
            completion_max_tokens: 512,
            completion_temperature: 0.7,
            offline_vocab_size: ballast_llm::offline::vocab::DEFAULT_MAX_VOCAB,
            shutdown_timeout_secs: 15,
        }
    }
}

impl BallastCfg {
    /// Load config from `ballast_config` table. If table is empty, seed with defaults.
    pub async fn load(pool: &PgPool) -> Result<Self, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT key, value FROM ballast_config")
                .fetch_all(pool)
                .await?;

        if rows.is_empty() {
            let cfg = Self::default();
            cfg.seed(pool).await?;
            return Ok(cfg);
        }

        let map: HashMap<String, String> = rows.into_iter().collect();
        Ok(Self::from_map(&map))
    }

    /// Write all default values into `ballast_config` table.
    async fn seed(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        for (key, value, desc) in &self.to_entries() {
            sqlx::query(
                "INSERT INTO ballast_config (key, value, description) VALUES ($1, $2, $3) \
                 ON CONFLICT (key) DO NOTHING",
            )
            .bind(key)
            .bind(value)
            .bind(desc)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    pub fn from_map(m: &HashMap<String, String>) -> Self {
        let d = Self::default();
        Self {
            monitor_interval_secs: get_or(m, "monitor_interval_secs", d.monitor_interval_secs),
            cpu_sample_window_ms: get_or(m, "cpu_sample_window_ms", d.cpu_sample_window_ms),
            latency_probe_host: get_or(m, "latency_probe_host", d.latency_probe_host),
            latency_probe_port: get_or(m, "latency_probe_port", d.latency_probe_port),
            latency_probe_timeout_ms: get_or(m, "latency_probe_timeout_ms", d.latency_probe_timeout_ms),
            latency_failure_ms: get_or(m, "latency_failure_ms", d.latency_failure_ms),
            history_capacity: get_or(m, "history_capacity", d.history_capacity),
            query_timeout_secs: get_or(m, "query_timeout_secs", d.query_timeout_secs),
            conversation_history_turns: get_or(m, "conversation_history_turns", d.conversation_history_turns),
            chain_policy: get_or(m, "chain_policy", d.chain_policy),
            provider_connect_timeout_secs: get_or(m, "provider_connect_timeout_secs", d.provider_connect_timeout_secs),
            provider_request_timeout_secs: get_or(m, "provider_request_timeout_secs", d.provider_request_timeout_secs),
            completion_max_tokens: get_or(m, "completion_max_tokens", d.completion_max_tokens),
            completion_temperature: get_or(m, "completion_temperature", d.completion_temperature),
            offline_vocab_size: get_or(m, "offline_vocab_size", d.offline_vocab_size),
            shutdown_timeout_secs: get_or(m, "shutdown_timeout_secs", d.shutdown_timeout_secs),
        }
    }

    fn to_entries(&self) -> Vec<(&str, String, &str)> {
        vec![
            ("monitor_interval_secs", self.monitor_interval_secs.to_string(), "Background resource sampling interval seconds"),
            ("cpu_sample_window_ms", self.cpu_sample_window_ms.to_string(), "Wait between the two CPU counter reads ms"),
            ("latency_probe_host", self.latency_probe_host.clone(), "Host dialed by the latency probe"),
            ("latency_probe_port", self.latency_probe_port.to_string(), "Port dialed by the latency probe"),
            ("latency_probe_timeout_ms", self.latency_probe_timeout_ms.to_string(), "Latency probe connect timeout ms"),
            ("latency_failure_ms", self.latency_failure_ms.to_string(), "Latency reported when the probe fails"),
            ("history_capacity", self.history_capacity.to_string(), "Execution history max records"),
            ("query_timeout_secs", self.query_timeout_secs.to_string(), "Remote budget per conversation query seconds"),
            ("conversation_history_turns", self.conversation_history_turns.to_string(), "Stored turns replayed into each query"),
            ("chain_policy", self.chain_policy.clone(), "fall_through_all | transient_only"),
            ("provider_connect_timeout_secs", self.provider_connect_timeout_secs.to_string(), "Remote provider connect timeout seconds"),
            ("provider_request_timeout_secs", self.provider_request_timeout_secs.to_string(), "Remote provider request timeout seconds"),
            ("completion_max_tokens", self.completion_max_tokens.to_string(), "Completion max tokens"),
            ("completion_temperature", self.completion_temperature.to_string(), "Completion sampling temperature"),
            ("offline_vocab_size", self.offline_vocab_size.to_string(), "Offline tokenizer vocabulary cap"),
            ("shutdown_timeout_secs", self.shutdown_timeout_secs.to_string(), "Graceful shutdown timeout seconds"),
        ]
    }

    pub fn monitor(&self) -> MonitorCfg {
        MonitorCfg {
            cpu_sample_window: Duration::from_millis(self.cpu_sample_window_ms),
            probe_host: self.latency_probe_host.clone(),
            probe_port: self.latency_probe_port,
            probe_timeout: Duration::from_millis(self.latency_probe_timeout_ms),
            latency_failure_ms: self.latency_failure_ms,
        }
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn http_timeouts(&self) -> HttpTimeouts {
        HttpTimeouts {
            connect: Duration::from_secs(self.provider_connect_timeout_secs),
            request: Duration::from_secs(self.provider_request_timeout_secs),
        }
    }

    /// Unknown policy names fall back to the default.
    pub fn chain_policy(&self) -> ChainPolicy {
        self.chain_policy.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "invalid chain_policy, using default");
            ChainPolicy::default()
        })
    }
}

fn get_or<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str, default: T) -> T {
    map.get(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
