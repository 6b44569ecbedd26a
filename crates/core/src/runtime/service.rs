//! Wires every component into one running service.

use std::sync::Arc;

use uuid::Uuid;

use ballast_llm::chain::ProviderChain;
use ballast_llm::credentials::CredentialStore;
use ballast_llm::http::{HttpProvider, ProviderSlot};
use ballast_llm::provider::{ChatMessage, LlmProvider};
use ballast_llm::OfflineGenerator;
use sqlx::PgPool;

use crate::config::BallastCfg;
use crate::conversation::{ConversationStore, MemoryConversationStore, PgConversationStore};
use crate::engine::actions::MemoryReclaimer;
use crate::engine::reclaim::TrimReclaimer;
use crate::engine::ExecutionEngine;
use crate::monitor::metrics::MetricsRegistry;
use crate::monitor::watch::{self, SnapshotReceiver};
use crate::monitor::{ResourceMonitor, ResourceSource};
use crate::strategy;
use crate::types::{ResourceSnapshot, Task, TaskPriority};

use super::ShutdownGuard;

/// Everything the service needs that is not derived from config.
pub struct ServiceParts {
    pub source: Arc<dyn ResourceSource>,
    pub metrics: Arc<MetricsRegistry>,
    pub chain: ProviderChain,
    pub store: Arc<dyn ConversationStore>,
    pub reclaimer: Arc<dyn MemoryReclaimer>,
}

/// Running service: engine plus the background monitoring loop.
pub struct Service {
    cfg: Arc<BallastCfg>,
    engine: Arc<ExecutionEngine>,
    snapshots: SnapshotReceiver,
    guard: ShutdownGuard,
}

impl Service {
    /// Build the production stack and spawn the monitoring loop.
    /// Without a pool, conversations live in memory only.
    pub fn start(cfg: BallastCfg, pool: Option<PgPool>, credentials: &dyn CredentialStore) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let source: Arc<dyn ResourceSource> = Arc::new(ResourceMonitor::new(cfg.monitor(), Arc::clone(&metrics)));
        let chain = build_chain(&cfg, credentials, Arc::clone(&metrics));
        let store: Arc<dyn ConversationStore> = match pool {
            Some(pool) => Arc::new(PgConversationStore::new(pool)),
            None => Arc::new(MemoryConversationStore::new()),
        };
        let reclaimer = Arc::new(TrimReclaimer::new());
        Self::start_with(cfg, ServiceParts { source, metrics, chain, store, reclaimer })
    }

    pub fn start_with(cfg: BallastCfg, parts: ServiceParts) -> Self {
        let guard = ShutdownGuard::new();
        guard.spawn_signal_listener();

        let engine = ExecutionEngine::new(Arc::clone(&parts.source), Arc::clone(&parts.metrics), Arc::new(parts.chain))
            .with_history_capacity(cfg.history_capacity)
            .with_reclaimer(parts.reclaimer)
            .with_conversation_store(parts.store, cfg.conversation_history_turns);

        let (loop_handle, snapshots) =
            watch::spawn(parts.source, parts.metrics, cfg.monitor_interval(), guard.token());
        guard.spawn(async move {
            if let Err(e) = loop_handle.await {
                tracing::warn!(error = %e, "resource monitor task failed");
            }
        });

        tracing::info!(
            interval_secs = cfg.monitor_interval_secs,
            tiers = ?engine.chain().tier_names(),
            "service started"
        );
        Self { cfg: Arc::new(cfg), engine: Arc::new(engine), snapshots, guard }
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn cfg(&self) -> &Arc<BallastCfg> {
        &self.cfg
    }

    /// A conversation query bounded by the configured `query_timeout_secs`.
    pub fn conversation(&self, messages: Vec<ChatMessage>, session_id: Option<Uuid>) -> Task {
        Task::ConversationQuery {
            messages,
            timeout: self.cfg.query_timeout(),
            session_id,
            priority: TaskPriority::Normal,
        }
    }

    pub fn shutdown_guard(&self) -> &ShutdownGuard {
        &self.guard
    }

    /// Most recent snapshot published by the monitoring loop.
    pub fn latest_snapshot(&self) -> Option<ResourceSnapshot> {
        *self.snapshots.borrow()
    }

    /// Human readable status: latest snapshot, the strategy it selects,
    /// and execution totals.
    pub fn status(&self) -> String {
        let stats = self.engine.stats();
        let tasks = format!(
            "tasks: {} total, {} ok, {} failed, mean {:.0} ms",
            stats.total, stats.succeeded, stats.failed, stats.mean_execution_ms
        );
        match self.latest_snapshot() {
            Some(snap) => {
                let s = strategy::select(&snap);
                format!("{}\nstrategy: {} (priority {})\n{tasks}", snap.summary(), s.name, s.priority)
            }
            None => format!("no resource sample yet\n{tasks}"),
        }
    }

    /// Cancel the monitoring loop and wait for it within the configured timeout.
    pub async fn shutdown(self) -> bool {
        let clean = self.guard.shutdown(self.cfg.shutdown_timeout()).await;
        tracing::info!(clean, "service stopped");
        clean
    }
}

/// Primary and secondary HTTP tiers ahead of the offline generator.
pub fn build_chain(
    cfg: &BallastCfg,
    credentials: &dyn CredentialStore,
    metrics: Arc<MetricsRegistry>,
) -> ProviderChain {
    let timeouts = cfg.http_timeouts();
    let remotes: Vec<Arc<dyn LlmProvider>> = [ProviderSlot::Primary, ProviderSlot::Secondary]
        .into_iter()
        .map(|slot| {
            let provider = HttpProvider::from_credentials(credentials, slot, timeouts);
            tracing::info!(?slot, model = provider.model(), available = provider.is_available(), "remote tier configured");
            Arc::new(provider) as Arc<dyn LlmProvider>
        })
        .collect();

    ProviderChain::new(remotes, Arc::new(OfflineGenerator::with_vocab_size(cfg.offline_vocab_size)))
        .with_policy(cfg.chain_policy())
        .with_observer(metrics)
        .with_sampling(cfg.completion_max_tokens, cfg.completion_temperature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::actions::NoopReclaimer;
    use crate::monitor::FixedSource;
    use crate::types::fixtures::snapshot;
    use ballast_llm::credentials::{CredentialName, MemoryCredentials};
    use ballast_llm::provider::ChatMessage;
    use std::time::Duration;

    fn parts(snap: ResourceSnapshot) -> ServiceParts {
        ServiceParts {
            source: Arc::new(FixedSource::new(snap)),
            metrics: Arc::new(MetricsRegistry::new()),
            chain: ProviderChain::offline_only(Arc::new(OfflineGenerator::new())),
            store: Arc::new(MemoryConversationStore::new()),
            reclaimer: Arc::new(NoopReclaimer),
        }
    }

    #[test]
    fn chain_without_credentials_has_unavailable_remotes() {
        let creds = MemoryCredentials::new();
        let chain = build_chain(&BallastCfg::default(), &creds, Arc::new(MetricsRegistry::new()));
        assert_eq!(chain.tier_names(), vec!["openai", "anthropic", "offline"]);
    }

    #[tokio::test]
    async fn chain_skips_blank_keys_and_answers_offline() {
        let creds = MemoryCredentials::new().with(CredentialName::PrimaryApiKey, "   ");
        let metrics = Arc::new(MetricsRegistry::new());
        let chain = build_chain(&BallastCfg::default(), &creds, Arc::clone(&metrics));
        let out = chain.generate(vec![ChatMessage::user("hello")]).await;
        assert!(out.is_success());
        assert_eq!(metrics.counter("chain.openai.skipped"), 1);
        assert_eq!(metrics.counter("chain.offline.succeeded"), 1);
    }

    #[tokio::test]
    async fn status_reports_latest_sample() {
        let service = Service::start_with(BallastCfg::default(), parts(snapshot(900, 100, 10.0, 80, 25.0, 50)));
        let mut rx = service.snapshots.clone();
        rx.wait_for(Option::is_some).await.unwrap();

        let status = service.status();
        assert!(status.contains("Memory Optimization"), "{status}");

        let out = service.engine().execute(Task::conversation(vec![ChatMessage::user("hi")])).await;
        assert!(out.is_success());
        assert!(service.status().contains("1 total"));
        assert!(service.shutdown().await);
    }

    #[tokio::test]
    async fn conversation_tasks_use_configured_timeout() {
        let cfg = BallastCfg { query_timeout_secs: 7, ..BallastCfg::default() };
        let service = Service::start_with(cfg, parts(snapshot(100, 900, 10.0, 80, 25.0, 50)));
        let session = Uuid::new_v4();
        match service.conversation(vec![ChatMessage::user("hi")], Some(session)) {
            Task::ConversationQuery { timeout, session_id, priority, .. } => {
                assert_eq!(timeout, Duration::from_secs(7));
                assert_eq!(session_id, Some(session));
                assert_eq!(priority, TaskPriority::Normal);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(service.shutdown().await);
    }

    #[tokio::test]
    async fn shutdown_is_prompt() {
        let cfg = BallastCfg { shutdown_timeout_secs: 1, ..BallastCfg::default() };
        let service = Service::start_with(cfg, parts(snapshot(100, 900, 10.0, 80, 25.0, 50)));
        let stopped = tokio::time::timeout(Duration::from_secs(2), service.shutdown()).await;
        assert_eq!(stopped, Ok(true));
    }
}
