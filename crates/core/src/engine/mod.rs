//! Resource-aware task execution.
//!
//! Every call snapshots the host, picks a strategy, applies its actions,
//! runs the task body on its own tokio task, snapshots again and appends
//! one [`ExecutionRecord`]. The record is written on every path: success,
//! error, panic, timeout and cancellation. Dropping the `execute` future
//! counts as cancellation.

pub mod actions;
pub mod handlers;
pub mod history;
pub mod reclaim;

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ballast_llm::ProviderChain;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::conversation::ConversationStore;
use crate::monitor::metrics::MetricsRegistry;
use crate::monitor::ResourceSource;
use crate::strategy;
use crate::types::{ExecutionRecord, ExecutionResult, Task};
use actions::{MemoryReclaimer, NoopReclaimer};
use handlers::{ConversationHandler, DispatchError, HandlerContext, SystemAnalysisHandler, TaskHandler};
use history::ExecutionHistory;

/// Default history bound.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Time allowed past a query's timeout for the offline tier and persistence.
pub const OFFLINE_GRACE: Duration = Duration::from_secs(5);

/// Aggregates over the retained history.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EngineStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub mean_execution_ms: f64,
}

#[derive(Clone)]
pub struct ExecutionEngine {
    source: Arc<dyn ResourceSource>,
    metrics: Arc<MetricsRegistry>,
    history: Arc<ExecutionHistory>,
    reclaimer: Arc<dyn MemoryReclaimer>,
    chain: Arc<ProviderChain>,
    conversation: Arc<dyn TaskHandler>,
    analysis: Option<Arc<dyn TaskHandler>>,
    interaction: Option<Arc<dyn TaskHandler>>,
}

impl ExecutionEngine {
    /// Engine with the built-in system analysis handler and no
    /// interaction handler.
    pub fn new(source: Arc<dyn ResourceSource>, metrics: Arc<MetricsRegistry>, chain: Arc<ProviderChain>) -> Self {
        Self {
            source,
            metrics,
            history: Arc::new(ExecutionHistory::new(DEFAULT_HISTORY_CAPACITY)),
            reclaimer: Arc::new(NoopReclaimer),
            conversation: Arc::new(ConversationHandler::new(Arc::clone(&chain))),
            chain,
            analysis: Some(Arc::new(SystemAnalysisHandler)),
            interaction: None,
        }
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history = Arc::new(ExecutionHistory::new(capacity));
        self
    }

    pub fn with_reclaimer(mut self, reclaimer: Arc<dyn MemoryReclaimer>) -> Self {
        self.reclaimer = reclaimer;
        self
    }

    /// Persist sessions of conversation queries that carry a `session_id`,
    /// replaying the last `history_turns` turns into each request.
    pub fn with_conversation_store(mut self, store: Arc<dyn ConversationStore>, history_turns: usize) -> Self {
        let handler = ConversationHandler::new(Arc::clone(&self.chain))
            .with_store(store)
            .with_history_limit(history_turns);
        self.conversation = Arc::new(handler);
        self
    }

    pub fn with_analysis_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.analysis = Some(handler);
        self
    }

    pub fn with_interaction_handler(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.interaction = Some(handler);
        self
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn chain(&self) -> &Arc<ProviderChain> {
        &self.chain
    }

    pub async fn execute(&self, task: Task) -> ExecutionResult {
        self.execute_with_cancel(task, CancellationToken::new()).await
    }

    /// Run `task` on the tokio worker pool. Aborting the handle cancels the
    /// task; its record is still written.
    pub fn submit(&self, task: Task) -> JoinHandle<ExecutionResult> {
        let engine = self.clone();
        tokio::spawn(async move { engine.execute(task).await })
    }

    /// Like [`execute`](Self::execute), but returns `Cancelled` if `cancel`
    /// fires before the task body finishes.
    pub async fn execute_with_cancel(&self, task: Task, cancel: CancellationToken) -> ExecutionResult {
        let task_type = task.type_tag();
        let priority = task.priority();
        let span = tracing::info_span!("execute", task = task_type, priority = priority.value());

        // The unit runs detached from this future. If the caller drops us,
        // the guard cancels it and it records the cancellation itself.
        let unit = cancel.child_token();
        let _abandon = unit.clone().drop_guard();
        let engine = self.clone();
        let run = tokio::spawn(async move { engine.run(task, unit).await }.instrument(span));
        match run.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => DispatchError::Panicked(panic_message(e.into_panic())).into(),
            Err(_) => ExecutionResult::Cancelled,
        }
    }

    async fn run(&self, task: Task, cancel: CancellationToken) -> ExecutionResult {
        let task_type = task.type_tag();
        let priority = task.priority();
        let started = Instant::now();
        let before = self.source.sample().await;
        let strategy = strategy::select(&before);
        tracing::info!(
            strategy = strategy.name,
            strategy_priority = strategy.priority,
            actions = strategy.actions.len(),
            "strategy selected"
        );
        actions::apply(&strategy, &self.metrics, self.reclaimer.as_ref());

        let strategy_name = strategy.name;
        let ctx = HandlerContext { before, strategy };
        let result = self.dispatch(task, ctx, &cancel).await;

        let after = self.source.sample().await;
        let record = ExecutionRecord {
            task_type,
            priority,
            strategy: strategy_name,
            execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            before,
            after,
            success: result.is_success(),
            timestamp: Utc::now(),
        };
        self.finish(&record, &result);
        self.history.push(record);
        result
    }

    /// Copy of the retained records, oldest first.
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history.snapshot()
    }

    pub fn stats(&self) -> EngineStats {
        let records = self.history.snapshot();
        let total = records.len();
        if total == 0 {
            return EngineStats::default();
        }
        let succeeded = records.iter().filter(|r| r.success).count();
        let elapsed: u64 = records.iter().map(|r| r.execution_time_ms).sum();
        EngineStats {
            total,
            succeeded,
            failed: total - succeeded,
            mean_execution_ms: elapsed as f64 / total as f64,
        }
    }

    async fn dispatch(&self, task: Task, ctx: HandlerContext, cancel: &CancellationToken) -> ExecutionResult {
        let limit = match &task {
            Task::ConversationQuery { timeout, .. } => Some(*timeout + OFFLINE_GRACE),
            Task::SystemAnalysis { .. } | Task::UserInteraction { .. } => None,
        };
        let handler: Option<Arc<dyn TaskHandler>> = match &task {
            Task::ConversationQuery { .. } => Some(self.conversation.clone()),
            Task::SystemAnalysis { .. } => self.analysis.clone(),
            Task::UserInteraction { .. } => self.interaction.clone(),
        };
        let Some(handler) = handler else {
            return DispatchError::Unhandled(task.type_tag()).into();
        };

        let body = tokio::spawn(async move { handler.handle(task, ctx).await });
        let abort = body.abort_handle();

        let joined = tokio::select! {
            _ = cancel.cancelled() => None,
            joined = join_bounded(body, limit) => Some(joined),
        };
        // no-op when the body already finished
        abort.abort();

        match joined {
            None => ExecutionResult::Cancelled,
            Some(Ok(result)) => result,
            Some(Err(e)) => e.into(),
        }
    }

    fn finish(&self, record: &ExecutionRecord, result: &ExecutionResult) {
        self.metrics.increment_counter(&format!("tasks.{}", record.task_type));
        self.metrics.increment_counter(&format!("tasks.priority.{}", record.priority.value()));
        self.metrics.record_metric("tasks.last_execution_ms", record.execution_time_ms as f64);
        match result {
            ExecutionResult::Success { .. } => {
                self.metrics.increment_counter("tasks.succeeded");
                tracing::info!(elapsed_ms = record.execution_time_ms, "task succeeded");
            }
            ExecutionResult::Error { message, code } => {
                self.metrics.increment_counter("tasks.failed");
                tracing::warn!(elapsed_ms = record.execution_time_ms, code = %code, error = %message, "task failed");
            }
            ExecutionResult::Cancelled => {
                self.metrics.increment_counter("tasks.cancelled");
                tracing::info!(elapsed_ms = record.execution_time_ms, "task cancelled");
            }
        }
    }
}

/// Await the task body, bounded by `limit`. Panics and aborts become errors.
async fn join_bounded(
    body: JoinHandle<Result<ExecutionResult, DispatchError>>,
    limit: Option<Duration>,
) -> Result<ExecutionResult, DispatchError> {
    let joined = match limit {
        Some(limit) => tokio::time::timeout(limit, body)
            .await
            .map_err(|_| DispatchError::Timeout(limit))?,
        None => body.await,
    };
    match joined {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(DispatchError::Panicked(panic_message(e.into_panic()))),
        Err(e) => Err(DispatchError::Handler(e.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
