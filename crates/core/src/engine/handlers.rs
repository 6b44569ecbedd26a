//! Task bodies. The engine picks one handler per task variant and runs
//! it on its own tokio task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ballast_llm::provider::{ChatMessage, ProviderOutcome, Role};
use ballast_llm::ProviderChain;
use uuid::Uuid;

use crate::conversation::ConversationStore;
use crate::types::{ExecutionResult, OptimizationStrategy, ResourceSnapshot, Task};

/// Why a task body did not produce a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("no handler registered for {0}")]
    Unhandled(&'static str),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl DispatchError {
    /// Code carried by the resulting `ExecutionResult::Error`.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Handler(_) => "handler_failed",
            DispatchError::Unhandled(_) => "unhandled",
            DispatchError::Timeout(_) => "timeout",
            DispatchError::Panicked(_) => "panic",
        }
    }
}

impl From<DispatchError> for ExecutionResult {
    fn from(e: DispatchError) -> Self {
        ExecutionResult::error(e.code(), e.to_string())
    }
}

/// What the engine knew when it dispatched the task.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub before: ResourceSnapshot,
    pub strategy: OptimizationStrategy,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task, ctx: HandlerContext) -> Result<ExecutionResult, DispatchError>;
}

// ── Conversation ────────────────────────────────────────────────

/// Stored turns replayed into each request by default.
pub const DEFAULT_HISTORY_TURNS: usize = 20;

/// Answers `ConversationQuery` through the provider chain.
///
/// The query's `timeout` bounds the remote tiers only. Once it passes the
/// offline tier answers, so a query never ends without a reply because a
/// provider stalled.
pub struct ConversationHandler {
    chain: Arc<ProviderChain>,
    store: Option<Arc<dyn ConversationStore>>,
    history_turns: usize,
}

impl ConversationHandler {
    pub fn new(chain: Arc<ProviderChain>) -> Self {
        Self { chain, store: None, history_turns: DEFAULT_HISTORY_TURNS }
    }

    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replay at most `turns` stored turns, newest kept.
    pub fn with_history_limit(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Insert recent stored turns after any leading system messages.
    async fn with_history(&self, session_id: Uuid, mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let Some(store) = &self.store else { return messages };
        if self.history_turns == 0 {
            return messages;
        }
        match store.recent(session_id, self.history_turns).await {
            Ok(past) if !past.is_empty() => {
                let at = messages.iter().take_while(|m| m.role == Role::System).count();
                messages.splice(at..at, past.into_iter().map(ChatMessage::from));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(%session_id, error = %e, "failed to load conversation history"),
        }
        messages
    }

    async fn persist(&self, session_id: Uuid, user_text: &str, reply: &str, usage: Option<(u32, u32)>, provider: &str) {
        let Some(store) = &self.store else { return };
        let (prompt, completion) = match usage {
            Some((p, c)) => (Some(p), Some(c)),
            None => (None, None),
        };
        if !user_text.is_empty() {
            if let Err(e) = store.append(session_id, Role::User, user_text, prompt, None).await {
                tracing::warn!(%session_id, error = %e, "failed to store user turn");
                return;
            }
        }
        if let Err(e) = store.append(session_id, Role::Assistant, reply, completion, Some(provider)).await {
            tracing::warn!(%session_id, error = %e, "failed to store reply");
        }
    }
}

#[async_trait]
impl TaskHandler for ConversationHandler {
    async fn handle(&self, task: Task, _ctx: HandlerContext) -> Result<ExecutionResult, DispatchError> {
        let tag = task.type_tag();
        let Task::ConversationQuery { messages, session_id, timeout, .. } = task else {
            return Err(DispatchError::Handler(format!("expected conversation_query, got {tag}")));
        };
        let started = tokio::time::Instant::now();

        let user_text = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let messages = match session_id {
            Some(id) => self.with_history(id, messages).await,
            None => messages,
        };

        let budget = timeout.saturating_sub(started.elapsed());
        match self.chain.generate_within(messages, budget).await {
            ProviderOutcome::Success { text, usage, provider } => {
                if let Some(id) = session_id {
                    let counts = usage.map(|u| (u.prompt_tokens, u.completion_tokens));
                    self.persist(id, &user_text, &text, counts, &provider).await;
                }
                let mut metadata = BTreeMap::new();
                if let Some(u) = usage {
                    metadata.insert("prompt_tokens".to_owned(), u.prompt_tokens.to_string());
                    metadata.insert("completion_tokens".to_owned(), u.completion_tokens.to_string());
                    metadata.insert("total_tokens".to_owned(), u.total_tokens.to_string());
                }
                metadata.insert("provider".to_owned(), provider);
                Ok(ExecutionResult::Success { text, metadata })
            }
            ProviderOutcome::Error { message, code } => {
                let code = code.map_or_else(|| "provider_error".to_owned(), |c| format!("provider_{c}"));
                Ok(ExecutionResult::Error { message, code })
            }
            ProviderOutcome::NetworkError => Ok(ExecutionResult::error("network_error", "provider unreachable")),
            ProviderOutcome::RateLimited => Ok(ExecutionResult::error("rate_limited", "provider rate limited")),
        }
    }
}

// ── System analysis ─────────────────────────────────────────────

/// Reports the pre-dispatch snapshot and the strategy chosen for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAnalysisHandler;

#[async_trait]
impl TaskHandler for SystemAnalysisHandler {
    async fn handle(&self, task: Task, ctx: HandlerContext) -> Result<ExecutionResult, DispatchError> {
        let tag = task.type_tag();
        let Task::SystemAnalysis { kind, .. } = task else {
            return Err(DispatchError::Handler(format!("expected system_analysis, got {tag}")));
        };
        let s = &ctx.before;
        let finding = match kind.as_str() {
            "memory" => format!(
                "memory {} MB used, {} MB available ({:.0}% pressure)",
                s.memory_used_mb,
                s.memory_available_mb,
                s.memory_pressure() * 100.0
            ),
            "cpu" => format!("cpu {:.1}%", s.cpu_usage_percent),
            "battery" => format!("battery {}% at {:.1}°C", s.battery_level, s.battery_temperature_c),
            "network" => format!("network latency {} ms", s.network_latency_ms),
            _ => s.summary(),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("kind".to_owned(), kind);
        metadata.insert("strategy".to_owned(), ctx.strategy.name.to_owned());
        metadata.insert("strategy_priority".to_owned(), ctx.strategy.priority.to_string());
        metadata.insert(
            "estimated_improvement_percent".to_owned(),
            ctx.strategy.estimated_improvement_percent.to_string(),
        );
        metadata.insert("memory_pressure".to_owned(), format!("{:.3}", s.memory_pressure()));
        metadata.insert("low_memory".to_owned(), s.is_low_memory().to_string());
        metadata.insert("battery_low".to_owned(), s.is_battery_low().to_string());
        metadata.insert("overheating".to_owned(), s.is_overheating().to_string());

        Ok(ExecutionResult::Success {
            text: format!("{finding}; strategy: {}", ctx.strategy.name),
            metadata,
        })
    }
}
