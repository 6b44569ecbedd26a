//! Tiered fallback over remote providers, ending at the offline generator.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::offline::OfflineGenerator;
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider, ProviderError, ProviderOutcome};

/// Name reported for replies produced by the terminal tier.
pub const OFFLINE_PROVIDER: &str = "offline";

/// Which remote failures move the chain on to the next tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainPolicy {
    /// Every non-success outcome continues the chain.
    #[default]
    FallThroughAll,
    /// Only network errors and rate limiting continue; any other error
    /// is returned to the caller as `ProviderOutcome::Error`.
    TransientOnly,
}

impl std::str::FromStr for ChainPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fall_through_all" => Ok(Self::FallThroughAll),
            "transient_only" => Ok(Self::TransientOnly),
            other => Err(format!("unknown chain policy: {other}")),
        }
    }
}

/// What happened at one tier during a `generate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierEvent {
    Skipped,
    Succeeded,
    NetworkError,
    RateLimited,
    Failed,
    /// The remote budget ran out while this tier was working.
    TimedOut,
}

impl TierEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            TierEvent::Skipped => "skipped",
            TierEvent::Succeeded => "succeeded",
            TierEvent::NetworkError => "network_error",
            TierEvent::RateLimited => "rate_limited",
            TierEvent::Failed => "failed",
            TierEvent::TimedOut => "timed_out",
        }
    }

    fn from_error(e: &ProviderError) -> Self {
        match e {
            ProviderError::Network(_) => TierEvent::NetworkError,
            ProviderError::RateLimited => TierEvent::RateLimited,
            ProviderError::Status { .. } | ProviderError::Malformed(_) => TierEvent::Failed,
        }
    }
}

/// Receives per-tier events so failures absorbed by the chain stay visible.
pub trait ChainObserver: Send + Sync {
    fn on_tier(&self, provider: &str, event: TierEvent);
}

/// Tiered provider chain. Remote providers are tried in order; the
/// offline generator answers when none of them does.
pub struct ProviderChain {
    remotes: Vec<Arc<dyn LlmProvider>>,
    offline: Arc<OfflineGenerator>,
    policy: ChainPolicy,
    observer: Option<Arc<dyn ChainObserver>>,
    max_tokens: u32,
    temperature: f32,
}

impl ProviderChain {
    pub fn new(remotes: Vec<Arc<dyn LlmProvider>>, offline: Arc<OfflineGenerator>) -> Self {
        Self {
            remotes,
            offline,
            policy: ChainPolicy::default(),
            observer: None,
            max_tokens: 512,
            temperature: 0.7,
        }
    }

    /// Offline tier only.
    pub fn offline_only(offline: Arc<OfflineGenerator>) -> Self {
        Self::new(Vec::new(), offline)
    }

    pub fn with_policy(mut self, policy: ChainPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ChainObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    /// Always true: the offline tier needs neither credentials nor network.
    pub fn is_available(&self) -> bool {
        true
    }

    /// Names of the tiers, in the order they are tried.
    pub fn tier_names(&self) -> Vec<String> {
        self.remotes
            .iter()
            .map(|p| p.name().to_owned())
            .chain(std::iter::once(OFFLINE_PROVIDER.to_owned()))
            .collect()
    }

    pub async fn generate(&self, messages: Vec<ChatMessage>) -> ProviderOutcome {
        let mut request = CompletionRequest::new(messages);
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        self.generate_request(request).await
    }

    /// Like [`generate`](Self::generate), but remote tiers share `budget`.
    /// When it runs out the offline tier answers, so the reply still arrives
    /// shortly after the budget.
    pub async fn generate_within(&self, messages: Vec<ChatMessage>, budget: Duration) -> ProviderOutcome {
        let mut request = CompletionRequest::new(messages);
        request.max_tokens = self.max_tokens;
        request.temperature = self.temperature;
        self.generate_until(request, Some(Instant::now() + budget)).await
    }

    pub async fn generate_request(&self, request: CompletionRequest) -> ProviderOutcome {
        self.generate_until(request, None).await
    }

    async fn generate_until(&self, request: CompletionRequest, deadline: Option<Instant>) -> ProviderOutcome {
        for provider in &self.remotes {
            let name = provider.name();
            if !provider.is_available() {
                tracing::debug!(provider = name, "provider unavailable, skipping");
                self.notify(name, TierEvent::Skipped);
                continue;
            }

            let call = provider.complete(request.clone());
            let result = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
                    Ok(result) => result,
                    Err(_) => {
                        self.notify(name, TierEvent::TimedOut);
                        tracing::warn!(provider = name, "remote budget exhausted, answering offline");
                        break;
                    }
                },
                None => call.await,
            };

            match result {
                Ok(completion) => {
                    self.notify(name, TierEvent::Succeeded);
                    return ProviderOutcome::from_result(name, Ok(completion));
                }
                Err(e) => {
                    self.notify(name, TierEvent::from_error(&e));
                    tracing::warn!(provider = name, error = %e, "provider failed");
                    if self.policy == ChainPolicy::TransientOnly && !e.is_transient() {
                        return ProviderOutcome::from_result(name, Err(e));
                    }
                }
            }
        }

        let reply = self.offline.generate(request.last_user_text());
        self.notify(OFFLINE_PROVIDER, TierEvent::Succeeded);
        tracing::info!(tier = ?reply.tier, confidence = reply.confidence, "answered offline");
        ProviderOutcome::Success { text: reply.text, usage: None, provider: OFFLINE_PROVIDER.to_owned() }
    }

    fn notify(&self, provider: &str, event: TierEvent) {
        if let Some(observer) = &self.observer {
            observer.on_tier(provider, event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Completion, MockProvider};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, TierEvent)>>,
    }

    impl ChainObserver for Recorder {
        fn on_tier(&self, provider: &str, event: TierEvent) {
            self.events.lock().push((provider.to_owned(), event));
        }
    }

    fn offline() -> Arc<OfflineGenerator> {
        Arc::new(OfflineGenerator::new())
    }

    fn ask(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system("be brief"), ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn primary_success_short_circuits() {
        let primary = Arc::new(MockProvider::new("from primary").with_name("primary"));
        let secondary = Arc::new(MockProvider::new("from secondary").with_name("secondary"));
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary.clone(), secondary.clone()];
        let chain = ProviderChain::new(tiers, offline());

        let out = chain.generate(ask("hi")).await;
        assert_eq!(out.text(), Some("from primary"));
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn remote_failures_fall_through_to_offline() {
        let primary = Arc::new(MockProvider::failing("primary", ProviderError::RateLimited));
        let secondary = Arc::new(MockProvider::failing("secondary", ProviderError::Network("reset".into())));
        let recorder = Arc::new(Recorder::default());
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary.clone(), secondary.clone()];
        let chain = ProviderChain::new(tiers, offline()).with_observer(recorder.clone());

        let out = chain.generate(ask("what's my battery level")).await;
        match out {
            ProviderOutcome::Success { provider, usage, text } => {
                assert_eq!(provider, OFFLINE_PROVIDER);
                assert_eq!(usage, None);
                assert!(text.contains("battery"));
            }
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(primary.call_count(), 1);
        assert_eq!(secondary.call_count(), 1);
        assert_eq!(
            *recorder.events.lock(),
            vec![
                ("primary".to_owned(), TierEvent::RateLimited),
                ("secondary".to_owned(), TierEvent::NetworkError),
                (OFFLINE_PROVIDER.to_owned(), TierEvent::Succeeded),
            ]
        );
    }

    #[tokio::test]
    async fn hard_error_falls_through_by_default() {
        let primary = Arc::new(MockProvider::failing(
            "primary",
            ProviderError::Status { code: 400, message: "bad request".into() },
        ));
        let secondary = Arc::new(MockProvider::new("from secondary").with_name("secondary"));
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary, secondary];
        let chain = ProviderChain::new(tiers, offline());
        assert_eq!(chain.generate(ask("x")).await.text(), Some("from secondary"));
    }

    #[tokio::test]
    async fn transient_only_surfaces_hard_errors() {
        let primary = Arc::new(MockProvider::failing(
            "primary",
            ProviderError::Status { code: 401, message: "invalid key".into() },
        ));
        let secondary = Arc::new(MockProvider::new("unused").with_name("secondary"));
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary, secondary.clone()];
        let chain = ProviderChain::new(tiers, offline()).with_policy(ChainPolicy::TransientOnly);

        let out = chain.generate(ask("x")).await;
        assert_eq!(out, ProviderOutcome::Error { message: "invalid key".into(), code: Some(401) });
        assert_eq!(secondary.call_count(), 0);
    }

    #[tokio::test]
    async fn transient_only_still_continues_on_rate_limit() {
        let primary = Arc::new(MockProvider::failing("primary", ProviderError::RateLimited));
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary];
        let chain = ProviderChain::new(tiers, offline()).with_policy(ChainPolicy::TransientOnly);
        let out = chain.generate(ask("hello")).await;
        assert!(out.is_success());
    }

    #[tokio::test]
    async fn unavailable_providers_are_not_called() {
        let primary = Arc::new(MockProvider::new("never").unavailable());
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary.clone()];
        let chain = ProviderChain::new(tiers, offline());
        let out = chain.generate(ask("thanks")).await;
        assert!(out.is_success());
        assert_eq!(primary.call_count(), 0);
    }

    #[tokio::test]
    async fn offline_only_always_succeeds() {
        let chain = ProviderChain::offline_only(offline());
        assert!(chain.is_available());
        for input in ["", "?", "hi", "tell me a story", "weather tomorrow?"] {
            assert!(chain.generate(ask(input)).await.is_success(), "input {input:?}");
        }
        assert!(chain.generate(Vec::new()).await.is_success());
    }

    #[tokio::test]
    async fn sampling_parameters_reach_provider() {
        let primary = Arc::new(MockProvider::scripted("primary", vec![Ok(Completion {
            text: "ok".into(),
            usage: None,
        })]));
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary.clone()];
        let chain = ProviderChain::new(tiers, offline()).with_sampling(64, 0.2);
        chain.generate(ask("x")).await;
        let req = primary.last_request().unwrap();
        assert_eq!(req.max_tokens, 64);
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
    }

    /// Fails with a network error after `delay`.
    struct Stalling {
        name: &'static str,
        delay: std::time::Duration,
    }

    impl LlmProvider for Stalling {
        fn name(&self) -> &str {
            self.name
        }

        fn is_available(&self) -> bool {
            true
        }

        fn complete(&self, _request: CompletionRequest) -> crate::provider::CompletionFuture<'_> {
            let delay = self.delay;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Err(ProviderError::Network("read timed out".into()))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_still_answers_offline() {
        let recorder = Arc::new(Recorder::default());
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![
            Arc::new(Stalling { name: "primary", delay: Duration::from_secs(85) }),
            Arc::new(Stalling { name: "secondary", delay: Duration::from_secs(85) }),
        ];
        let chain = ProviderChain::new(tiers, offline()).with_observer(recorder.clone());

        let started = Instant::now();
        let out = chain.generate_within(ask("what's my battery level"), Duration::from_secs(120)).await;
        match out {
            ProviderOutcome::Success { provider, text, .. } => {
                assert_eq!(provider, OFFLINE_PROVIDER);
                assert!(text.contains("battery"));
            }
            other => panic!("expected offline success, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(121));
        assert_eq!(
            *recorder.events.lock(),
            vec![
                ("primary".to_owned(), TierEvent::NetworkError),
                ("secondary".to_owned(), TierEvent::TimedOut),
                (OFFLINE_PROVIDER.to_owned(), TierEvent::Succeeded),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fast_remote_wins_within_budget() {
        let primary = Arc::new(MockProvider::new("quick").with_name("primary"));
        let tiers: Vec<Arc<dyn LlmProvider>> = vec![primary];
        let chain = ProviderChain::new(tiers, offline());
        let out = chain.generate_within(ask("hi"), Duration::from_secs(1)).await;
        assert_eq!(out.text(), Some("quick"));
    }

    #[test]
    fn tier_names_end_offline() {
        let primary: Arc<dyn LlmProvider> = Arc::new(MockProvider::new("x").with_name("primary"));
        let chain = ProviderChain::new(vec![primary], offline());
        assert_eq!(chain.tier_names(), vec!["primary".to_owned(), OFFLINE_PROVIDER.to_owned()]);
    }
}
