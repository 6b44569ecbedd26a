use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Completion request sent to every tier of the chain.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, max_tokens: 512, temperature: 0.7 }
    }

    /// Text of the most recent user message, or empty.
    pub fn last_user_text(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// Token accounting reported by a remote provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }
    }
}

/// A successful completion from one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Error type for remote provider calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// Connection-level failure, including timeouts.
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited")]
    RateLimited,
    #[error("request failed ({code}): {message}")]
    Status { code: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Network failures and rate limiting are worth trying elsewhere;
    /// everything else points at the request or the configuration.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::RateLimited)
    }
}

/// Result of asking one tier (or the whole chain) for a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome {
    Success {
        text: String,
        usage: Option<TokenUsage>,
        /// Name of the tier that produced the text.
        provider: String,
    },
    Error {
        message: String,
        code: Option<u16>,
    },
    NetworkError,
    RateLimited,
}

impl ProviderOutcome {
    pub fn from_result(provider: &str, result: Result<Completion, ProviderError>) -> Self {
        match result {
            Ok(c) => ProviderOutcome::Success { text: c.text, usage: c.usage, provider: provider.to_owned() },
            Err(ProviderError::Network(_)) => ProviderOutcome::NetworkError,
            Err(ProviderError::RateLimited) => ProviderOutcome::RateLimited,
            Err(ProviderError::Status { code, message }) => {
                ProviderOutcome::Error { message, code: Some(code) }
            }
            Err(ProviderError::Malformed(message)) => ProviderOutcome::Error { message, code: None },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Success { .. })
    }

    /// Reply text when successful.
    pub fn text(&self) -> Option<&str> {
        match self {
            ProviderOutcome::Success { text, .. } => Some(text),
            _ => None,
        }
    }
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>>;

/// A remote completion service.
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the provider is configured to be called at all.
    fn is_available(&self) -> bool;

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_>;
}

/// Mock provider for testing. Replays scripted results, repeating the last one.
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    available: bool,
    script: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new(response: impl Into<String>) -> Self {
        Self::scripted("mock", vec![Ok(Completion {
            text: response.into(),
            usage: Some(TokenUsage::new(10, 20)),
        })])
    }

    pub fn failing(name: impl Into<String>, error: ProviderError) -> Self {
        Self::scripted(name, vec![Err(error)])
    }

    pub fn scripted(name: impl Into<String>, script: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            name: name.into(),
            available: true,
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of times `complete` was invoked.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.calls.lock().last().cloned()
    }

    fn next_result(&self) -> Result<Completion, ProviderError> {
        let mut script = self.script.lock();
        if script.len() > 1 {
            script.pop_front().unwrap_or(Err(ProviderError::Malformed("empty script".into())))
        } else {
            script.front().cloned().unwrap_or(Err(ProviderError::Malformed("empty script".into())))
        }
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_> {
        self.calls.lock().push(request);
        let result = self.next_result();
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_provider_returns_response() {
        let mock = MockProvider::new("hello there");
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        let resp = mock.complete(req).await.unwrap();
        assert_eq!(resp.text, "hello there");
        assert_eq!(resp.usage, Some(TokenUsage::new(10, 20)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn mock_script_repeats_last_entry() {
        let mock = MockProvider::scripted("m", vec![
            Err(ProviderError::RateLimited),
            Ok(Completion { text: "ok".into(), usage: None }),
        ]);
        let req = CompletionRequest::new(vec![ChatMessage::user("x")]);
        assert_eq!(mock.complete(req.clone()).await, Err(ProviderError::RateLimited));
        assert_eq!(mock.complete(req.clone()).await.unwrap().text, "ok");
        assert_eq!(mock.complete(req).await.unwrap().text, "ok");
    }

    #[test]
    fn outcome_mapping() {
        assert_eq!(
            ProviderOutcome::from_result("p", Err(ProviderError::Network("refused".into()))),
            ProviderOutcome::NetworkError
        );
        assert_eq!(
            ProviderOutcome::from_result("p", Err(ProviderError::RateLimited)),
            ProviderOutcome::RateLimited
        );
        assert_eq!(
            ProviderOutcome::from_result("p", Err(ProviderError::Status { code: 401, message: "bad key".into() })),
            ProviderOutcome::Error { message: "bad key".into(), code: Some(401) }
        );
        let ok = ProviderOutcome::from_result("p", Ok(Completion { text: "t".into(), usage: None }));
        assert!(ok.is_success());
        assert_eq!(ok.text(), Some("t"));
    }

    #[test]
    fn transient_classification() {
        assert!(ProviderError::RateLimited.is_transient());
        assert!(ProviderError::Network("timeout".into()).is_transient());
        assert!(!ProviderError::Status { code: 400, message: String::new() }.is_transient());
        assert!(!ProviderError::Malformed("eof".into()).is_transient());
    }

    #[test]
    fn last_user_text_picks_latest() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("second"),
        ]);
        assert_eq!(req.last_user_text(), "second");
        assert_eq!(CompletionRequest::new(vec![]).last_user_text(), "");
    }
}
