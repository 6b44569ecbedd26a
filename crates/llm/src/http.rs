//! HTTP-based remote providers.
//!
//! Supports OpenAI-compatible APIs (OpenAI, Google Gemini, DeepSeek, etc.)
//! and Anthropic's native Messages API.

use crate::credentials::{CredentialName, CredentialStore};
use crate::provider::{
    ChatMessage, Completion, CompletionFuture, CompletionRequest, LlmProvider, ProviderError, Role,
    TokenUsage,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inferred provider kind from model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Google,
    DeepSeek,
    /// Falls back to OpenAI-compatible format.
    Unknown,
}

impl ProviderKind {
    /// Infer provider from model name prefix.
    pub fn from_model(model: &str) -> Self {
        let m = model.to_lowercase();
        if m.starts_with("gpt-")
            || m.starts_with("o1-")
            || m.starts_with("o3-")
            || m.starts_with("o4-")
        {
            Self::OpenAi
        } else if m.starts_with("claude-") {
            Self::Anthropic
        } else if m.starts_with("gemini-") {
            Self::Google
        } else if m.starts_with("deepseek-") {
            Self::DeepSeek
        } else {
            Self::Unknown
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi | Self::Unknown => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com",
            Self::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::DeepSeek => "https://api.deepseek.com",
        }
    }

    fn is_anthropic(self) -> bool {
        matches!(self, Self::Anthropic)
    }
}

/// Position of a remote provider in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSlot {
    Primary,
    Secondary,
}

impl ProviderSlot {
    fn default_model(self) -> &'static str {
        match self {
            Self::Primary => "gpt-4o-mini",
            Self::Secondary => "claude-3-5-haiku-latest",
        }
    }

    fn credential_names(self) -> (CredentialName, CredentialName, CredentialName) {
        match self {
            Self::Primary => (
                CredentialName::PrimaryApiKey,
                CredentialName::PrimaryModel,
                CredentialName::PrimaryBaseUrl,
            ),
            Self::Secondary => (
                CredentialName::SecondaryApiKey,
                CredentialName::SecondaryModel,
                CredentialName::SecondaryBaseUrl,
            ),
        }
    }
}

/// Outbound call bounds. Read and write share the overall request timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { connect: Duration::from_secs(30), request: Duration::from_secs(90) }
    }
}

// ── OpenAI-compatible request/response types ──

#[derive(Serialize)]
struct OaiRequest {
    model: String,
    messages: Vec<OaiMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct OaiMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct OaiResponse {
    choices: Vec<OaiChoice>,
    usage: Option<OaiUsage>,
}

#[derive(Deserialize)]
struct OaiChoice {
    message: OaiChoiceMessage,
}

#[derive(Deserialize)]
struct OaiChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OaiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// ── Anthropic Messages API types ──

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<OaiMessage>,
    temperature: f32,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ── Provider ──

/// HTTP-based provider. Handles both OpenAI-compatible and Anthropic APIs.
pub struct HttpProvider {
    kind: ProviderKind,
    model: String,
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpProvider {
    /// Build from model name + API key + optional base URL override.
    pub fn new(model: String, api_key: String, base_url: Option<String>) -> Self {
        Self::with_timeouts(model, api_key, base_url, HttpTimeouts::default())
    }

    pub fn with_timeouts(
        model: String,
        api_key: String,
        base_url: Option<String>,
        timeouts: HttpTimeouts,
    ) -> Self {
        let kind = ProviderKind::from_model(&model);
        let base = base_url.unwrap_or_else(|| kind.default_base_url().to_owned());
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.request)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "http client builder failed, using defaults");
                reqwest::Client::new()
            });
        Self {
            kind,
            model,
            client,
            base_url: base.trim_end_matches('/').to_owned(),
            api_key,
        }
    }

    /// Build the provider for `slot` from the credential store.
    /// A missing key still yields a provider; it just reports itself unavailable.
    pub fn from_credentials(
        store: &dyn CredentialStore,
        slot: ProviderSlot,
        timeouts: HttpTimeouts,
    ) -> Self {
        let (key_name, model_name, url_name) = slot.credential_names();
        let model = store.get(model_name).unwrap_or_else(|| slot.default_model().to_owned());
        let api_key = store.get(key_name).unwrap_or_default();
        Self::with_timeouts(model, api_key, store.get(url_name), timeouts)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        if self.kind.is_anthropic() {
            format!("{}/v1/messages", self.base_url)
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }
}

fn wire_message(m: &ChatMessage) -> OaiMessage {
    OaiMessage { role: m.role.as_str(), content: m.content.clone() }
}

/// Map a non-2xx response, returning RateLimited for 429.
fn check_error(status: reqwest::StatusCode, body: String) -> ProviderError {
    if status.as_u16() == 429 {
        ProviderError::RateLimited
    } else {
        ProviderError::Status { code: status.as_u16(), message: body }
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_decode() {
        ProviderError::Malformed(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Unknown => "openai-compatible",
        }
    }

    fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    fn complete(&self, request: CompletionRequest) -> CompletionFuture<'_> {
        if self.kind.is_anthropic() {
            Box::pin(self.complete_anthropic(request))
        } else {
            Box::pin(self.complete_openai(request))
        }
    }
}

impl HttpProvider {
    async fn send<T: Serialize>(&self, builder: reqwest::RequestBuilder, body: &T) -> Result<reqwest::Response, ProviderError> {
        let resp = builder.json(body).send().await.map_err(transport_error)?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(check_error(status, text));
        }
        Ok(resp)
    }

    /// OpenAI-compatible completion (OpenAI, Gemini, DeepSeek, Unknown).
    async fn complete_openai(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = OaiRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(wire_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let builder = self.client.post(self.endpoint()).bearer_auth(&self.api_key);
        let resp = self.send(builder, &body).await?;
        let api: OaiResponse = resp.json().await.map_err(transport_error)?;

        let text = api
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Malformed("response carried no choices".into()))?;
        let usage = api.usage.map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens));

        Ok(Completion { text, usage })
    }

    /// Anthropic Messages API completion.
    async fn complete_anthropic(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = anthropic_body(&self.model, &request);
        let builder = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01");
        let resp = self.send(builder, &body).await?;
        let api: AnthropicResponse = resp.json().await.map_err(transport_error)?;

        let text: String = api
            .content
            .into_iter()
            .filter_map(|b| match b {
                AnthropicResponseBlock::Text { text } => Some(text),
                AnthropicResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        if text.is_empty() {
            return Err(ProviderError::Malformed("response carried no text blocks".into()));
        }
        let usage = api.usage.map(|u| TokenUsage::new(u.input_tokens, u.output_tokens));

        Ok(Completion { text, usage })
    }
}

/// Anthropic takes the system prompt at top level. Several system messages
/// are joined in order.
fn anthropic_body(model: &str, request: &CompletionRequest) -> AnthropicRequest {
    let (system, rest): (Vec<&ChatMessage>, Vec<&ChatMessage>) =
        request.messages.iter().partition(|m| m.role == Role::System);
    let system = (!system.is_empty())
        .then(|| system.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n"));

    AnthropicRequest {
        model: model.to_owned(),
        max_tokens: request.max_tokens,
        system,
        messages: rest.into_iter().map(wire_message).collect(),
        temperature: request.temperature,
    }
}
