//! Network-free reply generation: the terminal tier of the provider chain.
//!
//! Tries a bundled inference model when one is loaded, then a keyword rule
//! table. [`OfflineGenerator::generate`] cannot fail.

pub mod model;
pub mod rules;
pub mod vocab;

use std::sync::Arc;

use model::InferenceModel;
use vocab::Vocabulary;

/// Confidence assigned to anything the model tier produces.
const MODEL_CONFIDENCE: f32 = 0.7;

/// Which offline tier produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineTier {
    Model,
    Rules,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OfflineReply {
    pub text: String,
    pub confidence: f32,
    pub tier: OfflineTier,
}

/// Local reply generator.
pub struct OfflineGenerator {
    vocab: Vocabulary,
    model: Option<Arc<dyn InferenceModel>>,
}

impl OfflineGenerator {
    /// Rule tier only.
    pub fn new() -> Self {
        Self { vocab: Vocabulary::default(), model: None }
    }

    pub fn with_vocab_size(max_vocab: usize) -> Self {
        Self { vocab: Vocabulary::build(max_vocab), model: None }
    }

    pub fn with_model(mut self, model: Arc<dyn InferenceModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    pub fn generate(&self, text: &str) -> OfflineReply {
        if let Some(reply) = self.model_reply(text) {
            return reply;
        }
        let rule = rules::respond(text);
        tracing::debug!(rule = rule.rule, "offline rule tier answered");
        OfflineReply { text: rule.text, confidence: rule.confidence, tier: OfflineTier::Rules }
    }

    fn model_reply(&self, text: &str) -> Option<OfflineReply> {
        let model = self.model.as_ref()?;
        let input = self.vocab.encode(text, model.input_len());
        let output = match model.run(&input) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "offline model failed, using rule tier");
                return None;
            }
        };
        let decoded = self.vocab.decode(&output);
        if decoded.trim().is_empty() {
            return None;
        }
        Some(OfflineReply { text: decoded, confidence: MODEL_CONFIDENCE, tier: OfflineTier::Model })
    }
}

impl Default for OfflineGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{EchoModel, InferenceError};
    use vocab::PAD_ID;

    struct BrokenModel;

    impl InferenceModel for BrokenModel {
        fn input_len(&self) -> usize {
            8
        }

        fn run(&self, _input: &[i64]) -> Result<Vec<i64>, InferenceError> {
            Err(InferenceError::Backend("delegate crashed".into()))
        }
    }

    struct SilentModel;

    impl InferenceModel for SilentModel {
        fn input_len(&self) -> usize {
            8
        }

        fn run(&self, _input: &[i64]) -> Result<Vec<i64>, InferenceError> {
            Ok(vec![PAD_ID; 8])
        }
    }

    #[test]
    fn rules_without_model() {
        let generator = OfflineGenerator::new();
        let reply = generator.generate("what's my battery level");
        assert_eq!(reply.tier, OfflineTier::Rules);
        assert!((reply.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn model_tier_when_loaded() {
        let generator = OfflineGenerator::new().with_model(Arc::new(EchoModel::new(32)));
        let reply = generator.generate("hello world");
        assert_eq!(reply.tier, OfflineTier::Model);
        assert_eq!(reply.text, "hello world");
    }

    #[test]
    fn model_failure_falls_back() {
        let generator = OfflineGenerator::new().with_model(Arc::new(BrokenModel));
        assert_eq!(generator.generate("hello").tier, OfflineTier::Rules);
    }

    #[test]
    fn empty_model_output_falls_back() {
        let generator = OfflineGenerator::new().with_model(Arc::new(SilentModel));
        let reply = generator.generate("close the app");
        assert_eq!(reply.tier, OfflineTier::Rules);
        assert!(!reply.text.is_empty());
    }
}
