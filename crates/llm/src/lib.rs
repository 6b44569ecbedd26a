//! Provider side of ballast: remote completion providers, the credential
//! contract they are configured through, the offline generator, and the
//! chain that degrades from one to the next.

pub mod chain;
pub mod credentials;
pub mod http;
pub mod offline;
pub mod provider;

pub use chain::{ChainObserver, ChainPolicy, ProviderChain, TierEvent};
pub use offline::OfflineGenerator;
pub use provider::{ChatMessage, LlmProvider, ProviderOutcome, Role, TokenUsage};
