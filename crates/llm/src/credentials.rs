//! Secret lookup for remote providers.
//!
//! The set of names is closed: asking for a credential that does not exist
//! is a caller bug and surfaces as [`CredentialError::Unknown`] when parsing
//! a name, never at lookup time.

use std::collections::HashMap;
use std::str::FromStr;

use parking_lot::RwLock;

/// Every credential the chain knows how to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialName {
    PrimaryApiKey,
    SecondaryApiKey,
    PrimaryModel,
    SecondaryModel,
    PrimaryBaseUrl,
    SecondaryBaseUrl,
}

impl CredentialName {
    pub const ALL: [CredentialName; 6] = [
        CredentialName::PrimaryApiKey,
        CredentialName::SecondaryApiKey,
        CredentialName::PrimaryModel,
        CredentialName::SecondaryModel,
        CredentialName::PrimaryBaseUrl,
        CredentialName::SecondaryBaseUrl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CredentialName::PrimaryApiKey => "primary_api_key",
            CredentialName::SecondaryApiKey => "secondary_api_key",
            CredentialName::PrimaryModel => "primary_model",
            CredentialName::SecondaryModel => "secondary_model",
            CredentialName::PrimaryBaseUrl => "primary_base_url",
            CredentialName::SecondaryBaseUrl => "secondary_base_url",
        }
    }

    /// Environment variable consulted by [`EnvCredentials`].
    pub fn env_var(self) -> &'static str {
        match self {
            CredentialName::PrimaryApiKey => "BALLAST_PRIMARY_API_KEY",
            CredentialName::SecondaryApiKey => "BALLAST_SECONDARY_API_KEY",
            CredentialName::PrimaryModel => "BALLAST_PRIMARY_MODEL",
            CredentialName::SecondaryModel => "BALLAST_SECONDARY_MODEL",
            CredentialName::PrimaryBaseUrl => "BALLAST_PRIMARY_BASE_URL",
            CredentialName::SecondaryBaseUrl => "BALLAST_SECONDARY_BASE_URL",
        }
    }
}

impl FromStr for CredentialName {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialName::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| CredentialError::Unknown(s.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("unknown credential: {0}")]
    Unknown(String),
    #[error("credential store write failed: {0}")]
    WriteFailed(String),
}

/// Narrow get/set contract over whatever actually stores secrets.
pub trait CredentialStore: Send + Sync {
    /// Returns `None` for missing or blank values.
    fn get(&self, name: CredentialName) -> Option<String>;

    fn set(&self, name: CredentialName, secret: &str) -> Result<(), CredentialError>;
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// In-process credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    values: RwLock<HashMap<CredentialName, String>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: CredentialName, secret: impl Into<String>) -> Self {
        self.values.write().insert(name, secret.into());
        self
    }
}

impl CredentialStore for MemoryCredentials {
    fn get(&self, name: CredentialName) -> Option<String> {
        non_blank(self.values.read().get(&name).cloned())
    }

    fn set(&self, name: CredentialName, secret: &str) -> Result<(), CredentialError> {
        self.values.write().insert(name, secret.to_owned());
        Ok(())
    }
}

/// Reads `BALLAST_*` environment variables; `set` overlays values in memory.
#[derive(Debug, Default)]
pub struct EnvCredentials {
    overlay: MemoryCredentials,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for EnvCredentials {
    fn get(&self, name: CredentialName) -> Option<String> {
        self.overlay
            .get(name)
            .or_else(|| non_blank(std::env::var(name.env_var()).ok()))
    }

    fn set(&self, name: CredentialName, secret: &str) -> Result<(), CredentialError> {
        self.overlay.set(name, secret)
    }
}
