//! Streaming provider backends.
//!
//! The supported providers form a closed set: dispatch is a variant match,
//! not a name-keyed constructor table, so an unknown kind cannot get past
//! parsing.

mod anthropic;
mod google;
mod openai;
mod sse;

pub use anthropic::AnthropicBackend;
pub use google::GoogleBackend;
pub use openai::OpenAiBackend;

use crate::error::ConfigError;
use crate::model::{Backend, ModelError, ModelRequest, ModelStream};
use crate::selection::ProviderSelection;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The finite set of supported providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
    Google,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    /// The single place unknown provider names are rejected. Accepts the
    /// vendor names and their common model-family aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "google" | "gemini" => Ok(Self::Google),
            _ => Err(ConfigError::UnsupportedProvider(s.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
        };
        f.write_str(name)
    }
}

/// A backend for whichever provider is currently selected.
pub enum ProviderBackend {
    Anthropic(AnthropicBackend),
    OpenAi(OpenAiBackend),
    Google(GoogleBackend),
}

impl ProviderBackend {
    /// Build the backend for a selection, sharing the process-wide HTTP
    /// client.
    pub fn new(selection: &ProviderSelection, client: reqwest::Client) -> Self {
        match selection.kind {
            ProviderKind::Anthropic => Self::Anthropic(AnthropicBackend::new(
                client,
                &selection.model,
                selection.credential(),
            )),
            ProviderKind::OpenAi => Self::OpenAi(OpenAiBackend::new(
                client,
                &selection.model,
                selection.credential(),
            )),
            ProviderKind::Google => Self::Google(GoogleBackend::new(
                client,
                &selection.model,
                selection.credential(),
            )),
        }
    }
}

impl Backend for ProviderBackend {
    async fn stream(&self, request: ModelRequest<'_>) -> Result<ModelStream, ModelError> {
        match self {
            Self::Anthropic(backend) => backend.stream(request).await,
            Self::OpenAi(backend) => backend.stream(request).await,
            Self::Google(backend) => backend.stream(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_parse() {
        assert_eq!("anthropic".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!("gemini".parse::<ProviderKind>().unwrap(), ProviderKind::Google);
    }

    #[test]
    fn unknown_kind_is_unsupported() {
        let err = "mistral".parse::<ProviderKind>().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProvider(name) if name == "mistral"));
    }
}
