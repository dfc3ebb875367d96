//! The active provider selection.

use crate::error::ConfigError;
use crate::providers::ProviderKind;
use std::sync::{PoisonError, RwLock};
use tracing::info;

/// The live (provider, model, credential) triple.
///
/// Reads hand out clones, so an in-flight chat that captured a selection
/// is unaffected by a later replacement. `Display` never includes the
/// credential.
#[derive(Debug, Clone)]
pub struct ProviderSelection {
    pub kind: ProviderKind,
    pub model: String,
    credential: String,
}

impl ProviderSelection {
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl std::fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind, self.model)
    }
}

/// Holds the single active selection, replace-on-write.
///
/// An owned state object rather than a global: tests and embedders
/// construct their own instances.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    active: RwLock<Option<ProviderSelection>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and atomically replace the active selection.
    ///
    /// The previous selection is discarded only after the new one
    /// validates; on any error the prior state is untouched.
    pub fn assign(
        &self,
        kind: ProviderKind,
        model: impl Into<String>,
        credential: impl Into<String>,
    ) -> Result<(), ConfigError> {
        let credential = credential.into();
        if !valid_credential(&credential) {
            return Err(ConfigError::InvalidCredentialFormat);
        }

        let selection = ProviderSelection {
            kind,
            model: model.into(),
            credential,
        };
        info!(%selection, "provider assigned");

        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *active = Some(selection);
        Ok(())
    }

    /// The current selection, if any, by value.
    pub fn current(&self) -> Option<ProviderSelection> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Restrictive token syntax: non-empty, alphanumeric plus `-` and `_`.
fn valid_credential(credential: &str) -> bool {
    !credential.is_empty()
        && credential
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unconfigured() {
        let registry = ProviderRegistry::new();
        assert!(registry.current().is_none());
    }

    #[test]
    fn assign_then_read() {
        let registry = ProviderRegistry::new();
        registry
            .assign(ProviderKind::Anthropic, "claude-sonnet-4-20250514", "abc123")
            .unwrap();

        let selection = registry.current().unwrap();
        assert_eq!(selection.kind, ProviderKind::Anthropic);
        assert_eq!(selection.model, "claude-sonnet-4-20250514");
        assert_eq!(selection.credential(), "abc123");
    }

    #[test]
    fn bad_credentials_are_rejected() {
        let registry = ProviderRegistry::new();
        for credential in ["", "has space", "semi;colon", "new\nline", "dollar$"] {
            let err = registry
                .assign(ProviderKind::Google, "gemini-2.5-flash", credential)
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidCredentialFormat));
        }
        assert!(registry.current().is_none());
    }

    #[test]
    fn failed_assign_preserves_previous_selection() {
        let registry = ProviderRegistry::new();
        registry
            .assign(ProviderKind::OpenAi, "gpt-4o", "first-key")
            .unwrap();

        let err = registry
            .assign(ProviderKind::OpenAi, "gpt-4o", "bad key")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCredentialFormat));

        let selection = registry.current().unwrap();
        assert_eq!(selection.credential(), "first-key");
    }

    #[test]
    fn reads_are_copies() {
        let registry = ProviderRegistry::new();
        registry
            .assign(ProviderKind::Google, "gemini-2.5-flash", "key-one")
            .unwrap();
        let captured = registry.current().unwrap();

        registry
            .assign(ProviderKind::OpenAi, "gpt-4o", "key-two")
            .unwrap();

        // The captured copy still reflects the selection at read time.
        assert_eq!(captured.kind, ProviderKind::Google);
        assert_eq!(captured.credential(), "key-one");
        assert_eq!(registry.current().unwrap().kind, ProviderKind::OpenAi);
    }

    #[test]
    fn display_omits_credential() {
        let registry = ProviderRegistry::new();
        registry
            .assign(ProviderKind::Anthropic, "claude-sonnet-4-20250514", "secret123")
            .unwrap();
        let shown = registry.current().unwrap().to_string();
        assert!(!shown.contains("secret123"));
    }
}
