//! The gateway front door.
//!
//! Ties the provider selection, tool registry and connectors together and
//! exposes the three boundary operations: assign a model, attach a tool
//! server, run a chat.

use crate::chat::{ChatStream, run_chat};
use crate::connector::{LaunchSpec, ToolServer};
use crate::error::{ChatError, ConfigError, ConnectError};
use crate::model::{Message, ToolSpec};
use crate::providers::{ProviderBackend, ProviderKind};
use crate::selection::{ProviderRegistry, ProviderSelection};
use crate::tools::ToolRegistry;
use policy::LaunchPolicy;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const CHAT_CHANNEL_CAPACITY: usize = 32;

/// A chat gateway instance.
///
/// All state is owned here and injected downward — nothing is a process
/// global, so tests and embedders construct as many gateways as they like.
pub struct Gateway {
    selection: ProviderRegistry,
    tools: ToolRegistry,
    connectors: Mutex<Vec<Arc<ToolServer>>>,
    launch_policy: LaunchPolicy,
    http: reqwest::Client,
    system: Option<String>,
}

impl Gateway {
    pub fn new(launch_policy: LaunchPolicy) -> Self {
        Self {
            selection: ProviderRegistry::new(),
            tools: ToolRegistry::new(),
            connectors: Mutex::new(Vec::new()),
            launch_policy,
            http: reqwest::Client::new(),
            system: None,
        }
    }

    /// Set the system prompt used for every chat.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Assign the active provider. `kind` is the untrusted string boundary;
    /// everything past parsing works with the closed enum.
    pub fn assign_model(
        &self,
        kind: &str,
        model: &str,
        credential: &str,
    ) -> Result<(), ConfigError> {
        let kind: ProviderKind = kind.parse()?;
        self.selection.assign(kind, model, credential)
    }

    /// The current selection, if any.
    pub fn selection(&self) -> Option<ProviderSelection> {
        self.selection.current()
    }

    /// Launch and attach a tool server; its advertised tools land in the
    /// shared registry. Returns how many tools it contributed.
    pub async fn add_tool_server(&self, spec: LaunchSpec) -> Result<usize, ConnectError> {
        let server = ToolServer::connect(spec, &self.launch_policy).await?;
        let count = server.register(&self.tools).await;
        self.connectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(server));
        Ok(count)
    }

    /// The specs currently registered, for display.
    pub fn tools(&self) -> Vec<ToolSpec> {
        self.tools.snapshot().specs()
    }

    /// Run one chat call over the supplied turns.
    ///
    /// Fails `NotConfigured` before producing any stream when no model has
    /// been assigned. Otherwise captures the selection and a registry
    /// snapshot for the whole call and spawns the loop; later
    /// configuration changes do not affect it.
    pub fn chat(&self, turns: Vec<Message>, max_steps: usize) -> Result<ChatStream, ChatError> {
        let selection = self.selection.current().ok_or(ChatError::NotConfigured)?;
        let backend = ProviderBackend::new(&selection, self.http.clone());
        let snapshot = self.tools.snapshot();
        let system = self.system.clone();

        let (tx, rx) = mpsc::channel(CHAT_CHANNEL_CAPACITY);
        tokio::spawn(run_chat(backend, system, turns, snapshot, max_steps, tx));
        Ok(ReceiverStream::new(rx))
    }

    /// Close every attached tool server.
    pub async fn shutdown(&self) {
        let connectors: Vec<Arc<ToolServer>> = self
            .connectors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for connector in connectors {
            connector.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chat_without_configuration_fails_with_no_stream() {
        let gateway = Gateway::new(LaunchPolicy::restrictive());
        let err = gateway.chat(vec![Message::user("hi")], 3).unwrap_err();
        assert!(matches!(err, ChatError::NotConfigured));
    }

    #[test]
    fn unsupported_provider_is_rejected_at_the_string_boundary() {
        let gateway = Gateway::new(LaunchPolicy::restrictive());
        let err = gateway
            .assign_model("NotAProvider", "some-model", "abc123")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedProvider(_)));
        assert!(gateway.selection().is_none());
    }

    #[test]
    fn assign_model_accepts_the_original_vendor_names() {
        let gateway = Gateway::new(LaunchPolicy::restrictive());
        gateway
            .assign_model("Google", "gemini-2.5-flash", "abc123")
            .unwrap();
        assert_eq!(gateway.selection().unwrap().kind, ProviderKind::Google);

        gateway
            .assign_model("Claude", "claude-sonnet-4-20250514", "abc123")
            .unwrap();
        assert_eq!(gateway.selection().unwrap().kind, ProviderKind::Anthropic);
    }

    #[test]
    fn bad_credential_leaves_selection_untouched() {
        let gateway = Gateway::new(LaunchPolicy::restrictive());
        gateway
            .assign_model("openai", "gpt-4o", "good-key")
            .unwrap();
        let err = gateway
            .assign_model("openai", "gpt-4o", "bad key!")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCredentialFormat));
        assert_eq!(gateway.selection().unwrap().model, "gpt-4o");
        assert_eq!(gateway.selection().unwrap().credential(), "good-key");
    }

    #[tokio::test]
    async fn tool_server_launch_is_policy_gated() {
        let gateway = Gateway::new(LaunchPolicy::restrictive());
        let spec = LaunchSpec {
            name: "calendar".into(),
            command: "uvx".into(),
            args: vec!["workspace-mcp".into()],
            env: Default::default(),
            secret_env: Default::default(),
        };
        let err = gateway.add_tool_server(spec).await.unwrap_err();
        assert!(matches!(err, ConnectError::LaunchDenied(_)));
        assert!(gateway.tools().is_empty());
    }
}
