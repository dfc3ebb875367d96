//! Core conversation types shared across providers.
//!
//! These represent the universal concepts; provider-specific wire shapes
//! belong in the provider modules.

use super::errors::ModelError;
use crate::tools::ToolError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tokio_stream::wrappers::ReceiverStream;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this call (correlates the result).
    pub id: String,
    pub name: String,
    /// Arguments as JSON.
    pub input: Value,
}

/// The result returned to the model after a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResult {
    Success {
        tool_call_id: String,
        output: Value,
    },
    Failure {
        tool_call_id: String,
        error: ToolError,
    },
}

impl ToolResult {
    pub fn tool_call_id(&self) -> &str {
        match self {
            Self::Success { tool_call_id, .. } | Self::Failure { tool_call_id, .. } => tool_call_id,
        }
    }
}

/// A part of a message, which can be text or a tool interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    Text(String),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

/// A message, consisting of a role and one or more parts.
///
/// Tool-result turns are user-role messages whose parts are all
/// `ToolResult`; each provider adapter maps that to its wire format's
/// native tool role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn from_parts(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// A turn carrying tool results back to the model.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            parts: results.into_iter().map(Part::ToolResult).collect(),
        }
    }

    /// Combined text content from all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// All tool calls in this message.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::ToolCall(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }
}

/// A tool definition exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the input parameters.
    pub schema: Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FinishReason {
    /// Natural end of response.
    #[default]
    Stop,
    /// The model wants to call tools.
    ToolCalls,
    /// Token limit reached.
    Length,
    /// Anything else (forward compatibility).
    Unknown(String),
}

/// Everything needed for one generation step.
#[derive(Debug, Clone)]
pub struct ModelRequest<'a> {
    pub system: Option<&'a str>,
    pub messages: &'a [Message],
    pub tools: &'a [ToolSpec],
}

/// An incremental item of a model generation.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// A fragment of assistant text, forwarded as it arrives.
    TextDelta(String),
    /// A complete tool call (fragments are accumulated by the provider
    /// adapter).
    ToolCall(ToolCall),
    /// Terminal item for the generation.
    Finished(FinishReason),
}

/// A generation as a channel-backed stream. Dropping the stream cancels
/// the producing task at its next send.
pub type ModelStream = ReceiverStream<Result<ModelEvent, ModelError>>;

/// Trait for streaming LLM provider backends.
pub trait Backend: Send + Sync {
    fn stream(
        &self,
        request: ModelRequest<'_>,
    ) -> impl Future<Output = Result<ModelStream, ModelError>> + Send;
}
