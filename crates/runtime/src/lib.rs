//! Tiller runtime — the chat gateway core.
//!
//! One process fronts several LLM providers behind a uniform streaming
//! generate capability and aggregates tools from any number of external
//! tool-server subprocesses into a single registry that a step-bounded
//! chat loop can call.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **ProviderRegistry**: the single live (provider, model, credential)
//!   selection, validated on assignment and read by value.
//! - **ToolRegistry**: thread-safe tool aggregation across connectors;
//!   chats read immutable snapshots.
//! - **ToolServer**: a connector owning one tool-server subprocess and
//!   feeding its advertised tools into the registry.
//! - **Gateway**: the front door tying the above together and driving the
//!   streaming generate → tool-call → tool-result loop.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{Gateway, LaunchSpec, Message};
//! use policy::LaunchPolicy;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway = Gateway::new(LaunchPolicy::permissive())
//!     .with_system("You are a helpful assistant");
//! gateway.assign_model("anthropic", "claude-sonnet-4-20250514", "key123")?;
//!
//! let mut stream = gateway.chat(vec![Message::user("hi")], 3)?;
//! while let Some(event) = tokio_stream::StreamExt::next(&mut stream).await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod chat;
mod connector;
mod error;
mod gateway;
pub mod model;
pub mod providers;
mod selection;
pub mod tools;

// Conversation and model types
pub use model::{
    Backend, FinishReason, Message, ModelEvent, ModelRequest, ModelStream, Part, Role, ToolCall,
    ToolResult, ToolSpec,
};

// Provider selection
pub use providers::{ProviderBackend, ProviderKind};
pub use selection::{ProviderRegistry, ProviderSelection};

// Tool aggregation
pub use tools::{ToolDescriptor, ToolError, ToolInvoker, ToolRegistry, ToolSnapshot};

// Tool-server connectors
pub use connector::{ConnectorState, LaunchSpec, ToolServer};

// Chat orchestration
pub use chat::{ChatEvent, ChatOutcome, ChatStream, DEFAULT_MAX_STEPS};
pub use gateway::Gateway;

// Error types
pub use error::{ChatError, ConfigError, ConnectError};
