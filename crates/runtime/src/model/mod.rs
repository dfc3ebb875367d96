//! Provider-agnostic conversation and model types.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::{
    Backend, FinishReason, Message, ModelEvent, ModelRequest, ModelStream, Part, Role, ToolCall,
    ToolResult, ToolSpec,
};
