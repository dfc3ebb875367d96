use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors resolving one tool call. These are recovered locally: each
/// becomes a failure `ToolResult` the model can react to, never an abort
/// of the chat loop.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("tool server disconnected: {0}")]
    Disconnected(String),
    #[error("timeout after {0}ms")]
    Timeout(u64),
    #[error("tool execution failed: {0}")]
    Remote(String),
}
