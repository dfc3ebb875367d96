//! MCP client error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Process I/O failed (spawn, write, or read).
    #[error("tool server I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation was attempted before `initialize` completed.
    #[error("tool server not initialized")]
    NotInitialized,

    /// An operation was attempted after `shutdown`.
    #[error("tool server closed")]
    Closed,

    /// The process exited while a response was pending.
    #[error("tool server exited unexpectedly")]
    ServerExited,

    /// No response arrived within the request timeout.
    #[error("timeout waiting for tool server response")]
    Timeout,

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    /// The server executed the tool and reported a failure.
    #[error("tool call failed: {0}")]
    ToolCallFailed(String),

    #[error("response too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
