//! MCP (Model Context Protocol) client for tool-server subprocesses.
//!
//! A tool server is an external process that advertises a set of invocable
//! tools. This crate spawns one over stdio, runs the initialize handshake,
//! and exposes `tools/list` and `tools/call` with bounded timeouts.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{LaunchConfig, ToolServerProcess};
//! use std::collections::HashMap;
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = LaunchConfig {
//!     name: "workspace".to_string(),
//!     command: "uvx".to_string(),
//!     args: vec!["workspace-mcp".to_string()],
//!     env: HashMap::new(),
//! };
//!
//! let server = ToolServerProcess::spawn(config).await?;
//! server.initialize().await?;
//!
//! for tool in server.tools().await {
//!     println!("{}", tool.name);
//! }
//!
//! let result = server
//!     .call_tool("list_events", Some(serde_json::json!({ "max": 5 })))
//!     .await?;
//! println!("{}", result.text());
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, ServerInfo, Tool, ToolContent,
};
pub use server::{DEFAULT_TIMEOUT, LaunchConfig, MAX_OUTPUT_SIZE, ToolServerProcess};
