//! Tool-server process management (spawn, handshake, request plumbing).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcRequest,
    JsonRpcResponse, ListToolsResult, RequestId, Tool,
};

/// Per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum response line size (1MB). Sized for large tool outputs.
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// How to launch a tool-server process.
///
/// Credentials belong in `env`, never in `args`: the argument vector is
/// visible in process listings, the environment is not.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
}

/// Handle to a running tool-server process.
///
/// `shutdown` is idempotent; any request after it fails with
/// [`Error::Closed`].
pub struct ToolServerProcess {
    config: LaunchConfig,
    process: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<BufReader<ChildStdout>>>,
    /// Serializes request/response exchanges: concurrent callers must not
    /// interleave on the pipe, or one would read the other's response.
    exchange: Mutex<()>,
    next_id: AtomicI64,
    initialized: Mutex<bool>,
    server_info: Mutex<Option<InitializeResult>>,
    tools: Mutex<Vec<Tool>>,
}

impl ToolServerProcess {
    /// Spawn the process with piped stdio.
    pub async fn spawn(config: LaunchConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn()?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to capture stdout")))?;

        debug!(server = %config.name, command = %config.command, "spawned tool server");

        Ok(Self {
            config,
            process: Mutex::new(Some(process)),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(Some(BufReader::new(stdout))),
            exchange: Mutex::new(()),
            next_id: AtomicI64::new(1),
            initialized: Mutex::new(false),
            server_info: Mutex::new(None),
            tools: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Run the tool-advertisement handshake: `initialize`, the
    /// `initialized` notification, then `tools/list`. Must complete before
    /// any tool call.
    pub async fn initialize(&self) -> Result<()> {
        let params = InitializeParams::default();
        let result: InitializeResult = self.request("initialize", Some(params)).await?;

        self.notify("notifications/initialized", None::<()>).await?;

        debug!(
            server = %self.config.name,
            remote = %result.server_info.name,
            "tool server initialized"
        );

        *self.server_info.lock().await = Some(result);
        *self.initialized.lock().await = true;

        let listed: ListToolsResult = self.request("tools/list", None::<()>).await?;
        *self.tools.lock().await = listed.tools;

        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    /// Server identity reported during the handshake.
    pub async fn server_info(&self) -> Option<InitializeResult> {
        self.server_info.lock().await.clone()
    }

    /// The tool set advertised at handshake time.
    pub async fn tools(&self) -> Vec<Tool> {
        self.tools.lock().await.clone()
    }

    /// Call a tool by name.
    ///
    /// A result the server flags as an error becomes
    /// [`Error::ToolCallFailed`] carrying the server's error text.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult> {
        if !*self.initialized.lock().await {
            return Err(Error::NotInitialized);
        }

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params)).await?;

        if result.is_error {
            return Err(Error::ToolCallFailed(result.text()));
        }

        Ok(result)
    }

    /// Whether the child process is still alive.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        match process.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Terminate the process and release its stdio. Safe to call more than
    /// once; later calls are no-ops.
    pub async fn shutdown(&self) {
        // Kill first so a reader blocked on the pipe sees EOF and lets go
        // of the stdout lock.
        if let Some(mut child) = self.process.lock().await.take() {
            let _ = child.kill().await;
            debug!(server = %self.config.name, "tool server terminated");
        }

        let _ = self.stdin.lock().await.take();
        let _ = self.stdout.lock().await.take();
    }

    // --- Internal plumbing ---

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p);
        }

        debug!(server = %self.config.name, %method, "mcp request");

        let request_json = serde_json::to_string(&request)?;
        let _exchange = self.exchange.lock().await;
        self.write_line(&request_json).await?;

        let response = timeout(DEFAULT_TIMEOUT, self.read_response())
            .await
            .map_err(|_| Error::Timeout)??;

        if response.id != id {
            return Err(Error::InvalidResponse(format!(
                "response ID mismatch: expected {id:?}, got {:?}",
                response.id
            )));
        }

        let result_value = response.into_result()?;
        Ok(serde_json::from_value(result_value)?)
    }

    async fn notify<P>(&self, method: &str, params: Option<P>) -> Result<()>
    where
        P: serde::Serialize,
    {
        // Notifications carry no ID and expect no response.
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.and_then(|p| serde_json::to_value(p).ok()),
        });

        self.write_line(&serde_json::to_string(&notification)?).await
    }

    async fn write_line(&self, line: &str) -> Result<()> {
        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(Error::Closed)?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_response(&self) -> Result<JsonRpcResponse> {
        let mut guard = self.stdout.lock().await;
        let stdout = guard.as_mut().ok_or(Error::Closed)?;

        // Servers may interleave notifications; skip anything without an ID.
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                return Err(Error::ServerExited);
            }

            if line.len() > MAX_OUTPUT_SIZE {
                return Err(Error::OutputTooLarge {
                    size: line.len(),
                    max: MAX_OUTPUT_SIZE,
                });
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) => return Ok(response),
                Err(_) => {
                    // Not a response (likely a server-initiated notification).
                    debug!(server = %self.config.name, "skipping non-response line");
                    continue;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_config_keeps_env_separate_from_args() {
        let config = LaunchConfig {
            name: "workspace".to_string(),
            command: "uvx".to_string(),
            args: vec!["workspace-mcp".to_string()],
            env: HashMap::from([("GOOGLE_OAUTH_CLIENT_ID".to_string(), "id".to_string())]),
        };
        assert!(config.args.iter().all(|a| !a.contains("id")));
        assert_eq!(config.env.len(), 1);
    }

    #[tokio::test]
    async fn call_before_initialize_is_rejected() {
        // A process that ignores stdin is enough: call_tool must fail before
        // any request is written.
        let config = LaunchConfig {
            name: "sleeper".to_string(),
            command: "sleep".to_string(),
            args: vec!["5".to_string()],
            env: HashMap::new(),
        };
        let server = ToolServerProcess::spawn(config).await.unwrap();
        let err = server.call_tool("anything", None).await.unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let config = LaunchConfig {
            name: "sleeper".to_string(),
            command: "sleep".to_string(),
            args: vec!["5".to_string()],
            env: HashMap::new(),
        };
        let server = ToolServerProcess::spawn(config).await.unwrap();
        server.shutdown().await;
        server.shutdown().await;
        assert!(!server.is_running().await);
    }
}
