//! Tool-server connectors.
//!
//! Each connector owns exactly one tool-server subprocess: it launches it
//! (after policy validation), runs the bounded tool-advertisement
//! handshake, contributes the advertised tools to the shared registry, and
//! lends descriptors a weak invocation capability that fails gracefully
//! once the connector closes.

use crate::error::ConnectError;
use crate::model::ToolSpec;
use crate::tools::{ToolDescriptor, ToolError, ToolInvoker, ToolRegistry};
use futures_util::future::BoxFuture;
use mcp::{LaunchConfig, ToolServerProcess};
use policy::{Decision, LaunchPolicy};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

/// Bound on the launch + handshake sequence.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bound on a single tool invocation.
pub const INVOKE_TIMEOUT: Duration = Duration::from_secs(60);

/// How to launch one tool server.
///
/// `env` carries plain launch configuration; `secret_env` carries
/// credentials (OAuth client ids/secrets, account identities). Both reach
/// the child only through its environment — never argv — and `secret_env`
/// values are excluded from `Debug` output and logs.
#[derive(Clone)]
pub struct LaunchSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub secret_env: HashMap<String, String>,
}

impl LaunchSpec {
    fn merged_env(&self) -> HashMap<String, String> {
        let mut env = self.env.clone();
        env.extend(
            self.secret_env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        env
    }
}

impl std::fmt::Debug for LaunchSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchSpec")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("env", &self.env)
            .field("secret_env", &self.secret_env.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Connector lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting,
    Connected,
    /// The server process died or stopped answering.
    Failed,
}

/// The invocation capability lent to the registry.
///
/// Held in an `Arc` by the connector; descriptors hold a `Weak`, so
/// closing the connector invalidates every outstanding capability.
struct ServerHandle {
    name: String,
    server: ToolServerProcess,
    state: Arc<RwLock<ConnectorState>>,
}

impl ServerHandle {
    fn mark_failed(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = ConnectorState::Failed;
    }
}

impl ToolInvoker for ServerHandle {
    fn invoke(&self, name: &str, arguments: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
        let name = name.to_string();
        Box::pin(async move {
            let arguments = if arguments.is_null() {
                None
            } else {
                Some(arguments)
            };

            match timeout(INVOKE_TIMEOUT, self.server.call_tool(&name, arguments)).await {
                Err(_) => Err(ToolError::Timeout(INVOKE_TIMEOUT.as_millis() as u64)),
                Ok(Err(mcp::Error::Timeout)) => {
                    Err(ToolError::Timeout(mcp::DEFAULT_TIMEOUT.as_millis() as u64))
                }
                Ok(Err(mcp::Error::ServerExited | mcp::Error::Closed)) => {
                    self.mark_failed();
                    Err(ToolError::Disconnected(self.name.clone()))
                }
                Ok(Err(mcp::Error::ToolCallFailed(message))) => Err(ToolError::Remote(message)),
                Ok(Err(other)) => Err(ToolError::Remote(other.to_string())),
                Ok(Ok(result)) => Ok(result_to_value(&result)),
            }
        })
    }
}

/// Tool output normalized to JSON: plain text stays a string, anything
/// richer is serialized structurally.
fn result_to_value(result: &mcp::CallToolResult) -> Value {
    if result
        .content
        .iter()
        .all(|c| matches!(c, mcp::ToolContent::Text { .. }))
    {
        Value::String(result.text())
    } else {
        serde_json::to_value(&result.content).unwrap_or_else(|_| Value::String(result.text()))
    }
}

/// A connected tool server.
pub struct ToolServer {
    name: String,
    state: Arc<RwLock<ConnectorState>>,
    handle: Mutex<Option<Arc<ServerHandle>>>,
}

impl std::fmt::Debug for ToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServer")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl ToolServer {
    /// Validate the launch spec, spawn the process, and run the handshake.
    ///
    /// Fails `LaunchDenied` before any process exists, `LaunchFailed` if
    /// the process cannot start, and `HandshakeFailed` if it starts but
    /// does not advertise tools within [`CONNECT_TIMEOUT`].
    pub async fn connect(spec: LaunchSpec, policy: &LaunchPolicy) -> Result<Self, ConnectError> {
        let env = spec.merged_env();

        if let Decision::Deny { reason } =
            policy.check_launch(&spec.command, &spec.args, env.keys().map(String::as_str))
        {
            return Err(ConnectError::LaunchDenied(reason));
        }

        let state = Arc::new(RwLock::new(ConnectorState::Connecting));

        let config = LaunchConfig {
            name: spec.name.clone(),
            command: spec.command.clone(),
            args: spec.args.clone(),
            env,
        };

        let server = ToolServerProcess::spawn(config)
            .await
            .map_err(|e| ConnectError::LaunchFailed(e.to_string()))?;

        match timeout(CONNECT_TIMEOUT, server.initialize()).await {
            Err(_) => {
                server.shutdown().await;
                return Err(ConnectError::HandshakeFailed(format!(
                    "no tool advertisement within {}s",
                    CONNECT_TIMEOUT.as_secs()
                )));
            }
            Ok(Err(e)) => {
                server.shutdown().await;
                return Err(ConnectError::HandshakeFailed(e.to_string()));
            }
            Ok(Ok(())) => {}
        }

        *state.write().unwrap_or_else(PoisonError::into_inner) = ConnectorState::Connected;
        info!(server = %spec.name, "tool server connected");

        let handle = Arc::new(ServerHandle {
            name: spec.name.clone(),
            server,
            state: Arc::clone(&state),
        });

        Ok(Self {
            name: spec.name,
            state,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectorState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed the advertised tool set into the registry. Returns how many
    /// tools were contributed.
    pub async fn register(&self, registry: &ToolRegistry) -> usize {
        let handle = {
            let guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        let Some(handle) = handle else {
            return 0;
        };

        let descriptors: Vec<ToolDescriptor> = handle
            .server
            .tools()
            .await
            .into_iter()
            .map(|tool| {
                let handle_dyn: Arc<dyn ToolInvoker> = handle.clone();
                let source: Weak<dyn ToolInvoker> = Arc::downgrade(&handle_dyn);
                ToolDescriptor::new(
                    ToolSpec {
                        name: tool.name,
                        description: tool.description.unwrap_or_default(),
                        schema: tool.input_schema,
                    },
                    self.name.clone(),
                    source,
                )
            })
            .collect();

        let count = descriptors.len();
        registry.merge(descriptors);
        info!(server = %self.name, tools = count, "tools registered");
        count
    }

    /// Terminate the subprocess and revoke the invocation capability.
    /// Idempotent: later calls are no-ops.
    pub async fn close(&self) {
        let handle = {
            let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
            guard.take()
        };
        let Some(handle) = handle else {
            return;
        };

        handle.server.shutdown().await;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = ConnectorState::Disconnected;

        // Snapshots hold weak capabilities; dropping this Arc invalidates
        // them. An in-flight invocation keeps the handle alive until it
        // finishes or times out, then it drops too.
        if Arc::strong_count(&handle) > 1 {
            warn!(server = %self.name, "closing with invocations in flight");
        }
        drop(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(command: &str) -> LaunchSpec {
        LaunchSpec {
            name: "test".to_string(),
            command: command.to_string(),
            args: Vec::new(),
            env: HashMap::new(),
            secret_env: HashMap::from([("CLIENT_SECRET".to_string(), "hunter2".to_string())]),
        }
    }

    #[test]
    fn debug_output_redacts_secret_values() {
        let shown = format!("{:?}", spec("uvx"));
        assert!(shown.contains("CLIENT_SECRET"));
        assert!(!shown.contains("hunter2"));
    }

    #[tokio::test]
    async fn denied_launch_never_spawns() {
        let err = ToolServer::connect(spec("definitely-not-a-real-binary"), &LaunchPolicy::restrictive())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::LaunchDenied(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_launch_failed() {
        let err = ToolServer::connect(
            spec("tiller-test-no-such-binary"),
            &LaunchPolicy::permissive(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConnectError::LaunchFailed(_)));
    }

    #[tokio::test]
    async fn silent_process_is_handshake_failed() {
        // `true` exits immediately without speaking the protocol, so the
        // handshake fails fast on EOF rather than waiting out the timeout.
        let err = ToolServer::connect(spec("true"), &LaunchPolicy::permissive())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::HandshakeFailed(_)));
    }
}
