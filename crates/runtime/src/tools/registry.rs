//! The tool registry and its snapshot.

use super::ToolError;
use crate::model::ToolSpec;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, Weak};
use tracing::debug;

/// The invocation capability a connector lends to its descriptors.
pub trait ToolInvoker: Send + Sync {
    fn invoke(&self, name: &str, arguments: Value) -> BoxFuture<'_, Result<Value, ToolError>>;
}

/// A registered tool: its model-facing spec plus a borrowed capability on
/// the connector that owns it.
#[derive(Clone)]
pub struct ToolDescriptor {
    pub spec: ToolSpec,
    /// Name of the contributing tool server (collisions stay observable).
    pub server: String,
    source: Weak<dyn ToolInvoker>,
}

impl ToolDescriptor {
    pub fn new(spec: ToolSpec, server: impl Into<String>, source: Weak<dyn ToolInvoker>) -> Self {
        Self {
            spec,
            server: server.into(),
            source,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Invoke the tool through its owning connector.
    ///
    /// The capability is borrowed, not owned: if the connector has been
    /// closed since this descriptor was snapshotted, the call resolves to
    /// [`ToolError::Disconnected`].
    pub async fn invoke(&self, arguments: Value) -> Result<Value, ToolError> {
        let Some(source) = self.source.upgrade() else {
            return Err(ToolError::Disconnected(self.server.clone()));
        };
        source.invoke(&self.spec.name, arguments).await
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.spec.name)
            .field("server", &self.server)
            .finish_non_exhaustive()
    }
}

/// Process-wide mapping from tool name to descriptor, merged from any
/// number of concurrently connected tool servers.
///
/// Writers never leave a merge half-applied: each `merge` call holds the
/// write lock for one insert-or-replace pass, so a concurrent `snapshot`
/// sees all of it or none of it.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolDescriptor>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace each incoming descriptor. Name collisions are
    /// last-write-wins, matching the merge semantics tools were aggregated
    /// with upstream.
    pub fn merge(&self, incoming: Vec<ToolDescriptor>) {
        let mut tools = self.tools.write().unwrap_or_else(PoisonError::into_inner);
        for descriptor in incoming {
            if let Some(previous) = tools.get(descriptor.name()) {
                debug!(
                    tool = %descriptor.name(),
                    old = %previous.server,
                    new = %descriptor.server,
                    "tool replaced on merge"
                );
            }
            tools.insert(descriptor.name().to_string(), descriptor);
        }
    }

    /// A point-in-time copy, isolated from later merges for the duration
    /// of one chat request.
    pub fn snapshot(&self) -> ToolSnapshot {
        let tools = self.tools.read().unwrap_or_else(PoisonError::into_inner);
        ToolSnapshot {
            tools: tools.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An immutable view of the registry taken at the start of a chat call.
#[derive(Debug, Clone, Default)]
pub struct ToolSnapshot {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolSnapshot {
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// The specs to expose to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|d| d.spec.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    struct StaticInvoker(Value);

    impl ToolInvoker for StaticInvoker {
        fn invoke(&self, _name: &str, _arguments: Value) -> BoxFuture<'_, Result<Value, ToolError>> {
            let output = self.0.clone();
            Box::pin(async move { Ok(output) })
        }
    }

    fn descriptor(name: &str, server: &str, source: &Arc<StaticInvoker>) -> ToolDescriptor {
        let source_dyn: Arc<dyn ToolInvoker> = source.clone();
        let weak: Weak<dyn ToolInvoker> = Arc::downgrade(&source_dyn);
        ToolDescriptor::new(
            ToolSpec {
                name: name.to_string(),
                description: String::new(),
                schema: json!({"type": "object"}),
            },
            server,
            weak,
        )
    }

    #[test]
    fn merge_is_last_write_wins() {
        let registry = ToolRegistry::new();
        let a = Arc::new(StaticInvoker(json!("from-a")));
        let b = Arc::new(StaticInvoker(json!("from-b")));

        registry.merge(vec![descriptor("list_events", "calendar-a", &a)]);
        registry.merge(vec![descriptor("list_events", "calendar-b", &b)]);

        assert_eq!(registry.len(), 1);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.get("list_events").unwrap().server, "calendar-b");
    }

    #[test]
    fn snapshot_is_isolated_from_later_merges() {
        let registry = ToolRegistry::new();
        let source = Arc::new(StaticInvoker(json!(null)));

        registry.merge(vec![descriptor("first", "s", &source)]);
        let snapshot = registry.snapshot();

        registry.merge(vec![descriptor("second", "s", &source)]);
        assert_eq!(registry.len(), 2);
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get("second").is_none());
    }

    #[tokio::test]
    async fn invoke_after_source_dropped_is_disconnected() {
        let source = Arc::new(StaticInvoker(json!("ok")));
        let desc = descriptor("list_events", "calendar", &source);

        assert!(matches!(desc.invoke(json!({})).await, Ok(v) if v == json!("ok")));

        drop(source);
        let err = desc.invoke(json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::Disconnected(server) if server == "calendar"));
    }

    #[tokio::test]
    async fn concurrent_merges_and_snapshots_are_safe() {
        let registry = Arc::new(ToolRegistry::new());
        let source = Arc::new(StaticInvoker(json!(null)));

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = Arc::clone(&registry);
            let source = Arc::clone(&source);
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    registry.merge(vec![descriptor(&format!("tool-{i}-{j}"), "s", &source)]);
                    let _ = registry.snapshot();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.len(), 8 * 50);
    }
}
