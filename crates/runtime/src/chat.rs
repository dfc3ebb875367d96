//! The chat loop: streaming, step-bounded generate → tool-call →
//! tool-result orchestration.

use crate::error::ChatError;
use crate::model::{Backend, Message, ModelEvent, Part, Role, ToolCall, ToolResult};
use crate::tools::{ToolError, ToolSnapshot};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Steps allowed per chat call unless the caller says otherwise.
pub const DEFAULT_MAX_STEPS: usize = 3;

/// How a chat call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The model finished without requesting more tools.
    Completed,
    /// The step budget ran out while the model still wanted tools. Output
    /// streamed so far remains valid; the pending calls were not resolved.
    StepLimitExceeded { steps: usize },
}

/// One item of the chat output stream.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A fragment of assistant text.
    TextDelta(String),
    /// A tool call is about to be resolved.
    ToolCallStarted(ToolCall),
    /// The resolution of an earlier `ToolCallStarted`.
    ToolResult(ToolResult),
    /// Normal termination.
    Done(ChatOutcome),
    /// Abnormal termination. Nothing follows.
    Error(ChatError),
}

/// The stream handed to the caller. Dropping it cancels the loop at its
/// next send.
pub type ChatStream = ReceiverStream<ChatEvent>;

/// Drive the loop. Sends events until a terminal `Done`/`Error`, or until
/// the receiver goes away.
///
/// The tool snapshot is fixed for the whole call: merges that land after
/// the call started are invisible to it.
pub(crate) async fn run_chat<B: Backend>(
    backend: B,
    system: Option<String>,
    mut turns: Vec<Message>,
    snapshot: ToolSnapshot,
    max_steps: usize,
    tx: mpsc::Sender<ChatEvent>,
) {
    let max_steps = max_steps.max(1);
    let specs = snapshot.specs();

    for step in 1..=max_steps {
        let request = crate::model::ModelRequest {
            system: system.as_deref(),
            messages: &turns,
            tools: &specs,
        };

        let mut stream = match backend.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                let _ = tx
                    .send(ChatEvent::Error(ChatError::ProviderUnavailable(
                        e.to_string(),
                    )))
                    .await;
                return;
            }
        };

        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();

        while let Some(event) = stream.next().await {
            match event {
                Ok(ModelEvent::TextDelta(delta)) => {
                    text.push_str(&delta);
                    if tx.send(ChatEvent::TextDelta(delta)).await.is_err() {
                        return;
                    }
                }
                Ok(ModelEvent::ToolCall(call)) => calls.push(call),
                Ok(ModelEvent::Finished(_)) => break,
                Err(e) => {
                    // Already-streamed output stays valid; the step aborts.
                    let _ = tx
                        .send(ChatEvent::Error(ChatError::ProviderUnavailable(
                            e.to_string(),
                        )))
                        .await;
                    return;
                }
            }
        }

        debug!(step, tool_calls = calls.len(), "generation step finished");

        if calls.is_empty() {
            let _ = tx.send(ChatEvent::Done(ChatOutcome::Completed)).await;
            return;
        }

        if step == max_steps {
            // The budget is spent; report it rather than resolving calls
            // whose results no generation step will ever see.
            let _ = tx
                .send(ChatEvent::Done(ChatOutcome::StepLimitExceeded {
                    steps: max_steps,
                }))
                .await;
            return;
        }

        let mut parts = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }
        parts.extend(calls.iter().cloned().map(Part::ToolCall));
        turns.push(Message::from_parts(Role::Assistant, parts));

        // Resolve in the order the model emitted, so the next request is
        // deterministic given deterministic tool outputs.
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            if tx.send(ChatEvent::ToolCallStarted(call.clone())).await.is_err() {
                return;
            }
            let result = resolve_call(&snapshot, &call).await;
            if tx.send(ChatEvent::ToolResult(result.clone())).await.is_err() {
                return;
            }
            results.push(result);
        }
        turns.push(Message::tool_results(results));
    }
}

/// Resolve one call against the snapshot. Every failure mode becomes a
/// failure result the model can react to next step.
async fn resolve_call(snapshot: &ToolSnapshot, call: &ToolCall) -> ToolResult {
    let Some(descriptor) = snapshot.get(&call.name) else {
        return ToolResult::Failure {
            tool_call_id: call.id.clone(),
            error: ToolError::NotFound(call.name.clone()),
        };
    };

    match descriptor.invoke(call.input.clone()).await {
        Ok(output) => ToolResult::Success {
            tool_call_id: call.id.clone(),
            output,
        },
        Err(error) => {
            warn!(tool = %call.name, %error, "tool call failed");
            ToolResult::Failure {
                tool_call_id: call.id.clone(),
                error,
            }
        }
    }
}
