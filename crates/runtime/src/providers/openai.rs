//! OpenAI API backend (streaming chat completions).

use super::sse::SseDecoder;
use crate::model::{
    Backend, FinishReason, Message, ModelError, ModelEvent, ModelRequest, ModelStream, Part, Role,
    ToolCall, ToolResult, ToolSpec,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const CHANNEL_CAPACITY: usize = 32;
const DONE_SENTINEL: &str = "[DONE]";

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    stream: bool,
    // Message shapes vary per role (nullable content, tool_calls arrays),
    // so they are built as values rather than one struct per variant.
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: u64,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI API backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    model: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// One of our messages can expand to several wire messages: tool
    /// results each get their own `role: "tool"` message.
    fn message_to_api(msg: &Message) -> Vec<Value> {
        let mut out = Vec::new();
        let mut text = String::new();
        let mut tool_calls = Vec::new();

        for part in &msg.parts {
            match part {
                Part::Text(t) => text.push_str(t),
                Part::ToolCall(call) => tool_calls.push(json!({
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": call.input.to_string(),
                    },
                })),
                Part::ToolResult(result) => {
                    let (tool_call_id, content) = match result {
                        ToolResult::Success {
                            tool_call_id,
                            output,
                        } => (tool_call_id, render_output(output)),
                        ToolResult::Failure {
                            tool_call_id,
                            error,
                        } => (tool_call_id, error.to_string()),
                    };
                    out.push(json!({
                        "role": "tool",
                        "tool_call_id": tool_call_id,
                        "content": content,
                    }));
                }
            }
        }

        if !tool_calls.is_empty() {
            out.push(json!({
                "role": "assistant",
                "content": if text.is_empty() { Value::Null } else { json!(text) },
                "tool_calls": tool_calls,
            }));
        } else if !text.is_empty() {
            let role = match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            out.push(json!({ "role": role, "content": text }));
        }

        out
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            tool_type: "function",
            function: ApiFunction {
                name: spec.name.clone(),
                description: spec.description.clone(),
                parameters: spec.schema.clone(),
            },
        }
    }
}

fn render_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "tool_calls" => FinishReason::ToolCalls,
        "length" => FinishReason::Length,
        other => FinishReason::Unknown(other.to_string()),
    }
}

#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

/// Parse the accumulated calls in index order.
fn drain_pending(pending: &mut BTreeMap<u64, PendingCall>) -> Result<Vec<ToolCall>, ModelError> {
    let mut calls = Vec::with_capacity(pending.len());
    for (_, p) in std::mem::take(pending) {
        let input = if p.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&p.arguments).map_err(|e| {
                ModelError::InvalidResponse(format!("tool arguments for {}: {e}", p.name))
            })?
        };
        calls.push(ToolCall {
            id: p.id,
            name: p.name,
            input,
        });
    }
    Ok(calls)
}

impl Backend for OpenAiBackend {
    async fn stream(&self, request: ModelRequest<'_>) -> Result<ModelStream, ModelError> {
        let mut messages = Vec::new();
        if let Some(system) = request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for msg in request.messages {
            messages.extend(Self::message_to_api(msg));
        }

        let api_request = ApiRequest {
            model: self.model.clone(),
            stream: true,
            messages,
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut bytes = response.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::new();
            let mut pending: BTreeMap<u64, PendingCall> = BTreeMap::new();
            let mut finish = FinishReason::Stop;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::Network(e.to_string()))).await;
                        return;
                    }
                };

                for sse in decoder.push(&chunk) {
                    if sse.data == DONE_SENTINEL {
                        match drain_pending(&mut pending) {
                            Ok(calls) => {
                                for call in calls {
                                    if tx.send(Ok(ModelEvent::ToolCall(call))).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                        let _ = tx.send(Ok(ModelEvent::Finished(finish))).await;
                        return;
                    }

                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(&sse.data) else {
                        continue;
                    };

                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty()
                                && tx.send(Ok(ModelEvent::TextDelta(content))).await.is_err()
                            {
                                return;
                            }
                        }
                        for delta in choice.delta.tool_calls.unwrap_or_default() {
                            let entry = pending.entry(delta.index).or_default();
                            if let Some(id) = delta.id {
                                entry.id = id;
                            }
                            if let Some(function) = delta.function {
                                if let Some(name) = function.name {
                                    entry.name = name;
                                }
                                if let Some(arguments) = function.arguments {
                                    entry.arguments.push_str(&arguments);
                                }
                            }
                        }
                        if let Some(reason) = choice.finish_reason {
                            finish = map_finish_reason(&reason);
                        }
                    }
                }
            }

            // Stream closed without the sentinel: flush what we have.
            if let Ok(calls) = drain_pending(&mut pending) {
                for call in calls {
                    if tx.send(Ok(ModelEvent::ToolCall(call))).await.is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(Ok(ModelEvent::Finished(finish))).await;
        });

        Ok(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolError;

    #[test]
    fn assistant_tool_calls_become_tool_calls_array() {
        let msg = Message::from_parts(
            Role::Assistant,
            vec![
                Part::Text("checking".into()),
                Part::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "list_events".into(),
                    input: json!({"max": 5}),
                }),
            ],
        );
        let out = OpenAiBackend::message_to_api(&msg);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["role"], "assistant");
        assert_eq!(out[0]["content"], "checking");
        assert_eq!(out[0]["tool_calls"][0]["function"]["name"], "list_events");
        // Arguments ride as a JSON-encoded string.
        assert_eq!(out[0]["tool_calls"][0]["function"]["arguments"], r#"{"max":5}"#);
    }

    #[test]
    fn tool_results_expand_to_tool_messages() {
        let msg = Message::tool_results(vec![
            ToolResult::Success {
                tool_call_id: "call_1".into(),
                output: json!("done"),
            },
            ToolResult::Failure {
                tool_call_id: "call_2".into(),
                error: ToolError::Timeout(30_000),
            },
        ]);
        let out = OpenAiBackend::message_to_api(&msg);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["role"], "tool");
        assert_eq!(out[0]["tool_call_id"], "call_1");
        assert_eq!(out[1]["content"], "timeout after 30000ms");
    }

    #[test]
    fn fragmented_tool_call_deltas_accumulate() {
        let mut pending = BTreeMap::new();
        pending.insert(
            0,
            PendingCall {
                id: "call_1".into(),
                name: "search_mail".into(),
                arguments: r#"{"query":"stand"#.to_string(),
            },
        );
        pending.get_mut(&0).unwrap().arguments.push_str(r#"up"}"#);

        let calls = drain_pending(&mut pending).unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].input, json!({"query": "standup"}));
        assert!(pending.is_empty());
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let mut pending = BTreeMap::new();
        pending.insert(
            0,
            PendingCall {
                id: "call_1".into(),
                name: "ping".into(),
                arguments: String::new(),
            },
        );
        let calls = drain_pending(&mut pending).unwrap();
        assert_eq!(calls[0].input, json!({}));
    }
}
