//! Anthropic API backend (streaming messages API).

use super::sse::SseDecoder;
use crate::model::{
    Backend, FinishReason, Message, ModelError, ModelEvent, ModelRequest, ModelStream, Part, Role,
    ToolCall, ToolResult, ToolSpec,
};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const CHANNEL_CAPACITY: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    stream: bool,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: Value,
}

// Stream events, one per SSE `data:` payload.

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockStart {
        index: u64,
        content_block: StartedBlock,
    },
    ContentBlockDelta {
        index: u64,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u64,
    },
    MessageDelta {
        delta: MessageDeltaBody,
    },
    MessageStop,
    Error {
        error: ApiStreamError,
    },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartedBlock {
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamError {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Anthropic API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User | Role::System => "user",
            Role::Assistant => "assistant",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let role = Self::role_to_api(msg.role);

        // Simple case: single text part.
        if msg.parts.len() == 1 {
            if let Part::Text(text) = &msg.parts[0] {
                return ApiMessage {
                    role,
                    content: ApiContent::Text(text.clone()),
                };
            }
        }

        let blocks: Vec<ApiContentBlock> = msg
            .parts
            .iter()
            .map(|part| match part {
                Part::Text(text) => ApiContentBlock::Text { text: text.clone() },
                Part::ToolCall(call) => ApiContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.input.clone(),
                },
                Part::ToolResult(result) => {
                    let (tool_use_id, content, is_error) = match result {
                        ToolResult::Success {
                            tool_call_id,
                            output,
                        } => (tool_call_id.clone(), render_output(output), false),
                        ToolResult::Failure {
                            tool_call_id,
                            error,
                        } => (tool_call_id.clone(), error.to_string(), true),
                    };
                    ApiContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    }
                }
            })
            .collect();

        ApiMessage {
            role,
            content: ApiContent::Blocks(blocks),
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool {
        ApiTool {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: spec.schema.clone(),
        }
    }
}

fn render_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "tool_use" => FinishReason::ToolCalls,
        "max_tokens" => FinishReason::Length,
        other => FinishReason::Unknown(other.to_string()),
    }
}

struct PendingToolUse {
    id: String,
    name: String,
    json: String,
}

impl Backend for AnthropicBackend {
    async fn stream(&self, request: ModelRequest<'_>) -> Result<ModelStream, ModelError> {
        let api_messages: Vec<ApiMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(Self::message_to_api)
            .collect();

        let api_request = ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            stream: true,
            messages: api_messages,
            system: request.system.map(str::to_string),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
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
            let mut pending: HashMap<u64, PendingToolUse> = HashMap::new();
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
                    if sse.data.is_empty() {
                        continue;
                    }
                    // Unknown event shapes are skipped for forward compatibility.
                    let Ok(event) = serde_json::from_str::<StreamEvent>(&sse.data) else {
                        continue;
                    };

                    match event {
                        StreamEvent::ContentBlockStart {
                            index,
                            content_block: StartedBlock::ToolUse { id, name },
                        } => {
                            pending.insert(
                                index,
                                PendingToolUse {
                                    id,
                                    name,
                                    json: String::new(),
                                },
                            );
                        }
                        StreamEvent::ContentBlockDelta {
                            delta: BlockDelta::TextDelta { text },
                            ..
                        } => {
                            if tx.send(Ok(ModelEvent::TextDelta(text))).await.is_err() {
                                return;
                            }
                        }
                        StreamEvent::ContentBlockDelta {
                            index,
                            delta: BlockDelta::InputJsonDelta { partial_json },
                        } => {
                            if let Some(p) = pending.get_mut(&index) {
                                p.json.push_str(&partial_json);
                            }
                        }
                        StreamEvent::ContentBlockStop { index } => {
                            if let Some(p) = pending.remove(&index) {
                                let input = if p.json.trim().is_empty() {
                                    Value::Object(Default::default())
                                } else {
                                    match serde_json::from_str(&p.json) {
                                        Ok(value) => value,
                                        Err(e) => {
                                            let _ = tx
                                                .send(Err(ModelError::InvalidResponse(format!(
                                                    "tool input for {}: {e}",
                                                    p.name
                                                ))))
                                                .await;
                                            return;
                                        }
                                    }
                                };
                                let call = ToolCall {
                                    id: p.id,
                                    name: p.name,
                                    input,
                                };
                                if tx.send(Ok(ModelEvent::ToolCall(call))).await.is_err() {
                                    return;
                                }
                            }
                        }
                        StreamEvent::MessageDelta { delta } => {
                            if let Some(reason) = delta.stop_reason {
                                finish = map_stop_reason(&reason);
                            }
                        }
                        StreamEvent::MessageStop => {
                            let _ = tx.send(Ok(ModelEvent::Finished(finish))).await;
                            return;
                        }
                        StreamEvent::Error { error } => {
                            let _ = tx.send(Err(ModelError::Api(error.message))).await;
                            return;
                        }
                        _ => {}
                    }
                }
            }

            // Connection closed without message_stop.
            let _ = tx.send(Ok(ModelEvent::Finished(finish))).await;
        });

        Ok(ReceiverStream::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolError;
    use serde_json::json;

    #[test]
    fn tool_result_turns_become_tool_result_blocks() {
        let msg = Message::tool_results(vec![
            ToolResult::Success {
                tool_call_id: "call_1".into(),
                output: json!("3 events"),
            },
            ToolResult::Failure {
                tool_call_id: "call_2".into(),
                error: ToolError::NotFound("missing".into()),
            },
        ]);
        let api = AnthropicBackend::message_to_api(&msg);
        let value = serde_json::to_value(&api.content).unwrap();

        assert_eq!(value[0]["type"], "tool_result");
        assert_eq!(value[0]["tool_use_id"], "call_1");
        assert_eq!(value[0]["content"], "3 events");
        assert!(value[0].get("is_error").is_none());

        assert_eq!(value[1]["is_error"], true);
        assert_eq!(value[1]["tool_use_id"], "call_2");
    }

    #[test]
    fn plain_text_message_stays_a_string() {
        let api = AnthropicBackend::message_to_api(&Message::user("hi"));
        assert!(matches!(api.content, ApiContent::Text(ref s) if s == "hi"));
        assert_eq!(api.role, "user");
    }

    #[test]
    fn stream_events_deserialize() {
        let delta: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            StreamEvent::ContentBlockDelta {
                delta: BlockDelta::TextDelta { ref text },
                ..
            } if text == "hi"
        ));

        let start: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"c1","name":"list_events","input":{}}}"#,
        )
        .unwrap();
        assert!(matches!(
            start,
            StreamEvent::ContentBlockStart {
                content_block: StartedBlock::ToolUse { ref name, .. },
                ..
            } if name == "list_events"
        ));

        let ping: StreamEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, StreamEvent::Ignored));
    }

    #[test]
    fn stop_reasons_map() {
        assert_eq!(map_stop_reason("end_turn"), FinishReason::Stop);
        assert_eq!(map_stop_reason("tool_use"), FinishReason::ToolCalls);
        assert_eq!(map_stop_reason("max_tokens"), FinishReason::Length);
        assert!(matches!(map_stop_reason("weird"), FinishReason::Unknown(_)));
    }
}
