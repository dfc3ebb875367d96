//! Google Gemini backend (streaming generateContent).

use super::sse::SseDecoder;
use crate::model::{
    Backend, FinishReason, Message, ModelError, ModelEvent, ModelRequest, ModelStream, Part, Role,
    ToolCall, ToolResult, ToolSpec,
};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

const GOOGLE_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const CHANNEL_CAPACITY: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Google Gemini backend.
pub struct GoogleBackend {
    client: reqwest::Client,
    model: String,
    api_key: String,
}

impl GoogleBackend {
    pub fn new(client: reqwest::Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
        }
    }

    /// Build the `contents` array. The wire format keys function responses
    /// by tool *name*, so calls seen in earlier assistant turns are indexed
    /// by id to resolve the name for each result.
    fn contents(messages: &[Message]) -> Vec<Value> {
        let mut call_names: HashMap<String, String> = HashMap::new();
        let mut contents = Vec::new();

        for msg in messages {
            if msg.role == Role::System {
                continue;
            }
            let role = match msg.role {
                Role::Assistant => "model",
                _ => "user",
            };

            let parts: Vec<Value> = msg
                .parts
                .iter()
                .map(|part| match part {
                    Part::Text(text) => json!({ "text": text }),
                    Part::ToolCall(call) => {
                        call_names.insert(call.id.clone(), call.name.clone());
                        json!({ "functionCall": { "name": call.name, "args": call.input } })
                    }
                    Part::ToolResult(result) => {
                        let (id, response) = match result {
                            ToolResult::Success {
                                tool_call_id,
                                output,
                            } => (tool_call_id, json!({ "content": output })),
                            ToolResult::Failure {
                                tool_call_id,
                                error,
                            } => (tool_call_id, json!({ "error": error.to_string() })),
                        };
                        let name = call_names.get(id).cloned().unwrap_or_else(|| id.clone());
                        json!({ "functionResponse": { "name": name, "response": response } })
                    }
                })
                .collect();

            contents.push(json!({ "role": role, "parts": parts }));
        }

        contents
    }

    fn tool_to_api(spec: &ToolSpec) -> Value {
        json!({
            "name": spec.name,
            "description": spec.description,
            "parameters": sanitize_schema(spec.schema.clone()),
        })
    }
}

/// The Gemini API rejects JSON-Schema metadata keys that MCP servers
/// routinely include.
fn sanitize_schema(schema: Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| key != "$schema" && key != "additionalProperties")
                .map(|(key, value)| (key, sanitize_schema(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_schema).collect()),
        other => other,
    }
}

fn map_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        other => FinishReason::Unknown(other.to_string()),
    }
}

impl Backend for GoogleBackend {
    async fn stream(&self, request: ModelRequest<'_>) -> Result<ModelStream, ModelError> {
        let mut body = json!({ "contents": Self::contents(request.messages) });
        if let Some(system) = request.system {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }
        if !request.tools.is_empty() {
            let declarations: Vec<Value> = request.tools.iter().map(Self::tool_to_api).collect();
            body["tools"] = json!([{ "function_declarations": declarations }]);
        }

        let url = format!(
            "{GOOGLE_API_URL}/models/{}:streamGenerateContent?alt=sse",
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&body)
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
            let mut finish = FinishReason::Stop;
            // The wire format has no call ids; synthesize stable ones.
            let mut call_count = 0usize;
            let mut saw_calls = false;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        let _ = tx.send(Err(ModelError::Network(e.to_string()))).await;
                        return;
                    }
                };

                for sse in decoder.push(&chunk) {
                    let Ok(parsed) = serde_json::from_str::<StreamChunk>(&sse.data) else {
                        continue;
                    };

                    for candidate in parsed.candidates {
                        if let Some(content) = candidate.content {
                            for part in content.parts {
                                if let Some(text) = part.text {
                                    if !text.is_empty()
                                        && tx.send(Ok(ModelEvent::TextDelta(text))).await.is_err()
                                    {
                                        return;
                                    }
                                }
                                if let Some(fc) = part.function_call {
                                    saw_calls = true;
                                    let call = ToolCall {
                                        id: format!("{}-{}", fc.name, call_count),
                                        name: fc.name,
                                        input: fc.args,
                                    };
                                    call_count += 1;
                                    if tx.send(Ok(ModelEvent::ToolCall(call))).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                        if let Some(reason) = candidate.finish_reason {
                            finish = map_finish_reason(&reason);
                        }
                    }
                }
            }

            // Gemini ends the stream by closing it; a STOP with function
            // calls still means the model wants tools.
            if saw_calls && finish == FinishReason::Stop {
                finish = FinishReason::ToolCalls;
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
    fn function_responses_are_keyed_by_name() {
        let messages = vec![
            Message::user("what's on my calendar"),
            Message::from_parts(
                Role::Assistant,
                vec![Part::ToolCall(ToolCall {
                    id: "list_events-0".into(),
                    name: "list_events".into(),
                    input: json!({}),
                })],
            ),
            Message::tool_results(vec![ToolResult::Success {
                tool_call_id: "list_events-0".into(),
                output: json!("2 events"),
            }]),
        ];
        let contents = GoogleBackend::contents(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["name"],
            "list_events"
        );
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["content"],
            "2 events"
        );
    }

    #[test]
    fn failed_results_carry_the_error() {
        let messages = vec![Message::tool_results(vec![ToolResult::Failure {
            tool_call_id: "missing-0".into(),
            error: ToolError::NotFound("missing".into()),
        }])];
        let contents = GoogleBackend::contents(&messages);
        let response = &contents[0]["parts"][0]["functionResponse"]["response"];
        assert_eq!(response["error"], "tool not found: missing");
    }

    #[test]
    fn schema_sanitizer_strips_metadata_keys() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "nested": { "type": "object", "additionalProperties": false }
            }
        });
        let clean = sanitize_schema(schema);
        assert!(clean.get("$schema").is_none());
        assert!(clean.get("additionalProperties").is_none());
        assert!(clean["properties"]["nested"].get("additionalProperties").is_none());
        assert_eq!(clean["type"], "object");
    }

    #[test]
    fn stream_chunk_deserializes() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"hi"},{"functionCall":{"name":"list_events","args":{"max":3}}}]},"finishReason":"STOP"}]}"#,
        )
        .unwrap();
        let candidate = &chunk.candidates[0];
        let parts = &candidate.content.as_ref().unwrap().parts;
        assert_eq!(parts[0].text.as_deref(), Some("hi"));
        assert_eq!(parts[1].function_call.as_ref().unwrap().name, "list_events");
        assert_eq!(candidate.finish_reason.as_deref(), Some("STOP"));
    }
}
