//! Chat Completions wire format (`/v1/chat/completions`).
//!
//! A reply carries assistant messages in `choices`; streamed replies carry
//! per-field deltas where tool-call fragments are keyed by position index.

use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{
    ChatMessage, LlmError, LlmRequest, MessageRole, TokenUsage, TurnEvent,
};

// =============================================================================
// Request encoding
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatCompletionMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatCompletionTool>,
    /// Only meaningful alongside tools; some gateways reject it otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
struct ChatCompletionMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatCompletionTool {
    r#type: &'static str,
    function: ChatCompletionFunction,
}

#[derive(Debug, Serialize)]
struct ChatCompletionFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

pub fn encode_request(model: &str, request: &LlmRequest, stream: bool) -> ChatCompletionRequest {
    let messages = request.messages.iter().map(encode_message).collect();

    let tools: Vec<ChatCompletionTool> = request
        .tools
        .iter()
        .map(|t| ChatCompletionTool {
            r#type: "function",
            function: ChatCompletionFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect();

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        parallel_tool_calls: (!tools.is_empty()).then_some(request.parallel_tool_calls),
        tools,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream,
        stream_options: stream.then_some(StreamOptions {
            include_usage: true,
        }),
    }
}

fn encode_message(message: &ChatMessage) -> ChatCompletionMessage {
    let role = match message.role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    };

    // Assistant turns that only called tools send no content at all
    let content = if message.role == MessageRole::Assistant
        && message.content.is_empty()
        && !message.tool_calls.is_empty()
    {
        None
    } else {
        Some(message.content.clone())
    };

    ChatCompletionMessage {
        role,
        content,
        tool_calls: message
            .tool_calls
            .iter()
            .map(|tc| WireToolCall {
                id: tc.id.clone(),
                kind: Some("function".to_string()),
                function: WireFunctionCall {
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                },
            })
            .collect(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

// =============================================================================
// Bulk responses
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatCompletionChoice>,
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    #[serde(default)]
    message: ResponseMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ChatCompletionUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ChatCompletionUsage> for TokenUsage {
    fn from(u: ChatCompletionUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

/// Normalize a complete (non-streamed) reply into turn events.
///
/// Every choice is scanned in order; a reply without any choice is a
/// protocol error.
pub fn normalize_completion(body: &str) -> Result<Vec<TurnEvent>, LlmError> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::invalid(format!("Malformed chat completion: {}", e)))?;

    if response.choices.is_empty() {
        return Err(LlmError::invalid("No choices in LLM response"));
    }

    let mut events = Vec::new();
    for choice in response.choices {
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            events.push(TurnEvent::TextDelta(text));
        }
        for call in choice.message.tool_calls {
            events.push(TurnEvent::ToolCallStart {
                id: call.id.clone(),
                name: call.function.name,
            });
            if !call.function.arguments.is_empty() {
                events.push(TurnEvent::ToolCallArgumentsDelta {
                    id: call.id.clone(),
                    fragment: call.function.arguments,
                });
            }
            events.push(TurnEvent::ToolCallComplete { id: call.id });
        }
    }
    events.push(TurnEvent::TurnComplete {
        usage: response.usage.map(TokenUsage::from),
    });
    Ok(events)
}

// =============================================================================
// Streamed chunks
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Turns positional chunk deltas into id-keyed turn events.
#[derive(Debug, Default)]
pub struct ChatChunkNormalizer {
    /// Calls opened but not yet completed: (position index, call id)
    open_calls: Vec<(u32, String)>,
    usage: Option<TokenUsage>,
    finished: bool,
}

impl ChatChunkNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &str) -> Result<Vec<TurnEvent>, LlmError> {
        let chunk: ChatCompletionChunk = serde_json::from_str(data)
            .map_err(|e| LlmError::invalid(format!("Malformed stream chunk: {}", e)))?;

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                events.push(TurnEvent::TextDelta(text));
            }

            for delta in choice.delta.tool_calls {
                let (name, arguments) = match delta.function {
                    Some(f) => (f.name, f.arguments),
                    None => (None, None),
                };
                let id = match self.open_call_id(delta.index) {
                    Some(id) => id,
                    None => {
                        let id = delta
                            .id
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| format!("call_{}", delta.index));
                        self.open_calls.push((delta.index, id.clone()));
                        events.push(TurnEvent::ToolCallStart {
                            id: id.clone(),
                            name: name.unwrap_or_default(),
                        });
                        id
                    }
                };
                if let Some(fragment) = arguments.filter(|a| !a.is_empty()) {
                    events.push(TurnEvent::ToolCallArgumentsDelta { id, fragment });
                }
            }

            if choice.finish_reason.is_some() {
                events.extend(self.complete_open_calls());
            }
        }
        Ok(events)
    }

    /// Called at `[DONE]` or end of stream.
    pub fn finish(&mut self) -> Vec<TurnEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut events = self.complete_open_calls();
        events.push(TurnEvent::TurnComplete {
            usage: self.usage.take(),
        });
        events
    }

    fn open_call_id(&self, index: u32) -> Option<String> {
        self.open_calls
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, id)| id.clone())
    }

    fn complete_open_calls(&mut self) -> Vec<TurnEvent> {
        self.open_calls
            .drain(..)
            .map(|(_, id)| TurnEvent::ToolCallComplete { id })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{ToolCall, ToolDefinition};
    use serde_json::json;

    #[test]
    fn test_encode_request_roles_and_tools() {
        let request = LlmRequest::new(vec![
            ChatMessage::system("You are the GM."),
            ChatMessage::user("I attack the goblin"),
            ChatMessage::assistant_with_tool_calls(
                "",
                vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "roll_dice".to_string(),
                    arguments: "{\"expr\":\"1d20\"}".to_string(),
                }],
            ),
            ChatMessage::tool_result("call_1", "{\"total\":12}"),
        ])
        .with_tools(vec![ToolDefinition {
            name: "roll_dice".to_string(),
            description: "Roll dice".to_string(),
            parameters: json!({"type": "object"}),
        }])
        .with_temperature(Some(0.5));

        let body = serde_json::to_value(encode_request("gpt-4o-mini", &request, false)).unwrap();

        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["parallel_tool_calls"], false);
        assert_eq!(body["stream"], false);
        assert!(body.get("stream_options").is_none());
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "roll_dice");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert!(messages[2].get("content").is_none());
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"expr\":\"1d20\"}");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_streaming_request_asks_for_usage() {
        let request = LlmRequest::new(vec![ChatMessage::user("hi")]);
        let body = serde_json::to_value(encode_request("gpt-4o", &request, true)).unwrap();
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert!(body.get("parallel_tool_calls").is_none());
    }

    #[test]
    fn test_normalize_completion_with_tool_call() {
        let body = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "Let me roll.",
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "roll_dice", "arguments": "{\"expr\":\"1d20+4\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
        .to_string();

        let events = normalize_completion(&body).unwrap();
        assert_eq!(
            events,
            vec![
                TurnEvent::TextDelta("Let me roll.".to_string()),
                TurnEvent::ToolCallStart {
                    id: "call_9".to_string(),
                    name: "roll_dice".to_string()
                },
                TurnEvent::ToolCallArgumentsDelta {
                    id: "call_9".to_string(),
                    fragment: "{\"expr\":\"1d20+4\"}".to_string()
                },
                TurnEvent::ToolCallComplete {
                    id: "call_9".to_string()
                },
                TurnEvent::TurnComplete {
                    usage: Some(TokenUsage {
                        prompt_tokens: 10,
                        completion_tokens: 5,
                        total_tokens: 15
                    })
                },
            ]
        );
    }

    #[test]
    fn test_text_is_read_from_every_choice() {
        let body = json!({
            "choices": [
                {"message": {"content": null}},
                {"message": {"content": "The torch gutters."}}
            ]
        })
        .to_string();

        let events = normalize_completion(&body).unwrap();
        assert_eq!(
            events[0],
            TurnEvent::TextDelta("The torch gutters.".to_string())
        );
    }

    #[test]
    fn test_no_choices_is_protocol_error() {
        let result = normalize_completion(&json!({"choices": []}).to_string());
        assert_eq!(
            result,
            Err(LlmError::InvalidResponse(
                "No choices in LLM response".to_string()
            ))
        );
    }

    #[test]
    fn test_chunks_keyed_by_index() {
        let mut normalizer = ChatChunkNormalizer::new();
        let chunks = [
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "id": "call_a", "function": {"name": "roll_dice", "arguments": ""}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "{\"expr\":"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"index": 0, "function": {"arguments": "\"2d6\"}"}}
            ]}}]}),
            json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}}),
        ];

        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(normalizer.push(&chunk.to_string()).unwrap());
        }
        events.extend(normalizer.finish());

        assert_eq!(
            events,
            vec![
                TurnEvent::ToolCallStart {
                    id: "call_a".to_string(),
                    name: "roll_dice".to_string()
                },
                TurnEvent::ToolCallArgumentsDelta {
                    id: "call_a".to_string(),
                    fragment: "{\"expr\":".to_string()
                },
                TurnEvent::ToolCallArgumentsDelta {
                    id: "call_a".to_string(),
                    fragment: "\"2d6\"}".to_string()
                },
                TurnEvent::ToolCallComplete {
                    id: "call_a".to_string()
                },
                TurnEvent::TurnComplete {
                    usage: Some(TokenUsage {
                        prompt_tokens: 3,
                        completion_tokens: 2,
                        total_tokens: 5
                    })
                },
            ]
        );
        assert!(normalizer.finish().is_empty());
    }

    #[test]
    fn test_missing_call_id_is_synthesized() {
        let mut normalizer = ChatChunkNormalizer::new();
        let events = normalizer
            .push(
                &json!({"choices": [{"delta": {"tool_calls": [
                    {"index": 1, "function": {"name": "create_character", "arguments": "{}"}}
                ]}}]})
                .to_string(),
            )
            .unwrap();
        assert_eq!(
            events[0],
            TurnEvent::ToolCallStart {
                id: "call_1".to_string(),
                name: "create_character".to_string()
            }
        );
    }

    #[test]
    fn test_malformed_chunk_is_protocol_error() {
        let mut normalizer = ChatChunkNormalizer::new();
        assert!(matches!(
            normalizer.push("{not json"),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
