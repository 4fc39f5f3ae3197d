//! Responses wire format (`/v1/responses`).
//!
//! A reply is an ordered list of typed output items (messages, function
//! calls, reasoning). Streams deliver discrete events tagged by kind.

use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::{
    ChatMessage, LlmError, LlmRequest, MessageRole, TokenUsage, TurnEvent,
};

// =============================================================================
// Request encoding
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ResponsesRequest {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
    input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ResponsesTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputItem {
    Message {
        role: &'static str,
        content: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

#[derive(Debug, Serialize)]
struct ResponsesTool {
    r#type: &'static str,
    name: String,
    description: String,
    parameters: serde_json::Value,
}

pub fn encode_request(model: &str, request: &LlmRequest, stream: bool) -> ResponsesRequest {
    let instructions: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| m.content.as_str())
        .collect();

    let input = request
        .messages
        .iter()
        .flat_map(encode_message)
        .collect();

    let tools: Vec<ResponsesTool> = request
        .tools
        .iter()
        .map(|t| ResponsesTool {
            r#type: "function",
            name: t.name.clone(),
            description: t.description.clone(),
            parameters: t.parameters.clone(),
        })
        .collect();

    ResponsesRequest {
        model: model.to_string(),
        instructions: (!instructions.is_empty()).then(|| instructions.join("\n\n")),
        input,
        parallel_tool_calls: (!tools.is_empty()).then_some(request.parallel_tool_calls),
        tools,
        temperature: request.temperature,
        max_output_tokens: request.max_tokens,
        stream,
    }
}

fn encode_message(message: &ChatMessage) -> Vec<InputItem> {
    match message.role {
        // Carried in `instructions`
        MessageRole::System => Vec::new(),
        MessageRole::User => vec![InputItem::Message {
            role: "user",
            content: message.content.clone(),
        }],
        MessageRole::Assistant => {
            let mut items = Vec::new();
            if !message.content.is_empty() {
                items.push(InputItem::Message {
                    role: "assistant",
                    content: message.content.clone(),
                });
            }
            items.extend(message.tool_calls.iter().map(|tc| InputItem::FunctionCall {
                call_id: tc.id.clone(),
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            }));
            items
        }
        MessageRole::Tool => vec![InputItem::FunctionCallOutput {
            call_id: message.tool_call_id.clone().unwrap_or_default(),
            output: message.content.clone(),
        }],
    }
}

// =============================================================================
// Bulk responses
// =============================================================================

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    output: Option<Vec<OutputItem>>,
    /// Convenience concatenation some backends add; same text as the items
    output_text: Option<String>,
    usage: Option<ResponsesUsage>,
    error: Option<ResponsesErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        text: String,
    },
    #[serde(other)]
    Other,
}

impl ContentPart {
    fn text(&self) -> Option<&str> {
        match self {
            ContentPart::OutputText { text } if !text.is_empty() => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<ResponsesUsage> for TokenUsage {
    fn from(u: ResponsesUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResponsesErrorBody {
    #[serde(default)]
    message: String,
}

fn function_call_events(call_id: String, name: String, arguments: String) -> Vec<TurnEvent> {
    let mut events = vec![TurnEvent::ToolCallStart {
        id: call_id.clone(),
        name,
    }];
    if !arguments.is_empty() {
        events.push(TurnEvent::ToolCallArgumentsDelta {
            id: call_id.clone(),
            fragment: arguments,
        });
    }
    events.push(TurnEvent::ToolCallComplete { id: call_id });
    events
}

/// Normalize a complete (non-streamed) reply into turn events.
///
/// Items are scanned in order wherever they sit in `output`. `output_text`
/// only stands in when no message item carried text.
pub fn normalize_response(body: &str) -> Result<Vec<TurnEvent>, LlmError> {
    let response: ResponsesResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::invalid(format!("Malformed response: {}", e)))?;

    if let Some(error) = response.error {
        return Err(LlmError::invalid(format!("Backend reported: {}", error.message)));
    }
    let output = response
        .output
        .ok_or_else(|| LlmError::invalid("No output in LLM response"))?;

    let mut events = Vec::new();
    let mut saw_item_text = false;
    for item in output {
        match item {
            OutputItem::Message { content, .. } => {
                for text in content.iter().filter_map(ContentPart::text) {
                    saw_item_text = true;
                    events.push(TurnEvent::TextDelta(text.to_string()));
                }
            }
            OutputItem::FunctionCall {
                call_id,
                name,
                arguments,
                ..
            } => events.extend(function_call_events(call_id, name, arguments)),
            OutputItem::Other => {}
        }
    }

    if !saw_item_text {
        if let Some(text) = response.output_text.filter(|t| !t.is_empty()) {
            events.insert(0, TurnEvent::TextDelta(text));
        }
    }

    events.push(TurnEvent::TurnComplete {
        usage: response.usage.map(TokenUsage::from),
    });
    Ok(events)
}

// =============================================================================
// Streamed events
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        #[serde(default)]
        item_id: Option<String>,
        delta: String,
    },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { item: OutputItem },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { item_id: String, delta: String },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },
    #[serde(rename = "response.completed", alias = "response.incomplete")]
    Completed { response: CompletedResponse },
    #[serde(rename = "response.failed")]
    Failed { response: FailedResponse },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct CompletedResponse {
    usage: Option<ResponsesUsage>,
}

#[derive(Debug, Deserialize)]
struct FailedResponse {
    error: Option<ResponsesErrorBody>,
}

#[derive(Debug)]
struct StreamedCall {
    item_id: Option<String>,
    call_id: String,
    streamed_arguments: bool,
    done: bool,
}

/// Turns item-stream events into id-keyed turn events.
#[derive(Debug, Default)]
pub struct ResponsesEventNormalizer {
    calls: Vec<StreamedCall>,
    /// Message items whose text already arrived as deltas
    text_items: Vec<String>,
    untracked_text: bool,
    finished: bool,
}

impl ResponsesEventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &str) -> Result<Vec<TurnEvent>, LlmError> {
        let event: StreamEvent = serde_json::from_str(data)
            .map_err(|e| LlmError::invalid(format!("Malformed stream event: {}", e)))?;

        let mut events = Vec::new();
        match event {
            StreamEvent::OutputTextDelta { item_id, delta } => {
                match item_id {
                    Some(id) if !self.text_items.contains(&id) => self.text_items.push(id),
                    Some(_) => {}
                    None => self.untracked_text = true,
                }
                if !delta.is_empty() {
                    events.push(TurnEvent::TextDelta(delta));
                }
            }
            StreamEvent::OutputItemAdded { item } => {
                if let OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                } = item
                {
                    events.push(TurnEvent::ToolCallStart {
                        id: call_id.clone(),
                        name,
                    });
                    let streamed_arguments = !arguments.is_empty();
                    if streamed_arguments {
                        events.push(TurnEvent::ToolCallArgumentsDelta {
                            id: call_id.clone(),
                            fragment: arguments,
                        });
                    }
                    self.calls.push(StreamedCall {
                        item_id: id,
                        call_id,
                        streamed_arguments,
                        done: false,
                    });
                }
            }
            StreamEvent::FunctionCallArgumentsDelta { item_id, delta } => {
                // An unknown item id passes through unchanged; the aggregator
                // rejects fragments for calls that were never opened.
                let id = match self.call_for_item(&item_id) {
                    Some(call) => {
                        call.streamed_arguments = true;
                        call.call_id.clone()
                    }
                    None => item_id,
                };
                if !delta.is_empty() {
                    events.push(TurnEvent::ToolCallArgumentsDelta {
                        id,
                        fragment: delta,
                    });
                }
            }
            StreamEvent::OutputItemDone { item } => match item {
                OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                } => events.extend(self.finish_call(id, call_id, name, arguments)),
                OutputItem::Message { id, content } => {
                    let already_streamed = self.untracked_text
                        || id.as_ref().is_some_and(|id| self.text_items.contains(id));
                    if !already_streamed {
                        events.extend(
                            content
                                .iter()
                                .filter_map(ContentPart::text)
                                .map(|t| TurnEvent::TextDelta(t.to_string())),
                        );
                    }
                }
                OutputItem::Other => {}
            },
            StreamEvent::Completed { response } => {
                events.extend(self.complete_open_calls());
                events.push(TurnEvent::TurnComplete {
                    usage: response.usage.map(TokenUsage::from),
                });
                self.finished = true;
            }
            StreamEvent::Failed { response } => {
                let message = response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "response failed".to_string());
                return Err(LlmError::invalid(format!("Backend reported: {}", message)));
            }
            StreamEvent::Error { message } => {
                return Err(LlmError::RequestFailed(message));
            }
            StreamEvent::Other => {}
        }
        Ok(events)
    }

    /// Called at end of stream.
    pub fn finish(&mut self) -> Vec<TurnEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;
        let mut events = self.complete_open_calls();
        events.push(TurnEvent::TurnComplete { usage: None });
        events
    }

    fn call_for_item(&mut self, item_id: &str) -> Option<&mut StreamedCall> {
        self.calls
            .iter_mut()
            .find(|c| c.item_id.as_deref() == Some(item_id) || c.call_id == item_id)
    }

    fn finish_call(
        &mut self,
        item_id: Option<String>,
        call_id: String,
        name: String,
        arguments: String,
    ) -> Vec<TurnEvent> {
        let position = self.calls.iter().position(|c| c.call_id == call_id);
        let Some(position) = position else {
            // Never announced: the done item carries everything
            self.calls.push(StreamedCall {
                item_id,
                call_id: call_id.clone(),
                streamed_arguments: true,
                done: true,
            });
            return function_call_events(call_id, name, arguments);
        };

        let call = &mut self.calls[position];
        if call.done {
            return Vec::new();
        }
        call.done = true;

        let mut events = Vec::new();
        if !call.streamed_arguments && !arguments.is_empty() {
            events.push(TurnEvent::ToolCallArgumentsDelta {
                id: call_id.clone(),
                fragment: arguments,
            });
        }
        events.push(TurnEvent::ToolCallComplete { id: call_id });
        events
    }

    fn complete_open_calls(&mut self) -> Vec<TurnEvent> {
        self.calls
            .iter_mut()
            .filter(|c| !c.done)
            .map(|c| {
                c.done = true;
                TurnEvent::ToolCallComplete {
                    id: c.call_id.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{ToolCall, ToolDefinition};
    use serde_json::json;

    fn push_all(normalizer: &mut ResponsesEventNormalizer, events: &[serde_json::Value]) -> Vec<TurnEvent> {
        let mut out = Vec::new();
        for event in events {
            out.extend(normalizer.push(&event.to_string()).unwrap());
        }
        out.extend(normalizer.finish());
        out
    }

    #[test]
    fn test_encode_request_moves_system_to_instructions() {
        let request = LlmRequest::new(vec![
            ChatMessage::system("You are the GM."),
            ChatMessage::user("Search the chest"),
            ChatMessage::assistant_with_tool_calls(
                "Rolling.",
                vec![ToolCall {
                    id: "call_7".to_string(),
                    name: "roll_dice".to_string(),
                    arguments: "{\"expr\":\"1d6\"}".to_string(),
                }],
            ),
            ChatMessage::tool_result("call_7", "{\"total\":4}"),
        ])
        .with_tools(vec![ToolDefinition {
            name: "roll_dice".to_string(),
            description: "Roll dice".to_string(),
            parameters: json!({"type": "object"}),
        }])
        .with_max_tokens(Some(500));

        let body = serde_json::to_value(encode_request("o3-mini", &request, true)).unwrap();

        assert_eq!(body["instructions"], "You are the GM.");
        assert_eq!(body["parallel_tool_calls"], false);
        assert_eq!(body["max_output_tokens"], 500);
        assert_eq!(body["stream"], true);
        assert_eq!(
            body["tools"][0],
            json!({"type": "function", "name": "roll_dice", "description": "Roll dice", "parameters": {"type": "object"}})
        );
        assert_eq!(
            body["input"],
            json!([
                {"type": "message", "role": "user", "content": "Search the chest"},
                {"type": "message", "role": "assistant", "content": "Rolling."},
                {"type": "function_call", "call_id": "call_7", "name": "roll_dice", "arguments": "{\"expr\":\"1d6\"}"},
                {"type": "function_call_output", "call_id": "call_7", "output": "{\"total\":4}"}
            ])
        );
    }

    #[test]
    fn test_system_message_yields_no_input_item() {
        assert!(encode_message(&ChatMessage::system("You are the GM.")).is_empty());
    }

    #[test]
    fn test_text_found_after_reasoning_item() {
        let body = json!({
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {"type": "message", "id": "msg_1", "content": [
                    {"type": "output_text", "text": "The bridge "},
                    {"type": "output_text", "text": "holds."}
                ]}
            ],
            "output_text": "The bridge holds.",
            "usage": {"input_tokens": 20, "output_tokens": 4, "total_tokens": 24}
        })
        .to_string();

        let events = normalize_response(&body).unwrap();
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        // output_text must not be appended on top of the item text
        assert_eq!(text, "The bridge holds.");
        assert!(matches!(
            events.last(),
            Some(TurnEvent::TurnComplete { usage: Some(u) }) if u.total_tokens == 24
        ));
    }

    #[test]
    fn test_output_text_used_when_items_have_none() {
        let body = json!({
            "output": [
                {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "roll_dice", "arguments": "{}"}
            ],
            "output_text": "Rolling for you."
        })
        .to_string();

        let events = normalize_response(&body).unwrap();
        assert_eq!(events[0], TurnEvent::TextDelta("Rolling for you.".to_string()));
        assert_eq!(
            events[1],
            TurnEvent::ToolCallStart {
                id: "call_1".to_string(),
                name: "roll_dice".to_string()
            }
        );
    }

    #[test]
    fn test_missing_output_is_protocol_error() {
        let result = normalize_response(&json!({"id": "resp_1"}).to_string());
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_stream_function_call_with_argument_deltas() {
        let mut normalizer = ResponsesEventNormalizer::new();
        let events = push_all(
            &mut normalizer,
            &[
                json!({"type": "response.created", "response": {"id": "resp_1"}}),
                json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "Roll "}),
                json!({"type": "response.output_text.delta", "item_id": "msg_1", "delta": "initiative."}),
                json!({"type": "response.output_item.done", "item": {"type": "message", "id": "msg_1", "content": [{"type": "output_text", "text": "Roll initiative."}]}}),
                json!({"type": "response.output_item.added", "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "roll_dice", "arguments": ""}}),
                json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "{\"expr\":"}),
                json!({"type": "response.function_call_arguments.delta", "item_id": "fc_1", "delta": "\"1d20\"}"}),
                json!({"type": "response.output_item.done", "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "roll_dice", "arguments": "{\"expr\":\"1d20\"}"}}),
                json!({"type": "response.completed", "response": {"usage": {"input_tokens": 1, "output_tokens": 2, "total_tokens": 3}}}),
            ],
        );

        assert_eq!(
            events,
            vec![
                TurnEvent::TextDelta("Roll ".to_string()),
                TurnEvent::TextDelta("initiative.".to_string()),
                TurnEvent::ToolCallStart {
                    id: "call_1".to_string(),
                    name: "roll_dice".to_string()
                },
                TurnEvent::ToolCallArgumentsDelta {
                    id: "call_1".to_string(),
                    fragment: "{\"expr\":".to_string()
                },
                TurnEvent::ToolCallArgumentsDelta {
                    id: "call_1".to_string(),
                    fragment: "\"1d20\"}".to_string()
                },
                TurnEvent::ToolCallComplete {
                    id: "call_1".to_string()
                },
                TurnEvent::TurnComplete {
                    usage: Some(TokenUsage {
                        prompt_tokens: 1,
                        completion_tokens: 2,
                        total_tokens: 3
                    })
                },
            ]
        );
    }

    #[test]
    fn test_done_item_supplies_unstreamed_arguments() {
        let mut normalizer = ResponsesEventNormalizer::new();
        let events = push_all(
            &mut normalizer,
            &[
                json!({"type": "response.output_item.added", "item": {"type": "function_call", "id": "fc_2", "call_id": "call_2", "name": "create_character"}}),
                json!({"type": "response.output_item.done", "item": {"type": "function_call", "id": "fc_2", "call_id": "call_2", "name": "create_character", "arguments": "{\"name\":\"Ysolde\"}"}}),
            ],
        );

        assert_eq!(
            events[1],
            TurnEvent::ToolCallArgumentsDelta {
                id: "call_2".to_string(),
                fragment: "{\"name\":\"Ysolde\"}".to_string()
            }
        );
        assert_eq!(
            events[2],
            TurnEvent::ToolCallComplete {
                id: "call_2".to_string()
            }
        );
        assert_eq!(events[3], TurnEvent::TurnComplete { usage: None });
    }

    #[test]
    fn test_message_done_without_deltas_emits_text() {
        let mut normalizer = ResponsesEventNormalizer::new();
        let events = push_all(
            &mut normalizer,
            &[json!({"type": "response.output_item.done", "item": {"type": "message", "id": "msg_9", "content": [{"type": "output_text", "text": "Silence."}]}})],
        );
        assert_eq!(events[0], TurnEvent::TextDelta("Silence.".to_string()));
    }

    #[test]
    fn test_failed_event_is_error() {
        let mut normalizer = ResponsesEventNormalizer::new();
        let result = normalizer.push(
            &json!({"type": "response.failed", "response": {"error": {"message": "overloaded"}}})
                .to_string(),
        );
        assert!(matches!(result, Err(LlmError::InvalidResponse(msg)) if msg.contains("overloaded")));
    }
}
