//! Folds normalized turn events into one finished turn.
//!
//! Events are applied strictly one after another. Argument fragments are
//! appended per tool-call id in arrival order, which is the only thing that
//! keeps tool arguments parseable.

use futures_util::StreamExt;

use crate::infrastructure::ports::{LlmError, TokenUsage, ToolCall, TurnEvent, TurnEventStream};

/// The backend-agnostic outcome of one turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnResult {
    pub text: String,
    /// Tool calls in the order the backend opened them
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
    complete: bool,
}

/// Accumulator threaded through the fold. Owned by one turn; dropping it
/// discards everything received so far.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    text: String,
    calls: Vec<ToolCallBuilder>,
    usage: Option<TokenUsage>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(mut self, event: TurnEvent) -> Result<Self, LlmError> {
        match event {
            TurnEvent::TextDelta(delta) => self.text.push_str(&delta),
            TurnEvent::ToolCallStart { id, name } => {
                if self.calls.iter().any(|c| c.id == id) {
                    return Err(LlmError::invalid(format!(
                        "Tool call '{}' was started twice",
                        id
                    )));
                }
                self.calls.push(ToolCallBuilder {
                    id,
                    name,
                    arguments: String::new(),
                    complete: false,
                });
            }
            TurnEvent::ToolCallArgumentsDelta { id, fragment } => {
                let call = self.open_call(&id)?;
                call.arguments.push_str(&fragment);
            }
            TurnEvent::ToolCallComplete { id } => {
                let call = self.open_call(&id)?;
                call.complete = true;
            }
            TurnEvent::TurnComplete { usage } => {
                if usage.is_some() {
                    self.usage = usage;
                }
            }
        }
        Ok(self)
    }

    /// Close the turn. Calls the stream never completed are complete now.
    ///
    /// A turn with neither text nor tool calls is a protocol error, even if
    /// the backend closed it cleanly.
    pub fn finish(self) -> Result<TurnResult, LlmError> {
        if self.text.trim().is_empty() && self.calls.is_empty() {
            return Err(LlmError::invalid("Backend returned an empty turn"));
        }

        let tool_calls = self
            .calls
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                name: c.name,
                arguments: if c.arguments.trim().is_empty() {
                    "{}".to_string()
                } else {
                    c.arguments
                },
            })
            .collect();

        Ok(TurnResult {
            text: self.text,
            tool_calls,
            usage: self.usage,
        })
    }

    fn open_call(&mut self, id: &str) -> Result<&mut ToolCallBuilder, LlmError> {
        let call = self
            .calls
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| LlmError::invalid(format!("Fragment for unknown tool call '{}'", id)))?;
        if call.complete {
            return Err(LlmError::invalid(format!(
                "Fragment for already completed tool call '{}'",
                id
            )));
        }
        Ok(call)
    }
}

/// Drain one turn's events, showing each to `observer` before folding it.
pub async fn collect_turn<F>(mut events: TurnEventStream, observer: &mut F) -> Result<TurnResult, LlmError>
where
    F: FnMut(&TurnEvent),
{
    let mut accumulator = TurnAccumulator::new();
    while let Some(event) = events.next().await {
        let event = event?;
        observer(&event);
        accumulator = accumulator.apply(event)?;
    }
    accumulator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::openai::bulk_turn_stream;
    use crate::infrastructure::openai::protocol::{FrameNormalizer, WireProtocol};
    use crate::infrastructure::openai::sse::sse_turn_stream;

    fn start(id: &str, name: &str) -> TurnEvent {
        TurnEvent::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    fn args(id: &str, fragment: &str) -> TurnEvent {
        TurnEvent::ToolCallArgumentsDelta {
            id: id.to_string(),
            fragment: fragment.to_string(),
        }
    }

    fn complete(id: &str) -> TurnEvent {
        TurnEvent::ToolCallComplete { id: id.to_string() }
    }

    fn fold(events: Vec<TurnEvent>) -> Result<TurnResult, LlmError> {
        events
            .into_iter()
            .try_fold(TurnAccumulator::new(), TurnAccumulator::apply)?
            .finish()
    }

    #[test]
    fn test_fragmented_arguments_match_whole() {
        let fragmented = fold(vec![
            start("c1", "roll_dice"),
            args("c1", "{\"a\":"),
            args("c1", "1}"),
            complete("c1"),
        ])
        .unwrap();
        let whole = fold(vec![start("c1", "roll_dice"), args("c1", "{\"a\":1}"), complete("c1")]).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&fragmented.tool_calls[0].arguments).unwrap();
        let expected: serde_json::Value = serde_json::from_str(&whole.tool_calls[0].arguments).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_interleaved_calls_never_merge() {
        let result = fold(vec![
            TurnEvent::TextDelta("Two ".to_string()),
            start("a", "roll_dice"),
            start("b", "roll_dice"),
            args("a", "{\"expr\":"),
            args("b", "{\"expr\":\"1d4\"}"),
            args("a", "\"1d8\"}"),
            TurnEvent::TextDelta("rolls.".to_string()),
            complete("b"),
            complete("a"),
            TurnEvent::TurnComplete { usage: None },
        ])
        .unwrap();

        assert_eq!(result.text, "Two rolls.");
        assert_eq!(result.tool_calls[0].id, "a");
        assert_eq!(result.tool_calls[0].arguments, "{\"expr\":\"1d8\"}");
        assert_eq!(result.tool_calls[1].arguments, "{\"expr\":\"1d4\"}");
    }

    #[test]
    fn test_stream_end_completes_open_calls() {
        let result = fold(vec![start("c1", "create_character"), args("c1", "{}")]).unwrap();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.tool_calls[0].name, "create_character");
    }

    #[test]
    fn test_empty_arguments_become_empty_object() {
        let result = fold(vec![start("c1", "roll_dice"), complete("c1")]).unwrap();
        assert_eq!(result.tool_calls[0].arguments, "{}");
    }

    #[test]
    fn test_fragment_for_unknown_call_is_error() {
        let result = fold(vec![args("ghost", "{}")]);
        assert!(matches!(result, Err(LlmError::InvalidResponse(msg)) if msg.contains("unknown")));
    }

    #[test]
    fn test_fragment_after_completion_is_error() {
        let result = fold(vec![start("c1", "roll_dice"), complete("c1"), args("c1", "x")]);
        assert!(matches!(result, Err(LlmError::InvalidResponse(msg)) if msg.contains("completed")));
    }

    #[test]
    fn test_duplicate_start_is_error() {
        let result = fold(vec![start("c1", "roll_dice"), start("c1", "roll_dice")]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_turn_is_error() {
        assert!(matches!(fold(vec![]), Err(LlmError::InvalidResponse(_))));
    }

    #[test]
    fn test_completed_turn_without_payload_is_error() {
        let result = fold(vec![TurnEvent::TurnComplete {
            usage: Some(TokenUsage::default()),
        }]);
        assert!(matches!(result, Err(LlmError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_empty_sse_bodies_are_rejected() {
        for protocol in [WireProtocol::ChatCompletions, WireProtocol::Responses] {
            for body in ["", "data: [DONE]\n\n"] {
                let bytes = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(
                    body.as_bytes().to_vec(),
                )]);
                let events = sse_turn_stream(bytes, FrameNormalizer::for_protocol(protocol));

                let result = collect_turn(events, &mut |_: &TurnEvent| {}).await;
                assert!(
                    matches!(result, Err(LlmError::InvalidResponse(_))),
                    "{} body {:?}: {:?}",
                    protocol,
                    body,
                    result
                );
            }
        }
    }

    #[test]
    fn test_usage_recorded() {
        let usage = TokenUsage {
            prompt_tokens: 4,
            completion_tokens: 6,
            total_tokens: 10,
        };
        let result = fold(vec![
            TurnEvent::TextDelta("ok".to_string()),
            TurnEvent::TurnComplete { usage: Some(usage) },
        ])
        .unwrap();
        assert_eq!(result.usage, Some(usage));
    }

    #[tokio::test]
    async fn test_collect_turn_shows_every_event() {
        let mut seen = Vec::new();
        let result = collect_turn(
            bulk_turn_stream(vec![
                TurnEvent::TextDelta("The ".to_string()),
                TurnEvent::TextDelta("end.".to_string()),
                TurnEvent::TurnComplete { usage: None },
            ]),
            &mut |event: &TurnEvent| seen.push(event.clone()),
        )
        .await
        .unwrap();

        assert_eq!(result.text, "The end.");
        assert_eq!(seen.len(), 3);
    }

    #[tokio::test]
    async fn test_collect_turn_stops_at_stream_error() {
        let events: TurnEventStream = Box::pin(futures_util::stream::iter(vec![
            Ok(TurnEvent::TextDelta("partial".to_string())),
            Err(LlmError::RequestFailed("reset".to_string())),
        ]));
        let result = collect_turn(events, &mut |_: &TurnEvent| {}).await;
        assert_eq!(result, Err(LlmError::RequestFailed("reset".to_string())));
    }
}
