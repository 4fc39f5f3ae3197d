//! Wire-protocol selection. The only place that branches on which of the
//! two backend formats a model speaks.

use std::fmt;

use serde::Serialize;

use super::chat_completions::{self, ChatChunkNormalizer, ChatCompletionRequest};
use super::responses::{self, ResponsesEventNormalizer, ResponsesRequest};
use crate::infrastructure::ports::{LlmError, LlmRequest, TurnEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    /// Turn protocol: `choices[].message` plus positional tool-call deltas
    ChatCompletions,
    /// Item-stream protocol: typed output items and tagged stream events
    Responses,
}

impl WireProtocol {
    /// Reasoning (`o1`/`o3`/`o4`), `gpt-5` and `codex` models only speak the
    /// item-stream protocol.
    pub fn for_model(model: &str) -> Self {
        let name = model
            .rsplit('/')
            .next()
            .unwrap_or(model)
            .trim()
            .to_ascii_lowercase();

        let reasoning = ["o1", "o3", "o4"].iter().any(|family| {
            name == *family
                || name
                    .strip_prefix(family)
                    .is_some_and(|rest| rest.starts_with('-'))
        });

        if reasoning || name.starts_with("gpt-5") || name.contains("codex") {
            WireProtocol::Responses
        } else {
            WireProtocol::ChatCompletions
        }
    }

    pub fn endpoint(&self) -> &'static str {
        match self {
            WireProtocol::ChatCompletions => "/v1/chat/completions",
            WireProtocol::Responses => "/v1/responses",
        }
    }

    pub fn encode_request(&self, model: &str, request: &LlmRequest, stream: bool) -> WireRequest {
        match self {
            WireProtocol::ChatCompletions => {
                WireRequest::ChatCompletions(chat_completions::encode_request(model, request, stream))
            }
            WireProtocol::Responses => {
                WireRequest::Responses(responses::encode_request(model, request, stream))
            }
        }
    }

    /// Normalize a complete JSON reply body.
    pub fn normalize_body(&self, body: &str) -> Result<Vec<TurnEvent>, LlmError> {
        match self {
            WireProtocol::ChatCompletions => chat_completions::normalize_completion(body),
            WireProtocol::Responses => responses::normalize_response(body),
        }
    }
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireProtocol::ChatCompletions => write!(f, "chat_completions"),
            WireProtocol::Responses => write!(f, "responses"),
        }
    }
}

/// Request body in whichever format the protocol expects
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum WireRequest {
    ChatCompletions(ChatCompletionRequest),
    Responses(ResponsesRequest),
}

/// Per-turn streaming state for one protocol
#[derive(Debug)]
pub enum FrameNormalizer {
    ChatCompletions(ChatChunkNormalizer),
    Responses(ResponsesEventNormalizer),
}

impl FrameNormalizer {
    pub fn for_protocol(protocol: WireProtocol) -> Self {
        match protocol {
            WireProtocol::ChatCompletions => Self::ChatCompletions(ChatChunkNormalizer::new()),
            WireProtocol::Responses => Self::Responses(ResponsesEventNormalizer::new()),
        }
    }

    /// Normalize one SSE data payload.
    pub fn push(&mut self, data: &str) -> Result<Vec<TurnEvent>, LlmError> {
        match self {
            Self::ChatCompletions(n) => n.push(data),
            Self::Responses(n) => n.push(data),
        }
    }

    /// Events owed at end of stream (open calls, turn completion).
    pub fn finish(&mut self) -> Vec<TurnEvent> {
        match self {
            Self::ChatCompletions(n) => n.finish(),
            Self::Responses(n) => n.finish(),
        }
    }
}
