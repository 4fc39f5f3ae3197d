//! Error types for port operations.

/// Failures talking to the generative backend.
///
/// `InvalidResponse` covers every protocol violation: a reply with no
/// choices or output, a mixed streaming/non-streaming reply, or a stream
/// that references tool calls it never opened.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }
}
