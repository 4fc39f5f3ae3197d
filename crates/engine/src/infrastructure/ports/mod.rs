//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - LLM calls (could swap OpenAI -> any compatible gateway)
//! - Random (for testing)

mod error;
mod external;
mod testing;

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    ChatMessage, LlmPort, LlmRequest, MessageRole, TokenUsage, ToolCall, ToolDefinition,
    TurnEvent, TurnEventStream,
};

#[cfg(test)]
pub use external::MockLlmPort;

// =============================================================================
// Testing Ports
// =============================================================================
pub use testing::RandomPort;

#[cfg(test)]
pub use testing::MockRandomPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::LlmError;
