//! Append-only conversation transcript for one GM reply.

use crate::infrastructure::ports::{ChatMessage, MessageRole};

/// Ordered role-tagged messages. Never reordered or pruned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    messages: Vec<ChatMessage>,
}

impl ConversationState {
    /// System instructions, then prior history, then the new player message.
    ///
    /// System messages in `history` are dropped; instructions are rebuilt
    /// for every reply.
    pub fn seeded(system_instructions: String, history: &[ChatMessage], user_message: &str) -> Self {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_instructions));
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );
        messages.push(ChatMessage::user(user_message));
        Self { messages }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Append one finished round (assistant turn plus its tool results).
    pub fn append_round(&mut self, round: Vec<ChatMessage>) {
        self.messages.extend(round);
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}
