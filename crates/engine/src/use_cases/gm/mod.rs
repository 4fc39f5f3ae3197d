//! GM conversation use case.
//!
//! One player message becomes one GM reply. Each round sends the transcript
//! to the backend, folds the reply into a finished turn, runs any requested
//! tools in order and feeds their results back, until the model answers
//! without tools or the round ceiling is reached.

pub mod aggregator;
pub mod audit;
pub mod prompt;
pub mod tool_builder;
pub mod tools;
pub mod transcript;


use std::sync::Arc;

use taletable_domain::{CreatedCharacter, DiceAuditEntry};
use tracing::Instrument;

use crate::infrastructure::config::GmConfig;
use crate::infrastructure::ports::{
    ChatMessage, LlmError, LlmPort, LlmRequest, MessageRole, RandomPort, TokenUsage, TurnEvent,
};
use aggregator::collect_turn;
use prompt::{build_system_instructions, GmContext, PromptLimits};
use tool_builder::build_gm_tool_definitions;
use tools::{ToolExecutor, ToolOutcome};
use transcript::ConversationState;

/// Reply text when the ceiling is hit before the model said anything.
pub const ROUND_LIMIT_PLACEHOLDER: &str =
    "The GM pauses to consult their notes. (The reply was cut short; please continue.)";

/// The finished GM reply.
#[derive(Debug, Clone)]
pub struct GmResponse {
    /// Narrative from every round, joined by blank lines
    pub text: String,
    pub dice_audit: Vec<DiceAuditEntry>,
    pub created_characters: Vec<CreatedCharacter>,
    /// System instructions, prior history, the player message and every round
    pub full_transcript: Vec<ChatMessage>,
    /// Summed across rounds
    pub usage: TokenUsage,
    pub rounds: u32,
    pub hit_round_limit: bool,
}

impl GmResponse {
    /// Audit footer, one line per roll
    pub fn audit_lines(&self) -> Vec<String> {
        audit::audit_lines(&self.dice_audit)
    }

    /// Transcript without the system instructions, to pass as history next time
    pub fn history(&self) -> Vec<ChatMessage> {
        self.full_transcript
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .cloned()
            .collect()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GmError {
    #[error("GM backend error: {0}")]
    Llm(#[from] LlmError),
}

/// Run one GM reply use case.
///
/// Holds no per-conversation state; concurrent replies share nothing but
/// the ports.
pub struct RunGmTurn {
    llm: Arc<dyn LlmPort>,
    random: Arc<dyn RandomPort>,
    tools: ToolExecutor,
    config: GmConfig,
}

impl RunGmTurn {
    pub fn new(llm: Arc<dyn LlmPort>, random: Arc<dyn RandomPort>, config: GmConfig) -> Self {
        Self {
            llm,
            tools: ToolExecutor::new(random.clone()),
            random,
            config,
        }
    }

    pub async fn execute(
        &self,
        context: &GmContext,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Result<GmResponse, GmError> {
        self.execute_with_observer(context, history, user_message, |_| {})
            .await
    }

    /// Same as [`execute`](Self::execute), showing every normalized event to
    /// `observer` as it is folded.
    ///
    /// `history` is never modified. If a round fails, nothing from the
    /// reply is kept and the caller can retry with the same inputs.
    pub async fn execute_with_observer<F>(
        &self,
        context: &GmContext,
        history: &[ChatMessage],
        user_message: &str,
        mut observer: F,
    ) -> Result<GmResponse, GmError>
    where
        F: FnMut(&TurnEvent),
    {
        let session = self.random.gen_uuid();
        let span = tracing::info_span!("gm_turn", session = %session);
        self.run_rounds(context, history, user_message, &mut observer)
            .instrument(span)
            .await
    }

    async fn run_rounds<F>(
        &self,
        context: &GmContext,
        history: &[ChatMessage],
        user_message: &str,
        observer: &mut F,
    ) -> Result<GmResponse, GmError>
    where
        F: FnMut(&TurnEvent),
    {
        let instructions = build_system_instructions(
            context,
            PromptLimits {
                context_char_limit: self.config.context_char_limit,
                session_log_entries: self.config.session_log_entries,
            },
        );
        let mut state = ConversationState::seeded(instructions, history, user_message);
        let tool_definitions = build_gm_tool_definitions();

        let mut texts: Vec<String> = Vec::new();
        let mut outcomes: Vec<ToolOutcome> = Vec::new();
        let mut usage = TokenUsage::default();
        let mut rounds = 0u32;
        let mut hit_round_limit = false;

        loop {
            if rounds >= self.config.max_rounds {
                hit_round_limit = true;
                tracing::warn!(rounds, "GM round ceiling reached");
                break;
            }
            rounds += 1;

            let request = LlmRequest::new(state.messages().to_vec())
                .with_tools(tool_definitions.clone())
                .with_temperature(self.config.temperature)
                .with_max_tokens(self.config.max_output_tokens);

            tracing::info!(round = rounds, messages = state.len(), "Requesting GM turn");
            let turn = match self.start_and_collect(request, observer).await {
                Ok(turn) => turn,
                Err(e) => {
                    tracing::error!(round = rounds, error = %e, "GM round failed");
                    return Err(e.into());
                }
            };

            if let Some(turn_usage) = turn.usage {
                usage.add(turn_usage);
            }
            let narrative = turn.text.trim();
            if !narrative.is_empty() {
                texts.push(narrative.to_string());
            }

            if turn.tool_calls.is_empty() {
                state.append_round(vec![ChatMessage::assistant(turn.text)]);
                break;
            }

            let mut round_messages = Vec::with_capacity(turn.tool_calls.len() + 1);
            round_messages.push(ChatMessage::assistant_with_tool_calls(
                turn.text.clone(),
                turn.tool_calls.clone(),
            ));
            for call in &turn.tool_calls {
                tracing::debug!(round = rounds, tool = %call.name, call_id = %call.id, "Executing tool call");
                let outcome = self.tools.execute(call);
                round_messages.push(ChatMessage::tool_result(
                    outcome.call_id.clone(),
                    outcome.content(),
                ));
                outcomes.push(outcome);
            }
            state.append_round(round_messages);
        }

        let text = if texts.is_empty() && hit_round_limit {
            ROUND_LIMIT_PLACEHOLDER.to_string()
        } else {
            texts.join("\n\n")
        };

        let dice_audit = audit::dice_audit(&outcomes);
        let created_characters = audit::created_characters(&outcomes);
        tracing::info!(
            rounds,
            hit_round_limit,
            rolls = dice_audit.len(),
            characters = created_characters.len(),
            total_tokens = usage.total_tokens,
            "GM reply finished"
        );

        Ok(GmResponse {
            text,
            dice_audit,
            created_characters,
            full_transcript: state.into_messages(),
            usage,
            rounds,
            hit_round_limit,
        })
    }

    async fn start_and_collect<F>(
        &self,
        request: LlmRequest,
        observer: &mut F,
    ) -> Result<aggregator::TurnResult, LlmError>
    where
        F: FnMut(&TurnEvent),
    {
        let events = self.llm.start_turn(request).await?;
        collect_turn(events, observer).await
    }
}
