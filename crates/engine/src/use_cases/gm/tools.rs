//! Local tool execution for GM tool calls.
//!
//! Tools never fail across this boundary: every problem becomes a JSON
//! error result that goes back to the model as the tool's output.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use taletable_domain::{CharacterDraft, CreatedCharacter, DiceAuditEntry, DiceFormula, DomainError};

use crate::infrastructure::ports::{RandomPort, ToolCall};

pub const ROLL_DICE: &str = "roll_dice";
pub const CREATE_CHARACTER: &str = "create_character";

/// What a successful tool call changed, beyond its JSON result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEffect {
    DiceRolled(DiceAuditEntry),
    CharacterCreated(CreatedCharacter),
}

/// Result of executing one tool call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    /// JSON handed back to the model
    pub result: Value,
    pub effect: Option<ToolEffect>,
}

impl ToolOutcome {
    pub fn is_error(&self) -> bool {
        self.result.get("success") == Some(&Value::Bool(false))
    }

    /// Tool-result message content
    pub fn content(&self) -> String {
        self.result.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct RollDiceArgs {
    expr: String,
    source: String,
    action: String,
    #[serde(default)]
    target: Option<String>,
}

/// Runs `roll_dice` and `create_character` against an injected random source.
pub struct ToolExecutor {
    random: Arc<dyn RandomPort>,
}

impl ToolExecutor {
    pub fn new(random: Arc<dyn RandomPort>) -> Self {
        Self { random }
    }

    pub fn execute(&self, call: &ToolCall) -> ToolOutcome {
        let outcome = match call.name.as_str() {
            ROLL_DICE => self.roll_dice(&call.arguments),
            CREATE_CHARACTER => create_character(&call.arguments),
            other => Err(format!("Unknown tool: {}", other)),
        };

        let (result, effect) = match outcome {
            Ok((result, effect)) => (result, Some(effect)),
            Err(message) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %message, "Tool call failed");
                (json!({ "success": false, "error": message }), None)
            }
        };

        ToolOutcome {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result,
            effect,
        }
    }

    fn roll_dice(&self, arguments: &str) -> Result<(Value, ToolEffect), String> {
        let args: RollDiceArgs = parse_arguments(arguments)?;
        let formula = DiceFormula::parse(&args.expr)
            .map_err(|e| DomainError::from(e).to_string())?;

        let roll = formula.roll_with(|faces| self.random.gen_range(1, faces as i32));
        let normalized_expr = formula.display();

        tracing::debug!(
            expr = %normalized_expr,
            total = roll.total,
            source = %args.source,
            action = %args.action,
            "Rolled dice"
        );

        let entry = DiceAuditEntry {
            source: args.source.trim().to_string(),
            action: args.action.trim().to_string(),
            target: args
                .target
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            total: roll.total,
            expr: normalized_expr.clone(),
        };

        let result = json!({
            "total": roll.total,
            "detail": roll.breakdown,
            "normalized_expr": normalized_expr,
        });
        Ok((result, ToolEffect::DiceRolled(entry)))
    }
}

fn create_character(arguments: &str) -> Result<(Value, ToolEffect), String> {
    let draft: CharacterDraft = parse_arguments(arguments)?;
    let character = draft
        .validate()
        .map_err(|e| DomainError::from(e).to_string())?;

    let result = json!({ "success": true, "character": character });
    Ok((result, ToolEffect::CharacterCreated(character)))
}

fn parse_arguments<T: for<'de> Deserialize<'de>>(arguments: &str) -> Result<T, String> {
    serde_json::from_str(arguments)
        .map_err(|e| DomainError::validation(format!("invalid tool arguments: {}", e)).to_string())
}
