//! Dice audit trail: a formatting view over rolls already executed.

use taletable_domain::{CreatedCharacter, DiceAuditEntry};

use super::tools::{ToolEffect, ToolOutcome};

/// Dice entries in execution order, skipping everything but `roll_dice`.
pub fn dice_audit(outcomes: &[ToolOutcome]) -> Vec<DiceAuditEntry> {
    outcomes
        .iter()
        .filter_map(|o| match &o.effect {
            Some(ToolEffect::DiceRolled(entry)) => Some(entry.clone()),
            _ => None,
        })
        .collect()
}

pub fn created_characters(outcomes: &[ToolOutcome]) -> Vec<CreatedCharacter> {
    outcomes
        .iter()
        .filter_map(|o| match &o.effect {
            Some(ToolEffect::CharacterCreated(character)) => Some(character.clone()),
            _ => None,
        })
        .collect()
}

/// One `SOURCE ACTION[ TARGET]: TOTAL (EXPR)` line per entry
pub fn audit_lines(entries: &[DiceAuditEntry]) -> Vec<String> {
    entries.iter().map(ToString::to_string).collect()
}
