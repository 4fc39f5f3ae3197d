//! Tool definition builder for LLM function calling.
//!
//! The GM may only resolve randomness or create characters through these
//! tools; both run locally and their results are fed back to the model.

use serde_json::json;

use super::tools::{CREATE_CHARACTER, ROLL_DICE};
use crate::infrastructure::ports::ToolDefinition;

/// Build all GM tool definitions for LLM function calling.
pub fn build_gm_tool_definitions() -> Vec<ToolDefinition> {
    vec![build_roll_dice_tool(), build_create_character_tool()]
}

fn build_roll_dice_tool() -> ToolDefinition {
    ToolDefinition {
        name: ROLL_DICE.to_string(),
        description: "Roll dice for any uncertain outcome: attacks, damage, saves, checks, morale, random encounters. Never invent a result; always call this tool.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "expr": {
                    "type": "string",
                    "description": "Dice expression NdM with optional +K/-K modifier and optional trailing L to drop the lowest die, e.g. 1d20+4, 2d6-1, 4d6L"
                },
                "source": {
                    "type": "string",
                    "description": "Who is rolling (character or monster name)"
                },
                "action": {
                    "type": "string",
                    "description": "What the roll is for, e.g. attack, damage, save vs poison"
                },
                "target": {
                    "type": "string",
                    "description": "Who or what the action targets, if anyone"
                }
            },
            "required": ["expr", "source", "action"]
        }),
    }
}

fn build_create_character_tool() -> ToolDefinition {
    let score = json!({"type": "integer", "minimum": 1, "maximum": 25});
    ToolDefinition {
        name: CREATE_CHARACTER.to_string(),
        description: "Record a newly created player character once its stats are settled. Roll ability scores and hit points with roll_dice first.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "class": {"type": "string"},
                "level": {"type": "integer", "minimum": 1},
                "hp": {"type": "integer", "minimum": 0},
                "max_hp": {"type": "integer", "minimum": 1},
                "abilities": {
                    "type": "object",
                    "properties": {
                        "str": score,
                        "int": score,
                        "wis": score,
                        "dex": score,
                        "con": score,
                        "cha": score
                    },
                    "required": ["str", "int", "wis", "dex", "con", "cha"]
                },
                "ac": {"type": "integer", "description": "Armor class"},
                "thac0": {"type": ["integer", "null"], "description": "To-hit value, if the game uses one"},
                "xp": {"type": ["integer", "null"], "minimum": 0},
                "inventory": {"type": ["array", "null"], "items": {"type": "string"}}
            },
            "required": ["name", "class", "level", "hp", "max_hp", "abilities", "ac"]
        }),
    }
}
