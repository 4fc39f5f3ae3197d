//! Characters created by the GM through tool calls.
//!
//! The model proposes a [`CharacterDraft`] with loosely-typed optional
//! fields; [`CharacterDraft::validate`] turns it into a [`CreatedCharacter`]
//! or reports exactly which field is wrong.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_LEVEL: i64 = 36;
pub const MIN_ABILITY: i64 = 1;
pub const MAX_ABILITY: i64 = 25;

/// Why a character draft was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CharacterValidationError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),
    #[error("Field '{0}' must not be empty")]
    EmptyField(&'static str),
    #[error("Field '{field}' must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// The six classic ability scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    #[serde(rename = "str")]
    pub strength: i32,
    #[serde(rename = "int")]
    pub intelligence: i32,
    #[serde(rename = "wis")]
    pub wisdom: i32,
    #[serde(rename = "dex")]
    pub dexterity: i32,
    #[serde(rename = "con")]
    pub constitution: i32,
    #[serde(rename = "cha")]
    pub charisma: i32,
}

/// A validated character, ready to hand to the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedCharacter {
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub level: u32,
    pub hp: i32,
    pub max_hp: i32,
    pub abilities: AbilityScores,
    pub ac: i32,
    /// Absent when the game does not use THAC0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thac0: Option<i32>,
    pub xp: u64,
    pub inventory: Vec<String>,
}

/// Ability scores as proposed by the model; every score is required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AbilityScoresDraft {
    #[serde(rename = "str")]
    pub strength: Option<i64>,
    #[serde(rename = "int")]
    pub intelligence: Option<i64>,
    #[serde(rename = "wis")]
    pub wisdom: Option<i64>,
    #[serde(rename = "dex")]
    pub dexterity: Option<i64>,
    #[serde(rename = "con")]
    pub constitution: Option<i64>,
    #[serde(rename = "cha")]
    pub charisma: Option<i64>,
}

/// Character fields exactly as the model sent them
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CharacterDraft {
    pub name: Option<String>,
    #[serde(rename = "class")]
    pub class_name: Option<String>,
    pub level: Option<i64>,
    pub hp: Option<i64>,
    pub max_hp: Option<i64>,
    pub abilities: Option<AbilityScoresDraft>,
    pub ac: Option<i64>,
    pub thac0: Option<i64>,
    pub xp: Option<i64>,
    pub inventory: Option<Vec<String>>,
}

impl CharacterDraft {
    /// Check required fields and ranges, normalizing the nullable ones
    /// (`inventory` -> empty, `xp` -> 0, `thac0` stays absent).
    pub fn validate(self) -> Result<CreatedCharacter, CharacterValidationError> {
        let name = required_text(self.name, "name")?;
        let class_name = required_text(self.class_name, "class")?;
        let level = ranged(self.level, "level", 1, MAX_LEVEL)?;
        let max_hp = ranged(self.max_hp, "max_hp", 1, i64::from(i32::MAX))?;
        let hp = ranged(self.hp, "hp", 0, max_hp)?;

        let abilities = self
            .abilities
            .ok_or(CharacterValidationError::MissingField("abilities"))?;
        let abilities = AbilityScores {
            strength: ability(abilities.strength, "abilities.str")?,
            intelligence: ability(abilities.intelligence, "abilities.int")?,
            wisdom: ability(abilities.wisdom, "abilities.wis")?,
            dexterity: ability(abilities.dexterity, "abilities.dex")?,
            constitution: ability(abilities.constitution, "abilities.con")?,
            charisma: ability(abilities.charisma, "abilities.cha")?,
        };

        let ac = ranged(self.ac, "ac", -20, 40)?;
        let thac0 = match self.thac0 {
            Some(value) => Some(ranged(Some(value), "thac0", 1, 30)? as i32),
            None => None,
        };
        let xp = match self.xp {
            Some(value) => ranged(Some(value), "xp", 0, i64::MAX)? as u64,
            None => 0,
        };

        let inventory = self
            .inventory
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();

        Ok(CreatedCharacter {
            name,
            class_name,
            level: level as u32,
            hp: hp as i32,
            max_hp: max_hp as i32,
            abilities,
            ac: ac as i32,
            thac0,
            xp,
            inventory,
        })
    }
}

fn required_text(
    value: Option<String>,
    field: &'static str,
) -> Result<String, CharacterValidationError> {
    let value = value.ok_or(CharacterValidationError::MissingField(field))?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CharacterValidationError::EmptyField(field));
    }
    Ok(trimmed.to_string())
}

fn ranged(
    value: Option<i64>,
    field: &'static str,
    min: i64,
    max: i64,
) -> Result<i64, CharacterValidationError> {
    let value = value.ok_or(CharacterValidationError::MissingField(field))?;
    if value < min || value > max {
        return Err(CharacterValidationError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(value)
}

fn ability(value: Option<i64>, field: &'static str) -> Result<i32, CharacterValidationError> {
    ranged(value, field, MIN_ABILITY, MAX_ABILITY).map(|v| v as i32)
}
