//! Value objects - Immutable objects defined by their attributes

mod audit;
mod character;
mod dice;
mod journal;

pub use audit::DiceAuditEntry;
pub use character::{
    AbilityScores, AbilityScoresDraft, CharacterDraft, CharacterValidationError, CreatedCharacter,
    MAX_ABILITY, MAX_LEVEL, MIN_ABILITY,
};
pub use dice::{
    DiceFormula, DiceParseError, DiceRollResult, MAX_DICE_COUNT, MAX_DIE_SIZE, MIN_DICE_COUNT,
    MIN_DIE_SIZE,
};
pub use journal::{HomebrewFlags, JournalSnapshot, PartyMemberSummary};
