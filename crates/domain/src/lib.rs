//! TaleTable domain: dice, characters and journal values shared by the GM
//! engine. No I/O and no RNG; randomness is injected by the caller.

pub mod error;
pub mod value_objects;

pub use error::DomainError;

pub use value_objects::{
    AbilityScores, AbilityScoresDraft, CharacterDraft, CharacterValidationError, CreatedCharacter,
    DiceAuditEntry, DiceFormula, DiceParseError, DiceRollResult, HomebrewFlags, JournalSnapshot,
    PartyMemberSummary,
};
