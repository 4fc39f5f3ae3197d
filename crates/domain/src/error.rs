//! Unified error type for the domain layer
//!
//! Wraps the value-object errors so callers that handle both dice and
//! character input can use a single type.

use thiserror::Error;

use crate::value_objects::{CharacterValidationError, DiceParseError};

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Dice expression did not parse or was out of range
    #[error("Invalid dice expression: {0}")]
    Dice(#[from] DiceParseError),

    /// Character fields were missing or out of range
    #[error("Invalid character: {0}")]
    Character(#[from] CharacterValidationError),

    /// Tool arguments could not be read at all
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::DiceFormula;

    #[test]
    fn test_dice_error_converts() {
        let err: DomainError = DiceFormula::parse("banana").unwrap_err().into();
        assert!(matches!(err, DomainError::Dice(_)));
        assert!(err.to_string().starts_with("Invalid dice expression"));
    }

    #[test]
    fn test_validation_helper() {
        let err = DomainError::validation("expected an object");
        assert_eq!(err.to_string(), "Validation failed: expected an object");
    }
}
