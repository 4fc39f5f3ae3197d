//! Dice rolling value objects and parsing
//!
//! Supports dice formulas like "1d20+5", "2d6-1", "4d6L" (drop the lowest die).
//! Randomness is injected by the caller as a `draw(faces)` closure so that
//! evaluation stays a pure function of the drawn values.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Smallest and largest number of dice a single formula may roll.
pub const MIN_DICE_COUNT: u32 = 1;
pub const MAX_DICE_COUNT: u32 = 100;

/// Smallest and largest die size a single formula may use.
pub const MIN_DIE_SIZE: u32 = 2;
pub const MAX_DIE_SIZE: u32 = 1000;

/// Error when parsing a dice formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    /// The formula string is empty
    #[error("Empty dice formula")]
    Empty,
    /// Invalid format - expected NdM, NdM+K, NdM-K, optionally followed by L
    #[error("Invalid dice format: {0}")]
    InvalidFormat(String),
    /// Dice count outside 1..=100
    #[error("Dice count must be between 1 and 100, got {0}")]
    DiceCountOutOfRange(u64),
    /// Die size outside 2..=1000
    #[error("Die size must be between 2 and 1000, got {0}")]
    DieSizeOutOfRange(u64),
    /// Modifier does not fit in an i32
    #[error("Modifier value overflow")]
    ModifierOverflow,
}

/// A parsed dice formula like "2d6+3" or "4d6L"
///
/// `source` records the text the formula was parsed from. It is provenance
/// only and does not take part in equality.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceFormula {
    /// Number of dice to roll (N in NdM)
    pub dice_count: u32,
    /// Size of each die (M in NdM)
    pub die_size: u32,
    /// Modifier to add/subtract after rolling (+K or -K)
    pub modifier: i32,
    /// Drop the single lowest die before summing
    pub drop_lowest: bool,
    /// The expression this formula was parsed from
    pub source: String,
}

impl PartialEq for DiceFormula {
    fn eq(&self, other: &Self) -> bool {
        self.dice_count == other.dice_count
            && self.die_size == other.die_size
            && self.modifier == other.modifier
            && self.drop_lowest == other.drop_lowest
    }
}

impl DiceFormula {
    /// Create a new dice formula, enforcing the count and size bounds
    pub fn new(
        dice_count: u32,
        die_size: u32,
        modifier: i32,
        drop_lowest: bool,
    ) -> Result<Self, DiceParseError> {
        if !(MIN_DICE_COUNT..=MAX_DICE_COUNT).contains(&dice_count) {
            return Err(DiceParseError::DiceCountOutOfRange(u64::from(dice_count)));
        }
        if !(MIN_DIE_SIZE..=MAX_DIE_SIZE).contains(&die_size) {
            return Err(DiceParseError::DieSizeOutOfRange(u64::from(die_size)));
        }
        let mut formula = Self {
            dice_count,
            die_size,
            modifier,
            drop_lowest,
            source: String::new(),
        };
        formula.source = formula.display();
        Ok(formula)
    }

    /// Parse a dice formula string like "1d20+5", "2d6-1", "4d6L"
    ///
    /// Supported formats (case-insensitive, surrounding whitespace ignored):
    /// - "NdM" - Roll N dice of size M
    /// - "NdM+K" / "NdM-K" - Roll N dice of size M, add or subtract K
    /// - any of the above followed by "L" - drop the lowest die first
    ///
    /// Parsing is strict: anything else is rejected rather than guessed at.
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let source = input.trim();
        if source.is_empty() {
            return Err(DiceParseError::Empty);
        }
        let lowered = source.to_ascii_lowercase();

        let (body, drop_lowest) = match lowered.strip_suffix('l') {
            Some(rest) => (rest, true),
            None => (lowered.as_str(), false),
        };

        let d_pos = body.find('d').ok_or_else(|| {
            DiceParseError::InvalidFormat(format!("Missing 'd' separator in '{}'", source))
        })?;

        let count_str = &body[..d_pos];
        let dice_count = parse_unsigned(count_str).ok_or_else(|| {
            DiceParseError::InvalidFormat(format!("Invalid dice count: '{}'", count_str))
        })?;

        let after_d = &body[d_pos + 1..];
        let (size_str, modifier) = match after_d.find(['+', '-']) {
            Some(sign_pos) => {
                let (size_str, signed) = after_d.split_at(sign_pos);
                let magnitude_str = &signed[1..];
                let magnitude = parse_unsigned(magnitude_str).ok_or_else(|| {
                    DiceParseError::InvalidFormat(format!("Invalid modifier: '{}'", signed))
                })?;
                let magnitude =
                    i64::try_from(magnitude).map_err(|_| DiceParseError::ModifierOverflow)?;
                let value = if signed.starts_with('-') {
                    -magnitude
                } else {
                    magnitude
                };
                let modifier =
                    i32::try_from(value).map_err(|_| DiceParseError::ModifierOverflow)?;
                (size_str, modifier)
            }
            None => (after_d, 0),
        };

        let die_size = parse_unsigned(size_str).ok_or_else(|| {
            DiceParseError::InvalidFormat(format!("Invalid die size: '{}'", size_str))
        })?;

        if !(u64::from(MIN_DICE_COUNT)..=u64::from(MAX_DICE_COUNT)).contains(&dice_count) {
            return Err(DiceParseError::DiceCountOutOfRange(dice_count));
        }
        if !(u64::from(MIN_DIE_SIZE)..=u64::from(MAX_DIE_SIZE)).contains(&die_size) {
            return Err(DiceParseError::DieSizeOutOfRange(die_size));
        }

        Ok(Self {
            // Bounds checked above, both fit in u32.
            dice_count: dice_count as u32,
            die_size: die_size as u32,
            modifier,
            drop_lowest,
            source: source.to_string(),
        })
    }

    /// Whether rolling this formula actually discards a die
    pub fn drops_a_die(&self) -> bool {
        self.drop_lowest && self.dice_count > 1
    }

    /// Number of dice that contribute to the total
    pub fn kept_count(&self) -> u32 {
        if self.drops_a_die() {
            self.dice_count - 1
        } else {
            self.dice_count
        }
    }

    /// Get the minimum possible roll
    pub fn min_roll(&self) -> i64 {
        i64::from(self.kept_count()) + i64::from(self.modifier)
    }

    /// Get the maximum possible roll
    pub fn max_roll(&self) -> i64 {
        i64::from(self.kept_count()) * i64::from(self.die_size) + i64::from(self.modifier)
    }

    /// Roll the formula, asking `draw` for each die.
    ///
    /// `draw(faces)` must return a value in `1..=faces`. When a drop applies,
    /// the first occurrence of the lowest value is discarded.
    pub fn roll_with<F>(&self, mut draw: F) -> DiceRollResult
    where
        F: FnMut(u32) -> i32,
    {
        let individual_rolls: Vec<i32> = (0..self.dice_count)
            .map(|_| draw(self.die_size))
            .collect();

        let mut kept_rolls = individual_rolls.clone();
        let mut dropped = None;
        if self.drops_a_die() {
            let lowest = kept_rolls
                .iter()
                .enumerate()
                .min_by_key(|(index, value)| (**value, *index))
                .map(|(index, _)| index);
            if let Some(index) = lowest {
                dropped = Some(kept_rolls.remove(index));
            }
        }

        let dice_total: i64 = kept_rolls.iter().map(|r| i64::from(*r)).sum();
        let total = dice_total + i64::from(self.modifier);

        let mut result = DiceRollResult {
            formula: self.clone(),
            individual_rolls,
            kept_rolls,
            dropped,
            dice_total,
            modifier_applied: self.modifier,
            total,
            breakdown: String::new(),
        };
        result.breakdown = result.render_breakdown();
        result
    }

    /// Format as the canonical string (e.g., "1d20+5", "4d6L")
    pub fn display(&self) -> String {
        let drop = if self.drop_lowest { "L" } else { "" };
        if self.modifier == 0 {
            format!("{}d{}{}", self.dice_count, self.die_size, drop)
        } else {
            format!(
                "{}d{}{:+}{}",
                self.dice_count, self.die_size, self.modifier, drop
            )
        }
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// ASCII digits only; no sign, no whitespace.
fn parse_unsigned(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Saturate absurdly long digit strings so they still report as out of range.
    Some(text.parse::<u64>().unwrap_or(u64::MAX))
}

/// Result of rolling dice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiceRollResult {
    /// The formula that was rolled
    pub formula: DiceFormula,
    /// Every die drawn, in draw order
    pub individual_rolls: Vec<i32>,
    /// The dice that count towards the total
    pub kept_rolls: Vec<i32>,
    /// The die removed by a drop-lowest formula
    pub dropped: Option<i32>,
    /// Sum of kept dice before modifier
    pub dice_total: i64,
    /// Modifier that was applied
    pub modifier_applied: i32,
    /// Final total (dice_total + modifier), never clamped
    pub total: i64,
    /// Human-readable breakdown, fixed at roll time
    pub breakdown: String,
}

impl DiceRollResult {
    /// Format as a breakdown string, e.g. "1d20+4 [13] +4 = 17" or
    /// "4d6L [6, 2, 5, 3] drop 2 -> [6, 5, 3] +0 = 14"
    fn render_breakdown(&self) -> String {
        let rolls = join_rolls(&self.individual_rolls);
        let kept = match self.dropped {
            Some(dropped) => format!(" drop {} -> [{}]", dropped, join_rolls(&self.kept_rolls)),
            None => String::new(),
        };
        format!(
            "{} [{}]{} {:+} = {}",
            self.formula.display(),
            rolls,
            kept,
            self.modifier_applied,
            self.total
        )
    }

    /// Check if this is a natural 20 (for d20 systems)
    pub fn is_natural_20(&self) -> bool {
        self.formula.die_size == 20
            && self.formula.dice_count == 1
            && self.individual_rolls.first() == Some(&20)
    }

    /// Check if this is a natural 1 (for d20 systems)
    pub fn is_natural_1(&self) -> bool {
        self.formula.die_size == 20
            && self.formula.dice_count == 1
            && self.individual_rolls.first() == Some(&1)
    }
}

fn join_rolls(rolls: &[i32]) -> String {
    rolls
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Draw closure that replays a fixed sequence.
    fn scripted(values: &[i32]) -> impl FnMut(u32) -> i32 + '_ {
        let mut iter = values.iter();
        move |_faces| *iter.next().expect("script ran out of draws")
    }

    #[test]
    fn test_parse_simple_d20() {
        let formula = DiceFormula::parse("1d20").unwrap();
        assert_eq!(formula.dice_count, 1);
        assert_eq!(formula.die_size, 20);
        assert_eq!(formula.modifier, 0);
        assert!(!formula.drop_lowest);
    }

    #[test]
    fn test_parse_with_positive_modifier() {
        let formula = DiceFormula::parse("1d20+4").unwrap();
        assert_eq!(formula, DiceFormula::new(1, 20, 4, false).unwrap());
        assert_eq!(formula.source, "1d20+4");
    }

    #[test]
    fn test_parse_with_negative_modifier() {
        let formula = DiceFormula::parse("1d8-1").unwrap();
        assert_eq!(formula.modifier, -1);
    }

    #[test]
    fn test_parse_drop_lowest() {
        let formula = DiceFormula::parse("4d6L").unwrap();
        assert_eq!(formula.dice_count, 4);
        assert_eq!(formula.die_size, 6);
        assert!(formula.drop_lowest);

        let formula = DiceFormula::parse("3d6+2L").unwrap();
        assert_eq!(formula.modifier, 2);
        assert!(formula.drop_lowest);
    }

    #[test]
    fn test_parse_case_insensitive_and_trimmed() {
        let formula = DiceFormula::parse("  2D6+3  ").unwrap();
        assert_eq!(formula, DiceFormula::new(2, 6, 3, false).unwrap());
        assert_eq!(formula.source, "2D6+3");
        assert!(DiceFormula::parse("4d6l").unwrap().drop_lowest);
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(DiceFormula::parse("   "), Err(DiceParseError::Empty));
    }

    #[test]
    fn test_parse_malformed() {
        for input in ["20", "d20", "2d", "2x6", "1d20+", "1d20+-3", "1 d20", "1d20 + 4", "1d20LL", "not-dice"] {
            assert!(
                matches!(DiceFormula::parse(input), Err(DiceParseError::InvalidFormat(_))),
                "expected InvalidFormat for {input:?}"
            );
        }
    }

    #[test]
    fn test_parse_count_out_of_range() {
        assert_eq!(
            DiceFormula::parse("0d6"),
            Err(DiceParseError::DiceCountOutOfRange(0))
        );
        assert_eq!(
            DiceFormula::parse("101d6"),
            Err(DiceParseError::DiceCountOutOfRange(101))
        );
        assert!(DiceFormula::parse("100d6").is_ok());
    }

    #[test]
    fn test_parse_faces_out_of_range() {
        assert_eq!(
            DiceFormula::parse("1d1"),
            Err(DiceParseError::DieSizeOutOfRange(1))
        );
        assert_eq!(
            DiceFormula::parse("1d1001"),
            Err(DiceParseError::DieSizeOutOfRange(1001))
        );
        assert!(DiceFormula::parse("1d1000").is_ok());
        assert!(DiceFormula::parse("1d2").is_ok());
    }

    #[test]
    fn test_parse_modifier_overflow() {
        assert_eq!(
            DiceFormula::parse("1d20+99999999999"),
            Err(DiceParseError::ModifierOverflow)
        );
    }

    #[test]
    fn test_canonical_round_trip() {
        for count in [1, 2, 7, 100] {
            for faces in [2, 6, 20, 1000] {
                for modifier in [-12, -1, 0, 3, 250] {
                    for drop_lowest in [false, true] {
                        let formula = DiceFormula::new(count, faces, modifier, drop_lowest).unwrap();
                        let reparsed = DiceFormula::parse(&formula.to_string()).unwrap();
                        assert_eq!(reparsed, formula);
                    }
                }
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(DiceFormula::new(1, 20, 0, false).unwrap().display(), "1d20");
        assert_eq!(DiceFormula::new(1, 20, 5, false).unwrap().display(), "1d20+5");
        assert_eq!(DiceFormula::new(1, 20, -3, false).unwrap().display(), "1d20-3");
        assert_eq!(DiceFormula::new(4, 6, 0, true).unwrap().display(), "4d6L");
        assert_eq!(DiceFormula::new(3, 6, 2, true).unwrap().display(), "3d6+2L");
    }

    #[test]
    fn test_new_enforces_bounds() {
        assert!(DiceFormula::new(0, 6, 0, false).is_err());
        assert!(DiceFormula::new(1, 1001, 0, false).is_err());
    }

    #[test]
    fn test_roll_single_die_with_modifier() {
        let formula = DiceFormula::parse("1d20+4").unwrap();
        let result = formula.roll_with(scripted(&[13]));
        assert_eq!(result.total, 17);
        assert_eq!(result.individual_rolls, vec![13]);
        assert!(result.breakdown.contains("13"));
        assert!(result.breakdown.contains("+4"));
        assert_eq!(result.breakdown, "1d20+4 [13] +4 = 17");
    }

    #[test]
    fn test_roll_drop_lowest() {
        let formula = DiceFormula::parse("4d6L").unwrap();
        let result = formula.roll_with(scripted(&[6, 2, 5, 3]));
        assert_eq!(result.dropped, Some(2));
        assert_eq!(result.kept_rolls, vec![6, 5, 3]);
        assert_eq!(result.individual_rolls, vec![6, 2, 5, 3]);
        assert_eq!(result.total, 14);
        assert_eq!(result.breakdown, "4d6L [6, 2, 5, 3] drop 2 -> [6, 5, 3] +0 = 14");
    }

    #[test]
    fn test_drop_lowest_removes_first_of_tied_minimum() {
        let formula = DiceFormula::parse("4d6L").unwrap();
        let result = formula.roll_with(scripted(&[4, 1, 6, 1]));
        assert_eq!(result.dropped, Some(1));
        assert_eq!(result.kept_rolls, vec![4, 6, 1]);
        assert_eq!(result.total, 11);
    }

    #[test]
    fn test_drop_lowest_on_single_die_is_noop() {
        let formula = DiceFormula::parse("1d20L").unwrap();
        let result = formula.roll_with(scripted(&[7]));
        assert_eq!(result.dropped, None);
        assert_eq!(result.total, 7);
    }

    #[test]
    fn test_negative_total_is_not_clamped() {
        let formula = DiceFormula::parse("1d4-10").unwrap();
        let result = formula.roll_with(scripted(&[2]));
        assert_eq!(result.total, -8);
        assert!(result.breakdown.contains("-10"));
    }

    #[test]
    fn test_roll_is_deterministic_for_fixed_draws() {
        let formula = DiceFormula::parse("3d8+1").unwrap();
        let first = formula.roll_with(scripted(&[3, 8, 1]));
        let second = formula.roll_with(scripted(&[3, 8, 1]));
        assert_eq!(first, second);
    }

    #[test]
    fn test_roll_range_bounds() {
        let formula = DiceFormula::parse("3d6+2").unwrap();
        assert_eq!(formula.roll_with(|_| 1).total, formula.min_roll());
        assert_eq!(formula.roll_with(|faces| faces as i32).total, formula.max_roll());

        let dropped = DiceFormula::parse("4d6-1L").unwrap();
        assert_eq!(dropped.min_roll(), 2);
        assert_eq!(dropped.max_roll(), 17);
        assert_eq!(dropped.roll_with(|_| 1).total, dropped.min_roll());
        assert_eq!(dropped.roll_with(|faces| faces as i32).total, dropped.max_roll());
    }

    #[test]
    fn test_drop_marker_must_follow_modifier() {
        assert!(matches!(
            DiceFormula::parse("4d6L-1"),
            Err(DiceParseError::InvalidFormat(_))
        ));
        assert_eq!(DiceFormula::parse("4d6-1L").unwrap().display(), "4d6-1L");
    }

    #[test]
    fn test_draw_receives_die_size() {
        let formula = DiceFormula::parse("2d12").unwrap();
        let mut seen = Vec::new();
        formula.roll_with(|faces| {
            seen.push(faces);
            1
        });
        assert_eq!(seen, vec![12, 12]);
    }

    #[test]
    fn test_natural_20_and_1() {
        let formula = DiceFormula::parse("1d20").unwrap();
        assert!(formula.roll_with(scripted(&[20])).is_natural_20());
        assert!(formula.roll_with(scripted(&[1])).is_natural_1());
        assert!(!formula.roll_with(scripted(&[10])).is_natural_20());
    }
}
