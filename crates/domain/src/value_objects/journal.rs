//! Campaign journal snapshot and house rules folded into GM instructions.
//!
//! The journal file format lives elsewhere; these are the plain values the
//! conversation engine receives from it.

use serde::{Deserialize, Serialize};

/// One party member as listed in the journal roster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyMemberSummary {
    pub name: String,
    pub class_name: String,
    pub level: u32,
    pub hp: i32,
    pub max_hp: i32,
}

/// Read-only view of the campaign journal for one GM turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalSnapshot {
    pub party: Vec<PartyMemberSummary>,
    /// Session log lines, oldest first
    pub session_log: Vec<String>,
    pub character_notes: Option<String>,
    pub inventory_notes: Option<String>,
    pub house_rules: Option<String>,
}

impl JournalSnapshot {
    /// The last `limit` session log lines, oldest first
    pub fn recent_log(&self, limit: usize) -> &[String] {
        let start = self.session_log.len().saturating_sub(limit);
        &self.session_log[start..]
    }

    pub fn is_empty(&self) -> bool {
        self.party.is_empty()
            && self.session_log.is_empty()
            && self.character_notes.is_none()
            && self.inventory_notes.is_none()
            && self.house_rules.is_none()
    }
}

/// Optional house rules, each adding a fixed paragraph to the instructions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomebrewFlags {
    /// Ability scores are generated with 4d6, dropping the lowest die
    pub ability_scores_4d6_drop_lowest: bool,
    /// First-level characters start with maximum hit points
    pub max_hp_at_first_level: bool,
    /// Armor class counts up (higher is better) instead of down
    pub ascending_armor_class: bool,
}

impl HomebrewFlags {
    /// Rule text for every enabled flag, in a fixed order
    pub fn rule_texts(&self) -> Vec<&'static str> {
        let mut rules = Vec::new();
        if self.ability_scores_4d6_drop_lowest {
            rules.push(
                "Ability scores are generated by rolling 4d6 and dropping the lowest die \
                 (use the expression 4d6L).",
            );
        }
        if self.max_hp_at_first_level {
            rules.push("Characters start at first level with maximum hit points for their class.");
        }
        if self.ascending_armor_class {
            rules.push(
                "Armor class is ascending: unarmored is AC 10 and higher values are harder to hit. \
                 Attack rolls are 1d20 plus bonuses against the target's AC.",
            );
        }
        rules
    }
}
