//! Dice audit trail entries shown to the player under each GM reply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One executed dice roll, as recorded for the audit footer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceAuditEntry {
    /// Who rolled (e.g. "Goblin", "Mira")
    pub source: String,
    /// What the roll was for (e.g. "attack", "save vs poison")
    pub action: String,
    /// Optional target of the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    pub total: i64,
    /// Canonical dice expression that was rolled
    pub expr: String,
}

impl fmt::Display for DiceAuditEntry {
    /// `SOURCE ACTION[ TARGET]: TOTAL (EXPR)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.source, self.action)?;
        if let Some(target) = &self.target {
            write!(f, " {}", target)?;
        }
        write!(f, ": {} ({})", self.total, self.expr)
    }
}
