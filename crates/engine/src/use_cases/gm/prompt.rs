//! System instructions for the GM.
//!
//! Rules and module text arrive already extracted; they are cut to a
//! bounded prefix here so a large rulebook cannot blow up the prompt.

use taletable_domain::{HomebrewFlags, JournalSnapshot};

const GM_PREAMBLE: &str = "You are the Game Master for a tabletop roleplaying session. \
Narrate vividly and stay in character. Every random outcome (attacks, damage, saving throws, \
ability checks, reaction and morale rolls, random encounters) MUST be resolved by calling the \
roll_dice tool; never invent a die result. Call tools one at a time and wait for each result. \
When the player finishes creating a character, record it with create_character. \
If a tool returns an error, correct the arguments or continue the story without that result.";

const TRUNCATION_MARKER: &str = "\n[...truncated]";

/// Everything the caller knows about the game, as plain values
#[derive(Debug, Clone, Default)]
pub struct GmContext {
    pub rules_text: String,
    pub module_text: String,
    pub journal: Option<JournalSnapshot>,
    pub homebrew: HomebrewFlags,
}

/// Bounds applied while building instructions
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    /// Characters kept from each embedded document
    pub context_char_limit: usize,
    /// Session log lines kept, newest last
    pub session_log_entries: usize,
}

pub fn build_system_instructions(context: &GmContext, limits: PromptLimits) -> String {
    let mut sections = vec![GM_PREAMBLE.to_string()];

    push_section(&mut sections, "Rules reference", &context.rules_text, limits);
    push_section(&mut sections, "Adventure module", &context.module_text, limits);

    if let Some(journal) = &context.journal {
        if !journal.party.is_empty() {
            let roster: Vec<String> = journal
                .party
                .iter()
                .map(|m| {
                    format!(
                        "- {} ({} level {}), HP {}/{}",
                        m.name, m.class_name, m.level, m.hp, m.max_hp
                    )
                })
                .collect();
            sections.push(format!("## Party\n{}", roster.join("\n")));
        }

        let recent = journal.recent_log(limits.session_log_entries);
        if !recent.is_empty() {
            let lines: Vec<String> = recent.iter().map(|line| format!("- {}", line)).collect();
            sections.push(format!("## Recent session log\n{}", lines.join("\n")));
        }

        for (title, note) in [
            ("Character notes", &journal.character_notes),
            ("Inventory notes", &journal.inventory_notes),
            ("House rule notes", &journal.house_rules),
        ] {
            if let Some(note) = note {
                push_section(&mut sections, title, note, limits);
            }
        }
    }

    let rules = context.homebrew.rule_texts();
    if !rules.is_empty() {
        let lines: Vec<String> = rules.iter().map(|r| format!("- {}", r)).collect();
        sections.push(format!("## House rules in effect\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}

fn push_section(sections: &mut Vec<String>, title: &str, body: &str, limits: PromptLimits) {
    let body = body.trim();
    if body.is_empty() {
        return;
    }
    sections.push(format!(
        "## {}\n{}",
        title,
        truncate_chars(body, limits.context_char_limit)
    ));
}

/// First `limit` characters, cut on a char boundary, marked when shortened
fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => format!("{}{}", &text[..byte_index], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}
