//! TaleTable Engine - interactive GM session on stdin/stdout.

use std::io::Write;

use anyhow::Context;
use taletable_domain::HomebrewFlags;
use taletable_engine::infrastructure::ports::{ChatMessage, TurnEvent};
use taletable_engine::use_cases::gm::prompt::GmContext;
use taletable_engine::App;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root.
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taletable_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting TaleTable Engine");

    let context = GmContext {
        rules_text: read_optional_text("GM_RULES_PATH").await?,
        module_text: read_optional_text("GM_MODULE_PATH").await?,
        journal: None,
        homebrew: homebrew_from_env(),
    };

    let app = App::from_env();
    let mut history: Vec<ChatMessage> = Vec::new();

    println!("The GM is ready. Type /quit to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input == "/quit" {
            break;
        }

        let mut streamed_text = false;
        let result = app
            .gm
            .execute_with_observer(&context, &history, input, |event| match event {
                TurnEvent::TextDelta(text) => {
                    streamed_text = true;
                    print!("{}", text);
                    let _ = std::io::stdout().flush();
                }
                TurnEvent::TurnComplete { .. } if streamed_text => println!(),
                _ => {}
            })
            .await;

        match result {
            Ok(response) => {
                if !streamed_text {
                    println!("{}", response.text);
                }
                let audit = response.audit_lines();
                if !audit.is_empty() {
                    println!("\n--- Dice ---");
                    for line in audit {
                        println!("{}", line);
                    }
                }
                for character in &response.created_characters {
                    println!("\n--- New character ---");
                    println!("{}", serde_json::to_string_pretty(character)?);
                }
                history = response.history();
            }
            Err(e) => {
                // History is untouched; the same message can be sent again.
                tracing::error!(error = %e, "GM reply failed");
                eprintln!("\nThe GM could not answer: {}", e);
            }
        }
    }

    tracing::info!("Session ended");
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

/// Contents of the text file named by `var`, or empty when unset.
async fn read_optional_text(var: &str) -> anyhow::Result<String> {
    let Some(path) = std::env::var(var).ok().filter(|p| !p.trim().is_empty()) else {
        return Ok(String::new());
    };
    let text = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {} from {}", var, path))?;
    tracing::info!(var, path = %path, chars = text.chars().count(), "Loaded reference text");
    Ok(text)
}

/// `GM_HOMEBREW` is a comma-separated list of `4d6l`, `max_hp`, `ascending_ac`.
fn homebrew_from_env() -> HomebrewFlags {
    let mut flags = HomebrewFlags::default();
    let Ok(raw) = std::env::var("GM_HOMEBREW") else {
        return flags;
    };
    for name in raw.split(',').map(|s| s.trim().to_ascii_lowercase()) {
        match name.as_str() {
            "" => {}
            "4d6l" => flags.ability_scores_4d6_drop_lowest = true,
            "max_hp" => flags.max_hp_at_first_level = true,
            "ascending_ac" => flags.ascending_armor_class = true,
            other => tracing::warn!(flag = other, "Unknown GM_HOMEBREW flag, ignoring"),
        }
    }
    flags
}
