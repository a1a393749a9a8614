//! `parley history` and `parley rate`.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use console::style;
use uuid::Uuid;

use parley_core::chat::{HistoryManager, visible_transcript};
use parley_types::chat::{Thumb, TranscriptKind};

use crate::state::AppState;

/// Print the visible transcript of a history with its rating totals.
pub async fn show_history(state: &AppState, history_id: Uuid, json: bool) -> Result<()> {
    let manager = HistoryManager::new(Arc::clone(&state.histories));
    let history = manager.load(&history_id).await?;
    let transcript = visible_transcript(&history);
    let counts = manager.rating_counts(&history_id).await?;

    if json {
        let report = serde_json::json!({
            "id": history.id,
            "template": history.template_name,
            "context_vars": history.context_vars,
            "ratings": counts,
            "messages": transcript,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} {}",
        style("History").bold(),
        style(history.id).cyan(),
        style(format!("({})", history.template_name)).dim()
    );
    println!();

    if transcript.is_empty() {
        println!("  {}", style("No messages yet.").dim());
    }

    for entry in &transcript {
        let speaker = match entry.kind {
            TranscriptKind::User => style("you>").green().bold(),
            TranscriptKind::Bot => style("bot>").cyan().bold(),
        };
        let thumb = match entry.thumb {
            Some(Thumb::Up) => format!(" {}", style("[+1]").green()),
            Some(Thumb::Down) => format!(" {}", style("[-1]").red()),
            None => String::new(),
        };
        println!("  {speaker} {}{thumb}", entry.message);
        println!("       {}", style(entry.id).dim());
    }

    println!();
    println!(
        "  {} up, {} down",
        style(counts.thumbs_up).green().bold(),
        style(counts.thumbs_down).red().bold()
    );
    println!();

    Ok(())
}

/// Record a thumbs rating on one message.
pub async fn rate(
    state: &AppState,
    history_id: Uuid,
    message_id: Uuid,
    thumb: &str,
    json: bool,
) -> Result<()> {
    let thumb: Thumb = thumb.parse().map_err(|e: String| anyhow!(e))?;
    let manager = HistoryManager::new(Arc::clone(&state.histories));
    manager.rate_message(&history_id, &message_id, thumb).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "history_id": history_id, "message_id": message_id, "thumb": thumb })
        );
    } else {
        println!("  {} rated {} {thumb}", style("✓").green(), style(message_id).cyan());
    }
    Ok(())
}
