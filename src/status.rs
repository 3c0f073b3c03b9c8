// State summary display for the `status` subcommand.

use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Local};

use crate::store::codec;

/// Display a summary of the state file to the terminal.
pub fn show(state_path: &Path) -> Result<()> {
    if !state_path.exists() {
        println!("State: not created yet");
        println!("\nThe bot writes {} after its first save.", state_path.display());
        return Ok(());
    }

    let metadata = std::fs::metadata(state_path)?;
    let saved_at = metadata
        .modified()
        .map(|t| DateTime::<Local>::from(t).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    println!(
        "State: {} ({}, saved {})",
        state_path.display(),
        format_bytes(metadata.len()),
        saved_at
    );

    let ledgers = codec::load_state(state_path)?;
    if ledgers.is_empty() {
        println!("Monitored chats: none");
        println!("  Run /enable in a group the bot belongs to");
        return Ok(());
    }

    let mut chats: Vec<_> = ledgers.iter().collect();
    chats.sort_by_key(|(chat, _)| chat.0);

    println!("Monitored chats: {}", chats.len());
    for (chat, ledger) in &chats {
        println!(
            "  {}: {} media ids, {} fingerprints, {} exempt users",
            chat,
            ledger.media_count(),
            ledger.fingerprint_count(),
            ledger.exempt_count()
        );
    }

    let media: usize = ledgers.values().map(|l| l.media_count()).sum();
    let fingerprints: usize = ledgers.values().map(|l| l.fingerprint_count()).sum();
    println!("Totals: {} media ids over {} fingerprints", media, fingerprints);

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
