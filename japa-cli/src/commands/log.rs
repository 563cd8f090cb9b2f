//! `japa log`: list the events recorded on this device.

use anyhow::{Context, Result};
use clap::Args;
use chrono::Local;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use japa_core::{config, IncrementEvent, LocalEventLog, SyncState};

use super::home_dir;

/// Arguments for `japa log`.
#[derive(Args, Debug)]
pub struct LogArgs {
    /// Only events not yet pushed to the remote store.
    #[arg(long)]
    pub pending: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "date")]
    date: String,
    #[tabled(rename = "delta")]
    delta: u32,
    #[tabled(rename = "category")]
    category: String,
    #[tabled(rename = "recorded")]
    recorded: String,
    #[tabled(rename = "state")]
    state: String,
}

impl LogArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let cfg = config::load_at(&home).context("failed to load config")?;
        // Read-only, so safe alongside a running daemon.
        let log = LocalEventLog::open_at(&home, &cfg.storage_key())
            .context("failed to open local event log")?;

        let events: Vec<&IncrementEvent> = log
            .load_all()
            .iter()
            .filter(|event| !self.pending || !event.synced)
            .collect();

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&events).context("failed to serialize events")?
            );
            return Ok(());
        }

        if events.is_empty() {
            println!("No events recorded.");
            return Ok(());
        }

        let rows: Vec<EventRow> = events.iter().map(|event| row(event)).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        println!(
            "{} event(s), {} pending",
            log.len(),
            log.pending_count()
        );
        Ok(())
    }
}

fn row(event: &IncrementEvent) -> EventRow {
    let state = match event.state() {
        SyncState::Synced => "synced".green().to_string(),
        other => other.to_string().yellow().to_string(),
    };
    EventRow {
        id: event.local_id.0.chars().take(8).collect(),
        date: event.date.to_string(),
        delta: event.delta,
        category: event.category.clone(),
        recorded: event
            .client_timestamp
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string(),
        state,
    }
}
