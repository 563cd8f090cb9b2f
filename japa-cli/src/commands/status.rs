//! `japa status`: today's count, sync backlog and connectivity.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};
use tabled::{settings::Style, Table, Tabled};

use japa_daemon::request_status;

use super::{home_dir, open_session, runtime, via_daemon_or_local};

/// Arguments for `japa status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let status = via_daemon_or_local(&home, request_status, |home| {
            let session = open_session(home)?;
            let status = runtime()?
                .block_on(session.status())
                .context("failed to read local status")?;
            let key = session.key();
            Ok(json!({
                "running": false,
                "user": key.user.to_string(),
                "device": key.device.to_string(),
                "online": status.sync.online,
                "pending": status.sync.pending,
                "in_flight": status.sync.in_flight,
                "last_sync_at": status.sync.last_synced_at.map(|at| at.to_rfc3339()),
                "today": {
                    "date": status.today.date.to_string(),
                    "count": status.today.count,
                },
            }))
        })?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&status);
        Ok(())
    }
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "item")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

fn print_table(status: &Value) {
    let text = |key: &str| status[key].as_str().unwrap_or("?").to_string();
    let online = status["online"].as_bool().unwrap_or(false);
    let pending = status["pending"].as_u64().unwrap_or(0);

    println!(
        "japa v{} | {} on {} | {}",
        env!("CARGO_PKG_VERSION"),
        text("user").bold(),
        text("device"),
        if status["running"].as_bool().unwrap_or(false) {
            "daemon running".green().to_string()
        } else {
            "no daemon".bright_black().to_string()
        },
    );

    let rows = vec![
        StatusRow {
            field: "today",
            value: format!(
                "{} ({})",
                status["today"]["count"].as_u64().unwrap_or(0),
                status["today"]["date"].as_str().unwrap_or("?")
            ),
        },
        StatusRow {
            field: "connectivity",
            value: if online {
                "online".green().to_string()
            } else {
                "offline".yellow().to_string()
            },
        },
        StatusRow {
            field: "pending",
            value: if pending == 0 {
                "0".to_string()
            } else {
                pending.to_string().yellow().to_string()
            },
        },
        StatusRow {
            field: "sync running",
            value: if status["in_flight"].as_bool().unwrap_or(false) {
                "yes".to_string()
            } else {
                "no".to_string()
            },
        },
        StatusRow {
            field: "last sync",
            value: status["last_sync_at"]
                .as_str()
                .unwrap_or("none this session")
                .to_string(),
        },
    ];

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending > 0 && !online {
        println!("Pending events sync automatically once the remote is reachable.");
    } else if pending > 0 {
        println!("Run 'japa sync' to push pending events now.");
    }
}
