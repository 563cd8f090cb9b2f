//! `japa sync`: push every pending event now.

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;

use japa_daemon::request_sync;

use super::{home_dir, open_session, runtime, via_daemon_or_local};

pub fn run() -> Result<()> {
    let home = home_dir()?;
    let report = via_daemon_or_local(&home, request_sync, |home| {
        let session = open_session(home)?;
        runtime()?
            .block_on(session.sync_now())
            .context("sync was not started")
    })?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &Value) {
    let synced = report["synced"].as_u64().unwrap_or(0);
    let pending = report["pending_after"].as_u64().unwrap_or(0);

    match report.get("failed") {
        Some(failed) if !failed.is_null() => {
            println!(
                "{} synced {synced} event(s), stopped at {}: {}",
                "!".yellow().bold(),
                failed["local_id"].as_str().unwrap_or("?"),
                failed["error"].as_str().unwrap_or("unknown error"),
            );
            println!("  {pending} event(s) still pending; they are retried on the next sync");
        }
        _ if synced == 0 && pending == 0 => println!("✓ nothing to sync"),
        _ => println!("✓ synced {synced} event(s), {pending} pending"),
    }
}
