//! `japa increment [--delta N] [--category C]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;

use japa_daemon::request_increment;

use super::{home_dir, open_session, runtime, via_daemon_or_local};

/// Record repetitions.
#[derive(Args, Debug)]
pub struct IncrementArgs {
    /// Repetitions to add; must be at least 1.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub delta: u32,

    /// Category for this event (defaults to the configured one).
    #[arg(long, short = 'c')]
    pub category: Option<String>,
}

impl IncrementArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let category = self.category.clone();
        let receipt = via_daemon_or_local(
            &home,
            |home| request_increment(home, self.delta, category),
            |home| {
                let session = open_session(home)?;
                runtime()?
                    .block_on(session.increment(self.delta, self.category.as_deref()))
                    .context("increment was not saved")
            },
        )?;

        print_receipt(&receipt);
        Ok(())
    }
}

fn print_receipt(receipt: &Value) {
    let delta = receipt["event"]["delta"].as_u64().unwrap_or(0);
    let today = receipt["today_count"].as_u64().unwrap_or(0);
    let state = if receipt["synced"].as_bool().unwrap_or(false) {
        "synced".green().to_string()
    } else {
        "pending".yellow().to_string()
    };
    println!("✓ +{delta} recorded | today {} | {state}", today.to_string().bold());
    if let Some(warning) = receipt["cache_warning"].as_str() {
        println!(
            "  {} today's count was not saved: {warning}",
            "warning:".yellow()
        );
    }
}
