//! `japa reset`: zero today's displayed count.

use anyhow::{Context, Result};

use japa_daemon::request_reset;

use super::{home_dir, open_session, runtime, via_daemon_or_local};

pub fn run() -> Result<()> {
    let home = home_dir()?;
    via_daemon_or_local(&home, request_reset, |home| {
        let session = open_session(home)?;
        runtime()?
            .block_on(session.reset_today())
            .context("failed to reset today's count")
    })?;

    println!("✓ today's count reset to 0");
    println!("  recorded events are kept and still sync");
    Ok(())
}
