//! japa: offline-first mantra counter.
//!
//! # Usage
//!
//! ```text
//! japa init --user <id> --device <name> [--remote <dir>] [--timeout-ms N] [--category C]
//! japa increment [--delta N] [--category C]
//! japa sync
//! japa status [--json]
//! japa reset
//! japa log [--pending] [--json]
//! japa daemon start|stop|status|online|offline|logs
//! ```
//!
//! `increment`, `sync`, `status` and `reset` go through the daemon socket when
//! a daemon is running, so a single process owns the local log. Otherwise they
//! run in this process, online only if the configured remote root is present.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, increment::IncrementArgs, init::InitArgs, log::LogArgs,
    status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "japa",
    version,
    about = "Count mantra repetitions offline and sync them when connected",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.japa/config.yaml for this user and device.
    Init(InitArgs),

    /// Record repetitions; pushed right away when online.
    Increment(IncrementArgs),

    /// Push every pending event now. Fails while offline.
    Sync,

    /// Show today's count, pending events and connectivity.
    Status(StatusArgs),

    /// Zero today's displayed count. History and pending events are kept.
    Reset,

    /// List locally recorded events.
    Log(LogArgs),

    /// Manage the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Increment(args) => args.run(),
        Commands::Sync => commands::sync::run(),
        Commands::Status(args) => args.run(),
        Commands::Reset => commands::reset::run(),
        Commands::Log(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
