//! Subcommands and the plumbing they share.

pub mod daemon;
pub mod increment;
pub mod init;
pub mod log;
pub mod reset;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use japa_core::config;
use japa_daemon::DaemonError;
use japa_sync::CounterSession;

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Open the configured session inside this process.
pub(crate) fn open_session(home: &Path) -> Result<CounterSession> {
    let config = config::load_at(home).context("failed to load config")?;
    CounterSession::open_configured(home, &config).context("failed to open local store")
}

/// Try the daemon first; run `local` when no daemon is listening.
///
/// Either way the result comes back as the JSON the daemon would send.
pub(crate) fn via_daemon_or_local<T, D, L>(home: &Path, daemon: D, local: L) -> Result<Value>
where
    T: Serialize,
    D: FnOnce(&Path) -> Result<Value, DaemonError>,
    L: FnOnce(&Path) -> Result<T>,
{
    match daemon(home) {
        Ok(value) => Ok(value),
        Err(DaemonError::DaemonNotRunning { .. }) => {
            let value = local(home)?;
            serde_json::to_value(&value).context("failed to encode result")
        }
        Err(err) => Err(err).context("daemon request failed"),
    }
}
