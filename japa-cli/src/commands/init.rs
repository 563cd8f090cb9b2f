//! `japa init --user <id> --device <name> [--remote <dir>]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use japa_core::{config, DeviceProfile, UserId};

use super::home_dir;

/// Write the local configuration for this user and device.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Account the counts belong to.
    #[arg(long, short = 'u')]
    pub user: String,

    /// Name of this device; each device keeps its own local log.
    #[arg(long, short = 'd')]
    pub device: String,

    /// Shared directory acting as the remote store (network mount, synced
    /// drive). Without it, events stay on this device.
    #[arg(long, short = 'r')]
    pub remote: Option<PathBuf>,

    /// Upper bound in milliseconds for one event's remote writes.
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Category recorded when `japa increment` is given none.
    #[arg(long, short = 'c')]
    pub category: Option<String>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let remote = self.remote.map(absolute).transpose()?;

        let mut cfg = config::init_at(
            &home,
            UserId::from(self.user),
            DeviceProfile::from(self.device),
            remote,
        )
        .context("failed to write config")?;

        if self.timeout_ms.is_some() || self.category.is_some() {
            if let Some(ms) = self.timeout_ms {
                cfg.write_timeout_ms = ms;
            }
            if let Some(category) = self.category {
                cfg.default_category = category;
            }
            config::save_at(&home, &cfg).context("failed to write config")?;
        }

        println!(
            "✓ Configured '{}' on device '{}'",
            cfg.user_id, cfg.device_profile
        );
        match &cfg.remote_root {
            Some(root) => println!("  Remote: {}", root.display()),
            None => println!("  Remote: none (events stay local)"),
        }
        println!("  Saved to: ~/.japa/config.yaml");
        Ok(())
    }
}

/// The remote root may not be mounted yet, so it is not canonicalized.
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("cannot resolve current directory")?;
    Ok(cwd.join(path))
}
