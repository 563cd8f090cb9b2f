//! Per-home YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.japa/
//!   config.yaml   (mode 0600, written by `japa init`)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::{io_err, StoreError};
use crate::paths::config_path_at;
use crate::types::{DeviceProfile, StorageKey, UserId};

pub const CONFIG_VERSION: u32 = 1;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CATEGORY: &str = "default";

/// Root of `~/.japa/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    pub user_id: UserId,
    pub device_profile: DeviceProfile,
    /// Directory backing the shared remote store. `None` means no remote is
    /// configured and the session stays offline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_root: Option<PathBuf>,
    /// Upper bound for one event's remote writes.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
    /// Connectivity to report when no platform signal is available.
    #[serde(default = "default_assume_online")]
    pub assume_online: bool,
    #[serde(default = "default_category")]
    pub default_category: String,
}

impl Config {
    pub fn new(user_id: UserId, device_profile: DeviceProfile) -> Self {
        Self {
            version: CONFIG_VERSION,
            user_id,
            device_profile,
            remote_root: None,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            assume_online: default_assume_online(),
            default_category: default_category(),
        }
    }

    pub fn storage_key(&self) -> StorageKey {
        StorageKey {
            device: self.device_profile.clone(),
            user: self.user_id.clone(),
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

fn default_assume_online() -> bool {
    true
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// Load `<home>/.japa/config.yaml`.
///
/// Returns `StoreError::ConfigNotFound` if absent,
/// `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<Config, StoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Err(StoreError::ConfigNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, StoreError> {
    load_at(&home()?)
}

/// Atomically save the config to `<home>/.japa/config.yaml`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), StoreError> {
    let yaml = serde_yaml::to_string(config)?;
    write_atomic(&config_path_at(home), yaml.as_bytes())
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), StoreError> {
    save_at(&home()?, config)
}

/// Write a fresh config for `user` on `device`, replacing any existing one.
pub fn init_at(
    home: &Path,
    user: UserId,
    device: DeviceProfile,
    remote_root: Option<PathBuf>,
) -> Result<Config, StoreError> {
    let mut config = Config::new(user, device);
    config.remote_root = remote_root;
    save_at(home, &config)?;
    Ok(config)
}

/// Resolve the home directory used by every convenience wrapper.
pub fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
