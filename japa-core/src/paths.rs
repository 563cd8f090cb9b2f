//! On-disk layout of the local store.
//!
//! ```text
//! ~/.japa/
//!   config.yaml
//!   devices/
//!     <device>/
//!       <user>/
//!         events.json   (append-only event log)
//!         events.lock   (writer lock for events.json)
//!         today.json    (today aggregate snapshot)
//! ```
//!
//! All helpers are pure; nothing here touches the filesystem.

use std::path::{Path, PathBuf};

use crate::types::StorageKey;

pub const EVENTS_FILE: &str = "events.json";
pub const EVENTS_LOCK_FILE: &str = "events.lock";
pub const TODAY_FILE: &str = "today.json";
pub const CONFIG_FILE: &str = "config.yaml";

/// `<home>/.japa`
pub fn japa_root(home: &Path) -> PathBuf {
    home.join(".japa")
}

/// `<home>/.japa/config.yaml`
pub fn config_path_at(home: &Path) -> PathBuf {
    japa_root(home).join(CONFIG_FILE)
}

/// `<home>/.japa/devices/<device>/<user>/`
pub fn store_dir_at(home: &Path, key: &StorageKey) -> PathBuf {
    japa_root(home)
        .join("devices")
        .join(&key.device.0)
        .join(&key.user.0)
}

/// `<home>/.japa/devices/<device>/<user>/events.json`
pub fn events_path_at(home: &Path, key: &StorageKey) -> PathBuf {
    store_dir_at(home, key).join(EVENTS_FILE)
}

/// `<home>/.japa/devices/<device>/<user>/events.lock`
pub fn events_lock_path_at(home: &Path, key: &StorageKey) -> PathBuf {
    store_dir_at(home, key).join(EVENTS_LOCK_FILE)
}

/// `<home>/.japa/devices/<device>/<user>/today.json`
pub fn today_path_at(home: &Path, key: &StorageKey) -> PathBuf {
    store_dir_at(home, key).join(TODAY_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_paths_are_keyed_by_device_then_user() {
        let key = StorageKey::new("phone", "alice");
        let events = events_path_at(Path::new("/home/a"), &key);
        assert!(events.ends_with(".japa/devices/phone/alice/events.json"));
        let today = today_path_at(Path::new("/home/a"), &key);
        assert!(today.ends_with(".japa/devices/phone/alice/today.json"));
    }

    #[test]
    fn config_lives_at_japa_root() {
        assert!(config_path_at(Path::new("/h")).ends_with(".japa/config.yaml"));
    }
}
