//! Local store durability, rollover, and config integration tests.
//! Layout: ~/.japa/devices/<device>/<user>/{events.json,today.json}

use std::fs;
use std::sync::Arc;

use assert_fs::prelude::*;
use chrono::{NaiveDate, Utc};
use japa_core::{
    config, event_log::LocalEventLog, paths, Clock, DeviceProfile, FixedClock, IncrementEvent,
    StorageKey, StoreError, TodayAggregateCache, UserId,
};
use predicates::prelude::predicate;

fn key() -> StorageKey {
    StorageKey::new("phone", "alice")
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 6, d).expect("valid date")
}

fn tap(date: NaiveDate) -> IncrementEvent {
    IncrementEvent::new(date, 1, "om namah shivaya", Utc::now()).expect("event")
}

// ---------------------------------------------------------------------------
// 1. Append durability
// ---------------------------------------------------------------------------

#[test]
fn appended_event_is_pending_after_restart() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let event = tap(day(1));

    let mut log = LocalEventLog::open_at(home.path(), &key()).expect("open");
    log.append(event.clone()).expect("append");
    drop(log);

    let restarted = LocalEventLog::open_at(home.path(), &key()).expect("reopen");
    let found = restarted.get(&event.local_id).expect("event survives restart");
    assert!(!found.synced);
    assert_eq!(found, &event);

    home.child(".japa/devices/phone/alice/events.json")
        .assert(predicate::path::exists());
}

#[test]
fn interrupted_write_leaves_previous_log_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut log = LocalEventLog::open_at(home.path(), &key()).expect("open");
    log.append(tap(day(1))).expect("append");

    let path = paths::events_path_at(home.path(), &key());
    let original_bytes = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = path.with_file_name("events.json.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(original_bytes, fs::read(&path).expect("read after crash"));
    let reopened = LocalEventLog::open_at(home.path(), &key()).expect("reopen");
    assert_eq!(reopened.len(), 1);
}

#[test]
fn logs_are_isolated_per_device_and_user() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut alice_phone = LocalEventLog::open_at(home.path(), &key()).expect("open");
    alice_phone.append(tap(day(1))).expect("append");

    let bob = StorageKey::new("phone", "bob");
    let alice_tablet = StorageKey::new("tablet", "alice");
    assert!(LocalEventLog::open_at(home.path(), &bob).expect("open").is_empty());
    assert!(LocalEventLog::open_at(home.path(), &alice_tablet)
        .expect("open")
        .is_empty());
}

#[cfg(unix)]
#[test]
fn event_log_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut log = LocalEventLog::open_at(home.path(), &key()).expect("open");
    log.append(tap(day(1))).expect("append");
    let mode = fs::metadata(log.path()).expect("meta").permissions().mode() & 0o777;
    assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
}

// ---------------------------------------------------------------------------
// 2. Date rollover
// ---------------------------------------------------------------------------

#[test]
fn yesterday_snapshot_reads_zero_today_and_log_keeps_history() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let clock = FixedClock::on(day(14));
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    let mut log = LocalEventLog::open_at(home.path(), &key()).expect("open");
    let mut cache =
        TodayAggregateCache::open_at(home.path(), &key(), shared.clone(), log.load_all())
            .expect("cache");
    for _ in 0..3 {
        log.append(tap(clock.today())).expect("append");
        cache.apply_increment(1).expect("apply");
    }
    drop(cache);

    clock.set_date(day(15));
    let mut cache = TodayAggregateCache::open_at(home.path(), &key(), shared, log.load_all())
        .expect("cache after rollover");
    assert_eq!(cache.current_count().expect("count"), 0);

    let history = log.load_all();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|e| e.date == day(14)));
}

// ---------------------------------------------------------------------------
// 3. Config
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_yaml() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::init_at(
        home.path(),
        UserId::from("alice"),
        DeviceProfile::from("phone"),
        None,
    )
    .expect("init");

    home.child(".japa/config.yaml")
        .assert(predicate::str::contains("user_id: alice"));
}

#[test]
fn corrupt_config_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let path = paths::config_path_at(home.path());
    fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
    fs::write(&path, b": : corrupt : yaml : !!!\n  - broken: [unclosed").expect("write");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}
