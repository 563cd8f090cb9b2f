//! Today aggregate cache: the optimistic, date-scoped running total the UI
//! reads for instant feedback.
//!
//! The snapshot lives at `<home>/.japa/devices/<device>/<user>/today.json`.
//! It is disposable: a missing, unreadable, or stale snapshot is rebuilt from
//! the event log. A snapshot for today is trusted as-is, because a user
//! [`reset`](TodayAggregateCache::reset) deliberately makes the displayed
//! count diverge from the log and that must survive a restart.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local, NaiveDate, Utc};

use crate::atomic::write_atomic;
use crate::error::{json_err, StoreError};
use crate::event_log::sum_for;
use crate::paths::today_path_at;
use crate::types::{IncrementEvent, StorageKey, TodayAggregate};

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" and of the current calendar day.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn today(&self) -> NaiveDate;
}

/// Wall clock; the calendar day is the local one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Settable clock shared between clones.
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(now)),
        }
    }

    /// A clock pinned to noon UTC on `date`.
    pub fn on(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc();
        Self::at(noon)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.lock() = now;
    }

    pub fn set_date(&self, date: NaiveDate) {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc();
        self.set(noon);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Utc>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.lock()
    }

    fn today(&self) -> NaiveDate {
        self.lock().date_naive()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct TodayAggregateCache {
    path: PathBuf,
    snapshot: TodayAggregate,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TodayAggregateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TodayAggregateCache")
            .field("path", &self.path)
            .field("snapshot", &self.snapshot)
            .finish_non_exhaustive()
    }
}

impl TodayAggregateCache {
    /// Open the cache for `key`, rebuilding it from `events` unless a snapshot
    /// for today already exists.
    pub fn open_at(
        home: &Path,
        key: &StorageKey,
        clock: Arc<dyn Clock>,
        events: &[IncrementEvent],
    ) -> Result<Self, StoreError> {
        let path = today_path_at(home, key);
        let today = clock.today();
        let snapshot = match read_snapshot(&path) {
            Some(stored) if stored.date == today => stored,
            _ => {
                let rebuilt = TodayAggregate {
                    date: today,
                    count: sum_for(events, today),
                };
                save_snapshot(&path, &rebuilt)?;
                rebuilt
            }
        };
        Ok(Self {
            path,
            snapshot,
            clock,
        })
    }

    /// Today's count, after rolling the cache over if the day has changed.
    pub fn current_count(&mut self) -> Result<u64, StoreError> {
        self.roll_over()?;
        Ok(self.snapshot.count)
    }

    /// Add `delta` optimistically. Call right after the event is appended.
    pub fn apply_increment(&mut self, delta: u32) -> Result<u64, StoreError> {
        self.roll_over()?;
        let next = TodayAggregate {
            date: self.snapshot.date,
            count: self.snapshot.count.saturating_add(u64::from(delta)),
        };
        self.store(next)?;
        Ok(next.count)
    }

    /// Zero today's displayed count. The event log is not touched.
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.store(TodayAggregate::empty(self.clock.today()))
    }

    pub fn snapshot(&self) -> TodayAggregate {
        self.snapshot
    }

    pub fn date(&self) -> NaiveDate {
        self.snapshot.date
    }

    fn roll_over(&mut self) -> Result<(), StoreError> {
        let today = self.clock.today();
        if self.snapshot.date != today {
            self.store(TodayAggregate::empty(today))?;
        }
        Ok(())
    }

    // The in-memory value moves even when the write fails: the display must
    // reflect the tap, and the next successful write catches the file up.
    fn store(&mut self, next: TodayAggregate) -> Result<(), StoreError> {
        self.snapshot = next;
        save_snapshot(&self.path, &next)
    }
}

fn read_snapshot(path: &Path) -> Option<TodayAggregate> {
    let contents = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}

fn save_snapshot(path: &Path, snapshot: &TodayAggregate) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(snapshot).map_err(|e| json_err(path, e))?;
    write_atomic(path, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn key() -> StorageKey {
        StorageKey::new("phone", "alice")
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, d).expect("valid date")
    }

    fn event_on(d: u32, delta: u32) -> IncrementEvent {
        IncrementEvent::new(day(d), delta, "om", Utc::now()).expect("event")
    }

    #[test]
    fn rebuilds_from_log_when_snapshot_missing() {
        let home = TempDir::new().unwrap();
        let clock = FixedClock::on(day(10));
        let events = vec![event_on(9, 4), event_on(10, 2), event_on(10, 3)];
        let mut cache =
            TodayAggregateCache::open_at(home.path(), &key(), Arc::new(clock), &events).unwrap();
        assert_eq!(cache.current_count().unwrap(), 5);
    }

    #[test]
    fn apply_increment_persists_snapshot() {
        let home = TempDir::new().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(day(10)));
        {
            let mut cache =
                TodayAggregateCache::open_at(home.path(), &key(), clock.clone(), &[]).unwrap();
            cache.apply_increment(1).unwrap();
            cache.apply_increment(2).unwrap();
        }
        let mut reopened = TodayAggregateCache::open_at(home.path(), &key(), clock, &[]).unwrap();
        assert_eq!(reopened.current_count().unwrap(), 3);
    }

    #[test]
    fn rollover_resets_to_zero() {
        let home = TempDir::new().unwrap();
        let clock = FixedClock::on(day(10));
        let mut cache = TodayAggregateCache::open_at(
            home.path(),
            &key(),
            Arc::new(clock.clone()),
            &[event_on(10, 7)],
        )
        .unwrap();
        assert_eq!(cache.current_count().unwrap(), 7);

        clock.set_date(day(11));
        assert_eq!(cache.current_count().unwrap(), 0);
        assert_eq!(cache.date(), day(11));
    }

    #[test]
    fn reset_survives_reopen_and_diverges_from_log() {
        let home = TempDir::new().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::on(day(12)));
        let events = vec![event_on(12, 5)];
        {
            let mut cache =
                TodayAggregateCache::open_at(home.path(), &key(), clock.clone(), &events).unwrap();
            cache.reset().unwrap();
            assert_eq!(cache.current_count().unwrap(), 0);
        }
        let mut reopened =
            TodayAggregateCache::open_at(home.path(), &key(), clock, &events).unwrap();
        assert_eq!(reopened.current_count().unwrap(), 0);
        assert_eq!(sum_for(&events, day(12)), 5);
    }

    #[test]
    fn stale_snapshot_is_rebuilt_on_open() {
        let home = TempDir::new().unwrap();
        let path = today_path_at(home.path(), &key());
        save_snapshot(&path, &TodayAggregate { date: day(1), count: 99 }).unwrap();

        let clock = FixedClock::on(day(2));
        let mut cache = TodayAggregateCache::open_at(
            home.path(),
            &key(),
            Arc::new(clock),
            &[event_on(2, 1)],
        )
        .unwrap();
        assert_eq!(cache.current_count().unwrap(), 1);
    }

    #[test]
    fn corrupt_snapshot_is_rebuilt() {
        let home = TempDir::new().unwrap();
        let path = today_path_at(home.path(), &key());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"garbage").unwrap();

        let clock = FixedClock::on(day(3));
        let mut cache =
            TodayAggregateCache::open_at(home.path(), &key(), Arc::new(clock), &[event_on(3, 2)])
                .unwrap();
        assert_eq!(cache.current_count().unwrap(), 2);
    }
}
