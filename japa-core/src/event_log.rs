//! Local event log: the durable, append-only record of every increment.
//!
//! Persists a [`EventLogFile`] JSON document at
//! `<home>/.japa/devices/<device>/<user>/events.json`.
//! Every mutation rewrites the whole document through the atomic
//! `.tmp` + `fsync` + rename path before the in-memory copy changes, so a
//! successful return means the change survives a process restart.
//!
//! Several processes may hold the same log open (a CLI invocation next to a
//! running sync). Mutations take an exclusive lock on the sibling
//! `events.lock`, re-read the document under it and apply the change to that
//! fresh copy, so one writer never drops another's events.
//!
//! Events are never removed. The only mutation after append is flipping
//! `synced` from `false` to `true`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::atomic::{lock_exclusive, write_atomic};
use crate::error::{io_err, json_err, StoreError};
use crate::paths::{events_lock_path_at, events_path_at};
use crate::types::{EventId, IncrementEvent, StorageKey};

pub const EVENT_LOG_VERSION: u32 = 1;

/// On-disk event log payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventLogFile {
    pub version: u32,
    pub events: Vec<IncrementEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EventLogCompat {
    Structured(EventLogFile),
    Legacy(Vec<IncrementEvent>),
}

/// Append-only log of [`IncrementEvent`]s for one `(device, user)` pair.
#[derive(Debug)]
pub struct LocalEventLog {
    path: PathBuf,
    lock_path: PathBuf,
    events: Vec<IncrementEvent>,
}

impl LocalEventLog {
    /// Open the log for `key`, loading any events already on disk.
    ///
    /// A missing file is an empty log.
    pub fn open_at(home: &Path, key: &StorageKey) -> Result<Self, StoreError> {
        let path = events_path_at(home, key);
        let events = read_events(&path)?;
        Ok(Self {
            path,
            lock_path: events_lock_path_at(home, key),
            events,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append one event.
    ///
    /// The event is on disk when this returns `Ok`. On error nothing changes,
    /// neither on disk nor in memory.
    pub fn append(&mut self, event: IncrementEvent) -> Result<(), StoreError> {
        if event.delta == 0 {
            return Err(StoreError::InvalidDelta);
        }
        let _lock = lock_exclusive(&self.lock_path)?;
        let mut next = read_events(&self.path)?;
        next.push(event);
        persist(&self.path, &next)?;
        self.events = next;
        Ok(())
    }

    /// All events in insertion order.
    pub fn load_all(&self) -> &[IncrementEvent] {
        &self.events
    }

    /// Re-read the log from disk, discarding the in-memory copy.
    pub fn reload(&mut self) -> Result<(), StoreError> {
        self.events = read_events(&self.path)?;
        Ok(())
    }

    pub fn get(&self, id: &EventId) -> Option<&IncrementEvent> {
        self.events.iter().find(|e| &e.local_id == id)
    }

    /// Flip `synced` to `true` for exactly one event.
    ///
    /// Returns `Ok(true)` when the flag changed and `Ok(false)` when the event
    /// was already synced (no write happens).
    pub fn mark_synced(&mut self, id: &EventId) -> Result<bool, StoreError> {
        if self.get(id).is_some_and(|e| e.synced) {
            return Ok(false);
        }

        let _lock = lock_exclusive(&self.lock_path)?;
        let mut next = read_events(&self.path)?;
        let Some(index) = next.iter().position(|e| &e.local_id == id) else {
            return Err(StoreError::EventNotFound(id.clone()));
        };
        if next[index].synced {
            self.events = next;
            return Ok(false);
        }
        next[index].synced = true;
        persist(&self.path, &next)?;
        self.events = next;
        Ok(true)
    }

    /// Unsynced events in log order.
    pub fn pending(&self) -> Vec<IncrementEvent> {
        self.events.iter().filter(|e| !e.synced).cloned().collect()
    }

    /// First unsynced event in log order.
    pub fn first_pending(&self) -> Option<&IncrementEvent> {
        self.events.iter().find(|e| !e.synced)
    }

    pub fn pending_count(&self) -> usize {
        self.events.iter().filter(|e| !e.synced).count()
    }

    /// Sum of `delta` over every event dated `date`, synced or not.
    pub fn sum_for(&self, date: NaiveDate) -> u64 {
        sum_for(&self.events, date)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Sum of `delta` over `events` dated `date`.
pub fn sum_for(events: &[IncrementEvent], date: NaiveDate) -> u64 {
    events
        .iter()
        .filter(|e| e.date == date)
        .map(|e| u64::from(e.delta))
        .sum()
}

fn read_events(path: &Path) -> Result<Vec<IncrementEvent>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    match serde_json::from_str::<EventLogCompat>(&contents).map_err(|e| json_err(path, e))? {
        EventLogCompat::Structured(file) => Ok(file.events),
        EventLogCompat::Legacy(events) => Ok(events),
    }
}

fn persist(path: &Path, events: &[IncrementEvent]) -> Result<(), StoreError> {
    let file = EventLogFile {
        version: EVENT_LOG_VERSION,
        events: events.to_vec(),
    };
    let json = serde_json::to_vec_pretty(&file).map_err(|e| json_err(path, e))?;
    write_atomic(path, &json)
}
