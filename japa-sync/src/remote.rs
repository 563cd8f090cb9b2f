//! Remote aggregate store: the hosted document store, consumed through a
//! minimal read / create / merge-upsert interface.
//!
//! Two collections:
//! - counters: one [`RemoteDailyCounter`] per `(user, date)`, keyed by
//!   [`RemoteDailyCounter::doc_id`]
//! - events: append-only [`RemoteEventRecord`] audit trail, create-only
//!
//! No atomic server-side increment is offered, so callers adding to a
//! counter must read, add, and write back. Two devices doing that for the
//! same day at the same moment can lose an update.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use japa_core::{RemoteDailyCounter, RemoteEventRecord, UserId};

use crate::error::RemoteError;

#[async_trait]
pub trait RemoteAggregateStore: Send + Sync {
    /// Read the counter for `(user, date)`, `None` if it was never created.
    async fn read_counter(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<RemoteDailyCounter>, RemoteError>;

    /// Create the counter document; fails with `AlreadyExists` if present.
    async fn create_counter(&self, counter: &RemoteDailyCounter) -> Result<(), RemoteError>;

    /// Update-by-merge: overwrite the given fields, creating the document when
    /// it does not exist yet.
    async fn merge_counter(&self, counter: &RemoteDailyCounter) -> Result<(), RemoteError>;

    /// Append one audit record and return the id the store assigned to it.
    async fn create_event_record(&self, record: &RemoteEventRecord)
        -> Result<String, RemoteError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store. Useful when no shared directory is configured and as
/// the remote side of tests.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    counters: HashMap<String, RemoteDailyCounter>,
    events: Vec<(String, RemoteEventRecord)>,
    next_record: u64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter value for `(user, date)`, `0` if absent.
    pub async fn count(&self, user: &UserId, date: NaiveDate) -> u64 {
        let state = self.inner.lock().await;
        state
            .counters
            .get(&RemoteDailyCounter::doc_id(user, date))
            .map(|c| c.count)
            .unwrap_or(0)
    }

    pub async fn counter(&self, user: &UserId, date: NaiveDate) -> Option<RemoteDailyCounter> {
        let state = self.inner.lock().await;
        state
            .counters
            .get(&RemoteDailyCounter::doc_id(user, date))
            .cloned()
    }

    /// Audit records in write order.
    pub async fn event_records(&self) -> Vec<RemoteEventRecord> {
        let state = self.inner.lock().await;
        state.events.iter().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl RemoteAggregateStore for MemoryRemoteStore {
    async fn read_counter(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<RemoteDailyCounter>, RemoteError> {
        Ok(self.counter(user, date).await)
    }

    async fn create_counter(&self, counter: &RemoteDailyCounter) -> Result<(), RemoteError> {
        let mut state = self.inner.lock().await;
        let id = counter.id();
        if state.counters.contains_key(&id) {
            return Err(RemoteError::AlreadyExists(id));
        }
        state.counters.insert(id, counter.clone());
        Ok(())
    }

    async fn merge_counter(&self, counter: &RemoteDailyCounter) -> Result<(), RemoteError> {
        let mut state = self.inner.lock().await;
        state.counters.insert(counter.id(), counter.clone());
        Ok(())
    }

    async fn create_event_record(
        &self,
        record: &RemoteEventRecord,
    ) -> Result<String, RemoteError> {
        let mut state = self.inner.lock().await;
        state.next_record += 1;
        let id = format!("evt-{:08}", state.next_record);
        state.events.push((id.clone(), record.clone()));
        Ok(id)
    }
}
