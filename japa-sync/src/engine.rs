//! Sync engine: pushes unsynced local events to the remote aggregate.
//!
//! ## `sync_one`: per-event protocol
//!
//! 1. Write the audit [`RemoteEventRecord`].
//! 2. Read the day's [`RemoteDailyCounter`].
//! 3. Write `current + delta` back (create when absent, merge otherwise).
//! 4. Mark the event synced in the local log.
//!
//! Steps 1–3 share one deadline. A failure or timeout anywhere leaves the
//! event pending; nothing already written remotely is rolled back, so
//! delivery is at-least-once. Step 3 is a read-modify-write: two devices
//! syncing the same day concurrently can lose an update.
//!
//! ## `drain`
//!
//! Walks pending events strictly in log order, one at a time, and stops at
//! the first failure so a later event never overtakes an earlier one. The log
//! is re-read before each event, so events appended mid-pass are included.
//!
//! Both entry points require a [`Flight`] from the
//! [`SyncCoordinator`](crate::coordinator::SyncCoordinator).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use japa_core::{
    Clock, EventId, IncrementEvent, LocalEventLog, RemoteDailyCounter, RemoteEventRecord,
    SyncState, UserId,
};

use crate::coordinator::Flight;
use crate::error::{RemoteError, SyncError};
use crate::remote::RemoteAggregateStore;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// The event a drain stopped at, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DrainFailure {
    pub local_id: EventId,
    pub error: String,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub attempted: usize,
    pub synced: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<DrainFailure>,
    pub pending_after: usize,
}

impl DrainReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none() && self.pending_after == 0
    }
}

/// Status readout for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub pending: usize,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub in_flight: bool,
    pub online: bool,
}

#[derive(Debug, Default)]
struct Progress {
    syncing: Option<EventId>,
    last_synced_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct SyncEngine {
    user: UserId,
    log: Arc<Mutex<LocalEventLog>>,
    remote: Arc<dyn RemoteAggregateStore>,
    clock: Arc<dyn Clock>,
    write_timeout: Duration,
    progress: std::sync::Mutex<Progress>,
}

impl SyncEngine {
    pub fn new(
        user: UserId,
        log: Arc<Mutex<LocalEventLog>>,
        remote: Arc<dyn RemoteAggregateStore>,
        clock: Arc<dyn Clock>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            user,
            log,
            remote,
            clock,
            write_timeout,
            progress: std::sync::Mutex::new(Progress::default()),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Sync a single event.
    ///
    /// An event that is already synced is left alone. On error the event is
    /// still pending and can be retried by a later pass.
    pub async fn sync_one(
        &self,
        _flight: &Flight<'_>,
        event: &IncrementEvent,
    ) -> Result<(), SyncError> {
        if self.is_synced(&event.local_id).await {
            tracing::debug!("event {} already synced, skipping", event.local_id);
            return Ok(());
        }

        self.set_syncing(Some(event.local_id.clone()));
        let pushed = tokio::time::timeout(self.write_timeout, self.push(event)).await;
        self.set_syncing(None);

        match pushed {
            Err(_elapsed) => {
                tracing::warn!(
                    "sync of event {} timed out after {:?}; left pending",
                    event.local_id,
                    self.write_timeout
                );
                Err(SyncError::Timeout {
                    local_id: event.local_id.clone(),
                    after: self.write_timeout,
                })
            }
            Ok(Err(err)) => {
                tracing::warn!("sync of event {} failed: {err}; left pending", event.local_id);
                Err(err.into())
            }
            Ok(Ok(())) => {
                let marked = self.log.lock().await.mark_synced(&event.local_id);
                if let Err(err) = marked {
                    tracing::error!(
                        "event {} reached the remote store but could not be marked synced: {err}; \
                         it will be sent again",
                        event.local_id
                    );
                    return Err(err.into());
                }
                self.lock_progress().last_synced_at = Some(self.clock.now());
                tracing::info!(
                    "synced event {} ({} +{})",
                    event.local_id,
                    event.date,
                    event.delta
                );
                Ok(())
            }
        }
    }

    /// Push every pending event in log order, stopping at the first failure.
    pub async fn drain(&self, flight: &Flight<'_>) -> DrainReport {
        let mut report = DrainReport::default();
        let mut attempted = HashSet::new();

        loop {
            let next = self.log.lock().await.first_pending().cloned();
            let Some(event) = next else { break };
            if !attempted.insert(event.local_id.clone()) {
                break;
            }

            report.attempted += 1;
            match self.sync_one(flight, &event).await {
                Ok(()) => report.synced += 1,
                Err(err) => {
                    report.failed = Some(DrainFailure {
                        local_id: event.local_id.clone(),
                        error: err.to_string(),
                    });
                    break;
                }
            }
        }

        report.pending_after = self.pending_count().await;
        tracing::info!(
            "drain finished: {} attempted, {} synced, {} pending",
            report.attempted,
            report.synced,
            report.pending_after
        );
        report
    }

    pub async fn pending_count(&self) -> usize {
        self.log.lock().await.pending_count()
    }

    /// Id of the oldest pending event.
    pub async fn first_pending_id(&self) -> Option<EventId> {
        self.log
            .lock()
            .await
            .first_pending()
            .map(|e| e.local_id.clone())
    }

    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.lock_progress().last_synced_at
    }

    /// Where `id` is in the `pending → syncing → synced` lifecycle.
    /// `None` if the log has no such event.
    pub async fn state_of(&self, id: &EventId) -> Option<SyncState> {
        let syncing = self.lock_progress().syncing.as_ref() == Some(id);
        if syncing {
            return Some(SyncState::Syncing);
        }
        self.log.lock().await.get(id).map(IncrementEvent::state)
    }

    async fn is_synced(&self, id: &EventId) -> bool {
        self.log
            .lock()
            .await
            .get(id)
            .map(|e| e.synced)
            .unwrap_or(false)
    }

    async fn push(&self, event: &IncrementEvent) -> Result<(), RemoteError> {
        let now = self.clock.now();
        let record = RemoteEventRecord::from_event(&self.user, event, now);
        let record_id = self.remote.create_event_record(&record).await?;
        tracing::debug!("audit record {record_id} written for event {}", event.local_id);

        let delta = u64::from(event.delta);
        match self.remote.read_counter(&self.user, event.date).await? {
            Some(current) => self.write_counter(event, current.count + delta, now).await,
            None => {
                let fresh = self.counter_for(event, delta, now);
                match self.remote.create_counter(&fresh).await {
                    Err(RemoteError::AlreadyExists(id)) => {
                        // Another device created the day first; add on top of it.
                        tracing::debug!("counter {id} appeared concurrently, merging");
                        let current = self
                            .remote
                            .read_counter(&self.user, event.date)
                            .await?
                            .map(|c| c.count)
                            .unwrap_or(0);
                        self.write_counter(event, current + delta, now).await
                    }
                    other => other,
                }
            }
        }
    }

    async fn write_counter(
        &self,
        event: &IncrementEvent,
        count: u64,
        now: DateTime<Utc>,
    ) -> Result<(), RemoteError> {
        self.remote
            .merge_counter(&self.counter_for(event, count, now))
            .await
    }

    fn counter_for(
        &self,
        event: &IncrementEvent,
        count: u64,
        now: DateTime<Utc>,
    ) -> RemoteDailyCounter {
        RemoteDailyCounter {
            user_id: self.user.clone(),
            date: event.date,
            count,
            category: event.category.clone(),
            updated_at: now,
        }
    }

    fn set_syncing(&self, id: Option<EventId>) {
        self.lock_progress().syncing = id;
    }

    fn lock_progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
