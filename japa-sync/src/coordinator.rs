//! Single-flight coordination of every sync trigger.
//!
//! Three triggers can start work, and they can overlap (a tap lands just as
//! connectivity returns):
//!
//! | trigger              | entry point            | lock held by another pass |
//! |----------------------|------------------------|---------------------------|
//! | local increment      | [`SyncCoordinator::sync_latest`] | flag a rerun and return   |
//! | offline → online     | [`SyncCoordinator::on_reconnect`] | wait, then drain         |
//! | user "sync now"      | [`SyncCoordinator::sync_now`]     | fail with `InFlight`     |
//!
//! Every entry point releases its flight through [`SyncCoordinator::finish`]:
//! once the lock is free it checks the rerun flag and drains again if a tap
//! was turned away meanwhile. A tap sets the flag before retrying the lock,
//! so either it gets the lock itself or the holder sees the flag.
//!
//! The engine only accepts work together with a [`Flight`], which is minted
//! here while the lock is held.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use japa_core::IncrementEvent;

use crate::connectivity::ConnectivityMonitor;
use crate::engine::{DrainReport, SyncEngine, SyncStatus};
use crate::error::SyncError;

/// Proof that the single-flight lock is held. Released on drop.
#[derive(Debug)]
pub struct Flight<'a> {
    _guard: MutexGuard<'a, ()>,
}

/// What an increment-triggered sync ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LatestOutcome {
    /// The event reached the remote store.
    Synced,
    /// Older events were pending, so a full drain ran instead.
    Drained(DrainReport),
    Offline,
    /// Another pass was running; its holder drains again before letting go.
    Deferred,
    /// The push failed; the event stays pending.
    Failed(String),
}

pub struct SyncCoordinator {
    engine: SyncEngine,
    monitor: ConnectivityMonitor,
    flight: Mutex<()>,
    rerun: AtomicBool,
}

impl SyncCoordinator {
    pub fn new(engine: SyncEngine, monitor: ConnectivityMonitor) -> Self {
        Self {
            engine,
            monitor,
            flight: Mutex::new(()),
            rerun: AtomicBool::new(false),
        }
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Take the lock if it is free.
    pub fn try_begin(&self) -> Result<Flight<'_>, SyncError> {
        self.flight
            .try_lock()
            .map(|guard| Flight { _guard: guard })
            .map_err(|_| SyncError::InFlight)
    }

    /// Wait for the lock.
    pub async fn begin(&self) -> Flight<'_> {
        Flight {
            _guard: self.flight.lock().await,
        }
    }

    pub fn in_flight(&self) -> bool {
        self.flight.try_lock().is_err()
    }

    /// Manual "sync now": rejected while offline or while another pass runs.
    pub async fn sync_now(&self) -> Result<DrainReport, SyncError> {
        if !self.monitor.is_online() {
            tracing::warn!("manual sync rejected: offline");
            return Err(SyncError::Offline);
        }
        let flight = self.try_begin()?;
        let report = self.engine.drain(&flight).await;
        self.finish(flight).await;
        Ok(report)
    }

    /// Connectivity came back: drain once the lock is free.
    pub async fn on_reconnect(&self) -> DrainReport {
        let flight = self.begin().await;
        let report = self.engine.drain(&flight).await;
        self.finish(flight).await;
        report
    }

    /// Opportunistic push right after `event` was appended.
    ///
    /// Only `event` is pushed when it is the oldest pending one; otherwise a
    /// drain runs so log order is kept.
    pub async fn sync_latest(&self, event: &IncrementEvent) -> LatestOutcome {
        if !self.monitor.is_online() {
            return LatestOutcome::Offline;
        }
        let flight = match self.try_begin() {
            Ok(flight) => flight,
            Err(_) => {
                self.rerun.store(true, Ordering::SeqCst);
                let Ok(flight) = self.try_begin() else {
                    tracing::debug!("sync pass in flight; deferring event {}", event.local_id);
                    return LatestOutcome::Deferred;
                };
                self.rerun.store(false, Ordering::SeqCst);
                let report = self.engine.drain(&flight).await;
                self.finish(flight).await;
                return LatestOutcome::Drained(report);
            }
        };

        let head = self.engine.first_pending_id().await;
        let outcome = if head.as_ref() != Some(&event.local_id) {
            LatestOutcome::Drained(self.engine.drain(&flight).await)
        } else {
            match self.engine.sync_one(&flight, event).await {
                Ok(()) => LatestOutcome::Synced,
                Err(err) => LatestOutcome::Failed(err.to_string()),
            }
        };
        self.finish(flight).await;
        outcome
    }

    /// Release `flight`, then drain again for as long as deferred taps keep
    /// flagging a rerun.
    ///
    /// Stops when the flag is clear, when offline (reconnect drains later)
    /// or when another pass holds the lock, since that holder runs this same
    /// check on release.
    pub async fn finish(&self, flight: Flight<'_>) {
        drop(flight);
        while self.rerun.load(Ordering::SeqCst) && self.monitor.is_online() {
            let Ok(flight) = self.try_begin() else { break };
            if !self.rerun.swap(false, Ordering::SeqCst) {
                break;
            }
            let report = self.engine.drain(&flight).await;
            tracing::debug!(
                "rerun drain for deferred taps: {} synced, {} pending",
                report.synced,
                report.pending_after
            );
            drop(flight);
        }
    }

    pub async fn status(&self) -> SyncStatus {
        SyncStatus {
            pending: self.engine.pending_count().await,
            last_synced_at: self.engine.last_synced_at(),
            in_flight: self.in_flight(),
            online: self.monitor.is_online(),
        }
    }

    /// Drain on every offline → online transition until `shutdown` fires or
    /// the monitor goes away.
    pub fn spawn_reconnect_listener(
        self: &Arc<Self>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        let mut changes = self.monitor.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    change = changes.changed() => {
                        match change {
                            Some(true) => {
                                let report = coordinator.on_reconnect().await;
                                tracing::info!(
                                    "reconnect drain: {} synced, {} pending",
                                    report.synced,
                                    report.pending_after
                                );
                            }
                            Some(false) => tracing::info!("offline; increments stay local"),
                            None => break,
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::NaiveDate;
    use japa_core::{FixedClock, LocalEventLog, StorageKey, UserId};
    use tempfile::TempDir;

    use crate::remote::MemoryRemoteStore;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 9).unwrap()
    }

    type Fixture = (
        SyncCoordinator,
        Arc<Mutex<LocalEventLog>>,
        Arc<MemoryRemoteStore>,
    );

    fn coordinator(home: &TempDir, online: bool) -> Fixture {
        let key = StorageKey::new("phone", "alice");
        let log = Arc::new(Mutex::new(LocalEventLog::open_at(home.path(), &key).unwrap()));
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = SyncEngine::new(
            UserId::from("alice"),
            log.clone(),
            remote.clone(),
            Arc::new(FixedClock::on(day())),
            Duration::from_secs(5),
        );
        (
            SyncCoordinator::new(engine, ConnectivityMonitor::new(online)),
            log,
            remote,
        )
    }

    #[tokio::test]
    async fn second_flight_is_refused_until_the_first_drops() {
        let home = TempDir::new().unwrap();
        let (coordinator, _, _) = coordinator(&home, true);

        let flight = coordinator.try_begin().unwrap();
        assert!(coordinator.in_flight());
        assert!(matches!(coordinator.try_begin(), Err(SyncError::InFlight)));
        drop(flight);

        assert!(!coordinator.in_flight());
        assert!(coordinator.try_begin().is_ok());
    }

    #[tokio::test]
    async fn sync_now_is_rejected_while_a_pass_runs() {
        let home = TempDir::new().unwrap();
        let (coordinator, _, _) = coordinator(&home, true);

        let _flight = coordinator.begin().await;
        let err = coordinator.sync_now().await.unwrap_err();
        assert!(matches!(err, SyncError::InFlight));
    }

    #[tokio::test]
    async fn sync_now_offline_is_rejected_before_locking() {
        let home = TempDir::new().unwrap();
        let (coordinator, _, _) = coordinator(&home, false);

        let err = coordinator.sync_now().await.unwrap_err();
        assert!(matches!(err, SyncError::Offline));
        assert!(!coordinator.in_flight());
    }

    #[tokio::test]
    async fn latest_is_deferred_while_locked_and_offline_when_offline() {
        let home = TempDir::new().unwrap();
        let (coordinator, log, remote) = coordinator(&home, true);
        let event = IncrementEvent::new(day(), 1, "om", chrono::Utc::now()).unwrap();
        log.lock().await.append(event.clone()).unwrap();

        {
            let _flight = coordinator.begin().await;
            assert_eq!(coordinator.sync_latest(&event).await, LatestOutcome::Deferred);
        }

        coordinator.monitor().report(false);
        assert_eq!(coordinator.sync_latest(&event).await, LatestOutcome::Offline);
        assert_eq!(remote.count(&UserId::from("alice"), day()).await, 0);

        coordinator.monitor().report(true);
        assert_eq!(coordinator.sync_latest(&event).await, LatestOutcome::Synced);
        assert_eq!(remote.count(&UserId::from("alice"), day()).await, 1);
    }

    #[tokio::test]
    async fn finish_drains_taps_deferred_during_the_flight() {
        let home = TempDir::new().unwrap();
        let (coordinator, log, remote) = coordinator(&home, true);

        let flight = coordinator.begin().await;
        for _ in 0..2 {
            let event = IncrementEvent::new(day(), 1, "om", chrono::Utc::now()).unwrap();
            log.lock().await.append(event.clone()).unwrap();
            assert_eq!(coordinator.sync_latest(&event).await, LatestOutcome::Deferred);
        }
        assert_eq!(remote.count(&UserId::from("alice"), day()).await, 0);

        coordinator.finish(flight).await;
        assert!(!coordinator.in_flight());
        assert_eq!(log.lock().await.pending_count(), 0);
        assert_eq!(remote.count(&UserId::from("alice"), day()).await, 2);
        assert_eq!(remote.event_records().await.len(), 2);
    }

    #[tokio::test]
    async fn finish_without_deferred_taps_does_nothing() {
        let home = TempDir::new().unwrap();
        let (coordinator, log, remote) = coordinator(&home, true);
        let event = IncrementEvent::new(day(), 1, "om", chrono::Utc::now()).unwrap();
        log.lock().await.append(event).unwrap();

        let flight = coordinator.begin().await;
        coordinator.finish(flight).await;
        assert_eq!(log.lock().await.pending_count(), 1);
        assert!(remote.event_records().await.is_empty());
    }

    #[tokio::test]
    async fn deferred_taps_wait_for_reconnect_when_offline() {
        let home = TempDir::new().unwrap();
        let (coordinator, log, remote) = coordinator(&home, true);
        let event = IncrementEvent::new(day(), 1, "om", chrono::Utc::now()).unwrap();
        log.lock().await.append(event.clone()).unwrap();

        let flight = coordinator.begin().await;
        assert_eq!(coordinator.sync_latest(&event).await, LatestOutcome::Deferred);
        coordinator.monitor().report(false);
        coordinator.finish(flight).await;
        assert!(remote.event_records().await.is_empty());

        coordinator.monitor().report(true);
        let report = coordinator.on_reconnect().await;
        assert_eq!(report.synced, 1);
        assert_eq!(remote.count(&UserId::from("alice"), day()).await, 1);
    }
}
