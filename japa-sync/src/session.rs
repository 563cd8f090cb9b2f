//! Counter session: the user-facing controls wired to the local store and
//! the sync machinery.
//!
//! Collaborators (remote store, connectivity monitor, clock) are passed in by
//! the caller, which also owns the session's lifetime.
//! [`CounterSession::open_configured`] derives them from a [`Config`].

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use japa_core::{
    Clock, Config, IncrementEvent, LocalEventLog, StorageKey, StoreError, SystemClock,
    TodayAggregate, TodayAggregateCache,
};

use crate::connectivity::ConnectivityMonitor;
use crate::coordinator::{LatestOutcome, SyncCoordinator};
use crate::engine::{DrainReport, SyncEngine, SyncStatus};
use crate::error::SyncError;
use crate::file_remote::FileRemoteStore;
use crate::remote::{MemoryRemoteStore, RemoteAggregateStore};

/// Result of one tap on the increment control.
#[derive(Debug, Clone, Serialize)]
pub struct IncrementReceipt {
    pub event: IncrementEvent,
    /// Today's displayed count after the tap.
    pub today_count: u64,
    /// Whether the event already reached the remote store.
    pub synced: bool,
    /// Set when the event is durable but the today snapshot could not be saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_warning: Option<String>,
}

/// Remote store and initial connectivity for `config`.
///
/// A configured `remote_root` is backed by [`FileRemoteStore`] and starts
/// online when the directory is present and `assume_online` is set. Without
/// one, events stay local: the store is process-local and the monitor starts
/// offline.
pub fn remote_from_config(
    config: &Config,
) -> (Arc<dyn RemoteAggregateStore>, ConnectivityMonitor) {
    match &config.remote_root {
        Some(root) => {
            let store = FileRemoteStore::new(root);
            let online = config.assume_online && store.is_reachable();
            if !store.is_reachable() {
                tracing::warn!(
                    "remote root {} is not reachable; starting offline",
                    root.display()
                );
            }
            (Arc::new(store), ConnectivityMonitor::new(online))
        }
        None => (
            Arc::new(MemoryRemoteStore::new()),
            ConnectivityMonitor::new(false),
        ),
    }
}

/// Status readout combining sync state and today's count.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    #[serde(flatten)]
    pub sync: SyncStatus,
    pub today: TodayAggregate,
}

pub struct CounterSession {
    key: StorageKey,
    default_category: String,
    log: Arc<Mutex<LocalEventLog>>,
    today: Mutex<TodayAggregateCache>,
    clock: Arc<dyn Clock>,
    coordinator: Arc<SyncCoordinator>,
}

impl CounterSession {
    /// Open the local store for the configured `(device, user)` and wire it to
    /// `remote` and `monitor`.
    pub fn open_at(
        home: &Path,
        config: &Config,
        remote: Arc<dyn RemoteAggregateStore>,
        monitor: ConnectivityMonitor,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let key = config.storage_key();
        let log = LocalEventLog::open_at(home, &key)?;
        let today = TodayAggregateCache::open_at(home, &key, clock.clone(), log.load_all())?;
        tracing::debug!(
            "opened session for {}/{} with {} events ({} pending)",
            key.device,
            key.user,
            log.len(),
            log.pending_count()
        );

        let log = Arc::new(Mutex::new(log));
        let engine = SyncEngine::new(
            config.user_id.clone(),
            log.clone(),
            remote,
            clock.clone(),
            config.write_timeout(),
        );
        let coordinator = Arc::new(SyncCoordinator::new(engine, monitor));

        Ok(Self {
            key,
            default_category: config.default_category.clone(),
            log,
            today: Mutex::new(today),
            clock,
            coordinator,
        })
    }

    /// Open with the remote store and starting connectivity `config` implies,
    /// on the wall clock.
    pub fn open_configured(home: &Path, config: &Config) -> Result<Self, StoreError> {
        let (remote, monitor) = remote_from_config(config);
        Self::open_at(home, config, remote, monitor, Arc::new(SystemClock))
    }

    pub fn key(&self) -> &StorageKey {
        &self.key
    }

    pub fn coordinator(&self) -> &Arc<SyncCoordinator> {
        &self.coordinator
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        self.coordinator.monitor()
    }

    /// Record one tap: durable append, optimistic display update, then an
    /// opportunistic push when online.
    ///
    /// A failed append is returned and nothing else happens; the caller must
    /// tell the user the tap was not saved.
    pub async fn increment(
        &self,
        delta: u32,
        category: Option<&str>,
    ) -> Result<IncrementReceipt, SyncError> {
        let category = category.unwrap_or(self.default_category.as_str());
        let event = IncrementEvent::new(self.clock.today(), delta, category, self.clock.now())?;
        self.log.lock().await.append(event.clone())?;

        let (today_count, cache_warning) = {
            let mut today = self.today.lock().await;
            match today.apply_increment(delta) {
                Ok(count) => (count, None),
                Err(err) => {
                    tracing::warn!("today snapshot not saved: {err}");
                    (today.snapshot().count, Some(err.to_string()))
                }
            }
        };

        match self.coordinator.sync_latest(&event).await {
            LatestOutcome::Failed(reason) => {
                tracing::debug!("opportunistic sync failed: {reason}");
            }
            LatestOutcome::Drained(report) if report.failed.is_some() => {
                tracing::debug!("opportunistic drain stopped early: {:?}", report.failed);
            }
            _ => {}
        }
        let synced = self
            .log
            .lock()
            .await
            .get(&event.local_id)
            .map(|e| e.synced)
            .unwrap_or(false);

        Ok(IncrementReceipt {
            event,
            today_count,
            synced,
            cache_warning,
        })
    }

    /// Manual "sync now".
    pub async fn sync_now(&self) -> Result<DrainReport, SyncError> {
        self.coordinator.sync_now().await
    }

    pub async fn today_count(&self) -> Result<u64, StoreError> {
        self.today.lock().await.current_count()
    }

    /// Zero today's displayed count. History and pending events are kept.
    pub async fn reset_today(&self) -> Result<(), StoreError> {
        self.today.lock().await.reset()
    }

    pub async fn pending_count(&self) -> usize {
        self.log.lock().await.pending_count()
    }

    pub async fn events(&self) -> Vec<IncrementEvent> {
        self.log.lock().await.load_all().to_vec()
    }

    pub async fn status(&self) -> Result<SessionStatus, StoreError> {
        let today = {
            let mut cache = self.today.lock().await;
            cache.current_count()?;
            cache.snapshot()
        };
        Ok(SessionStatus {
            sync: self.coordinator.status().await,
            today,
        })
    }

    /// Drain once if online with events waiting, as after a restart.
    pub async fn drain_on_start(&self) -> Option<DrainReport> {
        if !self.monitor().is_online() || self.pending_count().await == 0 {
            return None;
        }
        Some(self.coordinator.on_reconnect().await)
    }

    /// Start draining on every reconnect until `shutdown` fires.
    pub fn spawn_reconnect_listener(&self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        self.coordinator.spawn_reconnect_listener(shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use japa_core::{DeviceProfile, UserId};
    use tempfile::TempDir;

    fn config(remote_root: Option<std::path::PathBuf>) -> Config {
        let mut config = Config::new(UserId::from("alice"), DeviceProfile::from("phone"));
        config.remote_root = remote_root;
        config
    }

    #[test]
    fn no_remote_root_starts_offline() {
        let (_, monitor) = remote_from_config(&config(None));
        assert!(!monitor.is_online());
    }

    #[test]
    fn reachable_remote_root_starts_online() {
        let shared = TempDir::new().unwrap();
        let (_, monitor) = remote_from_config(&config(Some(shared.path().to_path_buf())));
        assert!(monitor.is_online());
    }

    #[test]
    fn missing_or_distrusted_remote_root_starts_offline() {
        let shared = TempDir::new().unwrap();
        let (_, monitor) = remote_from_config(&config(Some(shared.path().join("gone"))));
        assert!(!monitor.is_online());

        let mut distrusted = config(Some(shared.path().to_path_buf()));
        distrusted.assume_online = false;
        let (_, monitor) = remote_from_config(&distrusted);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn drain_on_start_only_runs_with_pending_events_online() {
        let home = TempDir::new().unwrap();
        let shared = TempDir::new().unwrap();
        let cfg = config(Some(shared.path().to_path_buf()));

        {
            let offline = CounterSession::open_at(
                home.path(),
                &cfg,
                Arc::new(FileRemoteStore::new(shared.path())),
                ConnectivityMonitor::new(false),
                Arc::new(SystemClock),
            )
            .unwrap();
            assert!(offline.drain_on_start().await.is_none());
            offline.increment(2, None).await.unwrap();
        }

        let session = CounterSession::open_configured(home.path(), &cfg).unwrap();
        let report = session.drain_on_start().await.expect("drained");
        assert_eq!(report.synced, 1);
        assert!(session.drain_on_start().await.is_none());
    }
}
