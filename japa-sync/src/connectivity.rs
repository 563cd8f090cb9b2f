//! Connectivity monitor: a pure observer of the platform online/offline
//! signal.
//!
//! Observations are fed in with [`ConnectivityMonitor::report`]; subscribers
//! hear about each genuine transition exactly once, never about repeated
//! reports of the same state. Without a platform signal the monitor is
//! created with [`ConnectivityMonitor::assume_online`] and sync failures are
//! left to the engine's own error handling.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Transitions a slow subscriber may fall behind by before it lags.
const TRANSITION_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    transitions: broadcast::Sender<bool>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (state, _) = watch::channel(online);
        let (transitions, _) = broadcast::channel(TRANSITION_BUFFER);
        Self {
            state: Arc::new(state),
            transitions,
        }
    }

    /// Degraded mode for platforms without a reachability signal.
    pub fn assume_online() -> Self {
        Self::new(true)
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Record a platform observation.
    ///
    /// Returns `true` if this was a transition (and subscribers were
    /// notified), `false` if the state was unchanged.
    pub fn report(&self, online: bool) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            // Queued under the state lock so every subscriber sees transitions
            // in the order they happened. No subscribers is not an error.
            let _ = self.transitions.send(online);
            true
        });
        if changed {
            tracing::info!(
                "connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }

    /// Queue of every transition reported after this call.
    pub fn subscribe(&self) -> ConnectivityChanges {
        ConnectivityChanges {
            rx: self.transitions.subscribe(),
        }
    }

    /// Run `callback` once per transition on a background task.
    ///
    /// The task ends when every monitor handle has been dropped.
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut changes = self.subscribe();
        tokio::spawn(async move {
            while let Some(online) = changes.changed().await {
                callback(online);
            }
        })
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::assume_online()
    }
}

/// Stream of connectivity transitions.
///
/// Each subscriber has its own queue, so an `online -> offline -> online`
/// flap that happens while it is busy is still delivered as two transitions.
#[derive(Debug)]
pub struct ConnectivityChanges {
    rx: broadcast::Receiver<bool>,
}

impl ConnectivityChanges {
    /// Wait for the next transition. `None` once the monitor is gone and the
    /// queue is empty.
    pub async fn changed(&mut self) -> Option<bool> {
        loop {
            match self.rx.recv().await {
                Ok(online) => return Some(online),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("connectivity subscriber lagged; {skipped} transitions dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn report_only_signals_transitions() {
        let monitor = ConnectivityMonitor::new(true);
        assert!(!monitor.report(true));
        assert!(monitor.report(false));
        assert!(!monitor.report(false));
        assert!(!monitor.is_online());
        assert!(monitor.report(true));
        assert!(monitor.is_online());
    }

    #[test]
    fn default_assumes_online() {
        assert!(ConnectivityMonitor::default().is_online());
    }

    #[tokio::test]
    async fn subscriber_sees_each_transition_once() {
        let monitor = ConnectivityMonitor::new(true);
        let mut changes = monitor.subscribe();

        monitor.report(true);
        monitor.report(false);
        assert_eq!(changes.changed().await, Some(false));

        monitor.report(false);
        monitor.report(true);
        assert_eq!(changes.changed().await, Some(true));

        let pending = tokio::time::timeout(Duration::from_millis(20), changes.changed()).await;
        assert!(pending.is_err(), "no further transition expected");
    }

    #[tokio::test]
    async fn flap_before_the_subscriber_polls_is_not_lost() {
        let monitor = ConnectivityMonitor::new(true);
        let mut changes = monitor.subscribe();

        assert!(monitor.report(false));
        assert!(monitor.report(true));

        assert_eq!(changes.changed().await, Some(false));
        assert_eq!(changes.changed().await, Some(true));
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn queued_transitions_drain_before_the_stream_ends() {
        let monitor = ConnectivityMonitor::new(false);
        let mut changes = monitor.subscribe();
        monitor.report(true);
        drop(monitor);

        assert_eq!(changes.changed().await, Some(true));
        assert_eq!(changes.changed().await, None);
    }

    #[tokio::test]
    async fn changes_end_when_monitor_dropped() {
        let monitor = ConnectivityMonitor::new(false);
        let mut changes = monitor.subscribe();
        drop(monitor);
        assert_eq!(changes.changed().await, None);
    }

    #[tokio::test]
    async fn on_change_fires_callback_per_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let seen = seen.clone();
            monitor.on_change(move |online| seen.lock().unwrap().push(online))
        };

        monitor.report(true);
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        monitor.report(true);
        monitor.report(false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(monitor);
        handle.await.expect("callback task");

        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }
}
