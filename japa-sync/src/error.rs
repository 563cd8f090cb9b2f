//! Error types for japa-sync.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use japa_core::{EventId, StoreError};

/// Failures reported by a [`RemoteAggregateStore`](crate::remote::RemoteAggregateStore).
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The store cannot be reached right now; retry on the next trigger.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// An I/O error, with annotated path for context.
    #[error("remote I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("remote document JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Create-only write hit an existing document.
    #[error("remote document already exists: {0}")]
    AlreadyExists(String),
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local durable store failure.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Remote writes for one event did not finish in time; the event stays pending.
    #[error("sync of event {local_id} timed out after {after:?}")]
    Timeout { local_id: EventId, after: Duration },

    /// Explicit sync requested while the device is offline.
    #[error("cannot sync while offline; pending events are kept and will sync on reconnect")]
    Offline,

    /// Another sync pass holds the single-flight lock.
    #[error("a sync pass is already running")]
    InFlight,
}

/// Convenience constructor for [`RemoteError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RemoteError {
    RemoteError::Io {
        path: path.into(),
        source,
    }
}
