//! # japa-sync
//!
//! Offline-first sync of the local increment log to the shared remote
//! aggregate.
//!
//! Open a [`CounterSession`] to get the user-facing controls (increment,
//! sync now, reset, status). Underneath, the [`SyncCoordinator`] guards the
//! [`SyncEngine`] so at most one sync pass runs at a time, whichever trigger
//! started it.

pub mod connectivity;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod file_remote;
pub mod remote;
pub mod session;

pub use connectivity::{ConnectivityChanges, ConnectivityMonitor};
pub use coordinator::{Flight, LatestOutcome, SyncCoordinator};
pub use engine::{DrainFailure, DrainReport, SyncEngine, SyncStatus};
pub use error::{RemoteError, SyncError};
pub use file_remote::FileRemoteStore;
pub use remote::{MemoryRemoteStore, RemoteAggregateStore};
pub use session::{remote_from_config, CounterSession, IncrementReceipt, SessionStatus};
