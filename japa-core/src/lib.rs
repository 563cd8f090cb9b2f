//! japa core library: domain types, local durable store, config, errors.
//!
//! Public API surface:
//! - [`types`]: newtypes and domain structs
//! - [`error`]: [`StoreError`]
//! - [`config`]: load / save / init of `~/.japa/config.yaml`
//! - [`event_log`]: [`LocalEventLog`], the append-only increment log
//! - [`today`]: [`TodayAggregateCache`] and the [`Clock`] it reads

mod atomic;
pub mod config;
pub mod error;
pub mod event_log;
pub mod paths;
pub mod today;
pub mod types;

pub use config::Config;
pub use error::StoreError;
pub use event_log::LocalEventLog;
pub use today::{Clock, FixedClock, SystemClock, TodayAggregateCache};
pub use types::{
    DeviceProfile, EventId, IncrementEvent, RemoteDailyCounter, RemoteEventRecord, StorageKey,
    SyncState, TodayAggregate, UserId,
};
