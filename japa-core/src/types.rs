//! Domain types for the japa counter.
//!
//! All types are serializable/deserializable via serde; field names are
//! `snake_case` on the wire for both the local store and the remote documents.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Name of the device profile the local store belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceProfile(pub String);

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DeviceProfile {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceProfile {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque, stable identifier of one local increment event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Key of the local durable store: one log per `(device, user)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey {
    pub device: DeviceProfile,
    pub user: UserId,
}

impl StorageKey {
    pub fn new(device: impl Into<DeviceProfile>, user: impl Into<UserId>) -> Self {
        Self {
            device: device.into(),
            user: user.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Sync state of a single event.
///
/// `Pending → Syncing → Synced`, with `Syncing → Pending` on failure.
/// `Synced` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Pending,
    Syncing,
    Synced,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Pending => write!(f, "pending"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// One user-initiated increment.
///
/// Immutable apart from `synced`, which only ever goes `false → true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementEvent {
    pub local_id: EventId,
    /// Calendar day the increment belongs to.
    pub date: NaiveDate,
    pub delta: u32,
    /// Mantra / label selected at the time of the tap.
    pub category: String,
    pub client_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub synced: bool,
}

impl IncrementEvent {
    /// Build a fresh, unsynced event with a newly generated id.
    pub fn new(
        date: NaiveDate,
        delta: u32,
        category: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        if delta == 0 {
            return Err(StoreError::InvalidDelta);
        }
        Ok(Self {
            local_id: EventId::generate(),
            date,
            delta,
            category: category.into(),
            client_timestamp: now,
            synced: false,
        })
    }

    pub fn state(&self) -> SyncState {
        if self.synced {
            SyncState::Synced
        } else {
            SyncState::Pending
        }
    }
}

/// Cached running total for one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodayAggregate {
    pub date: NaiveDate,
    pub count: u64,
}

impl TodayAggregate {
    pub fn empty(date: NaiveDate) -> Self {
        Self { date, count: 0 }
    }
}

/// Shared per-`(user, date)` counter document in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDailyCounter {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub count: u64,
    /// Last category used for this day.
    pub category: String,
    pub updated_at: DateTime<Utc>,
}

impl RemoteDailyCounter {
    /// Document id of the counter for `(user, date)`: `<user>_<YYYY-MM-DD>`.
    pub fn doc_id(user: &UserId, date: NaiveDate) -> String {
        format!("{}_{}", user.0, date.format("%Y-%m-%d"))
    }

    pub fn id(&self) -> String {
        Self::doc_id(&self.user_id, self.date)
    }
}

/// Audit-trail companion written once per synced event. Never read back by
/// the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEventRecord {
    pub user_id: UserId,
    pub local_id: EventId,
    pub date: NaiveDate,
    pub delta: u32,
    pub category: String,
    pub client_timestamp: DateTime<Utc>,
    pub synced_at: DateTime<Utc>,
}

impl RemoteEventRecord {
    pub fn from_event(user: &UserId, event: &IncrementEvent, synced_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user.clone(),
            local_id: event.local_id.clone(),
            date: event.date,
            delta: event.delta,
            category: event.category.clone(),
            client_timestamp: event.client_timestamp,
            synced_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn newtype_display() {
        assert_eq!(UserId::from("u-1").to_string(), "u-1");
        assert_eq!(DeviceProfile::from("phone").to_string(), "phone");
        assert_eq!(EventId::from("e-01").to_string(), "e-01");
    }

    #[test]
    fn generated_event_ids_are_distinct() {
        assert_ne!(EventId::generate(), EventId::generate());
    }

    #[test]
    fn new_event_is_pending() {
        let event = IncrementEvent::new(day(2026, 3, 1), 1, "om", Utc::now()).expect("event");
        assert!(!event.synced);
        assert_eq!(event.state(), SyncState::Pending);
    }

    #[test]
    fn zero_delta_is_rejected() {
        let err = IncrementEvent::new(day(2026, 3, 1), 0, "om", Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDelta));
    }

    #[test]
    fn counter_doc_id_is_user_and_iso_date() {
        let id = RemoteDailyCounter::doc_id(&UserId::from("alice"), day(2026, 1, 9));
        assert_eq!(id, "alice_2026-01-09");
    }

    #[test]
    fn event_deserializes_without_synced_flag() {
        let json = r#"{
            "local_id": "e-1",
            "date": "2026-02-02",
            "delta": 1,
            "category": "om",
            "client_timestamp": "2026-02-02T06:00:00Z"
        }"#;
        let event: IncrementEvent = serde_json::from_str(json).expect("deserialize");
        assert!(!event.synced);
        assert_eq!(event.date, day(2026, 2, 2));
    }

    #[test]
    fn sync_state_display() {
        assert_eq!(SyncState::Syncing.to_string(), "syncing");
        assert_eq!(SyncState::Synced.to_string(), "synced");
    }
}
