//! Directory-backed [`RemoteAggregateStore`] for a shared folder (network
//! mount, synced drive) reachable by every device of a user.
//!
//! ```text
//! <root>/
//!   counters/<user>_<YYYY-MM-DD>.json
//!   events/<record-uuid>.json
//! ```
//!
//! Every write first lands in a private `<name>.<uuid>.tmp`, so devices
//! writing the same document never share a temp file. Replacing writes then
//! rename it over the target. Create-only writes hard-link it into place,
//! which fails when the target exists, so an existing document is never
//! overwritten and a reader never sees a half-written one. A missing root means the share is not mounted and is reported
//! as [`RemoteError::Unavailable`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use japa_core::{RemoteDailyCounter, RemoteEventRecord, UserId};

use crate::error::{io_err, RemoteError};
use crate::remote::RemoteAggregateStore;

#[derive(Debug, Clone)]
pub struct FileRemoteStore {
    root: PathBuf,
}

impl FileRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the shared root is currently present.
    pub fn is_reachable(&self) -> bool {
        self.root.is_dir()
    }

    pub fn counter_path(&self, user: &UserId, date: NaiveDate) -> PathBuf {
        self.root
            .join("counters")
            .join(format!("{}.json", RemoteDailyCounter::doc_id(user, date)))
    }

    pub fn event_path(&self, record_id: &str) -> PathBuf {
        self.root.join("events").join(format!("{record_id}.json"))
    }

    async fn ensure_collection(&self, name: &str) -> Result<PathBuf, RemoteError> {
        if !self.is_reachable() {
            return Err(RemoteError::Unavailable(format!(
                "remote root {} is not mounted",
                self.root.display()
            )));
        }
        let dir = self.root.join(name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;
        Ok(dir)
    }
}

#[async_trait]
impl RemoteAggregateStore for FileRemoteStore {
    async fn read_counter(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<RemoteDailyCounter>, RemoteError> {
        self.ensure_collection("counters").await?;
        let path = self.counter_path(user, date);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    async fn create_counter(&self, counter: &RemoteDailyCounter) -> Result<(), RemoteError> {
        self.ensure_collection("counters").await?;
        let path = self.counter_path(&counter.user_id, counter.date);
        create_only(&path, counter, counter.id()).await
    }

    async fn merge_counter(&self, counter: &RemoteDailyCounter) -> Result<(), RemoteError> {
        self.ensure_collection("counters").await?;
        let path = self.counter_path(&counter.user_id, counter.date);
        replace(&path, counter).await
    }

    async fn create_event_record(
        &self,
        record: &RemoteEventRecord,
    ) -> Result<String, RemoteError> {
        self.ensure_collection("events").await?;
        let id = Uuid::new_v4().to_string();
        create_only(&self.event_path(&id), record, id.clone()).await?;
        Ok(id)
    }
}

async fn write_tmp<T: Serialize>(path: &Path, doc: &T) -> Result<PathBuf, RemoteError> {
    let json = serde_json::to_vec_pretty(doc)?;
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp = path.with_file_name(name);
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| io_err(&tmp, e))?;
    Ok(tmp)
}

async fn replace<T: Serialize>(path: &Path, doc: &T) -> Result<(), RemoteError> {
    let tmp = write_tmp(path, doc).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(io_err(path, err));
    }
    Ok(())
}

async fn create_only<T: Serialize>(path: &Path, doc: &T, id: String) -> Result<(), RemoteError> {
    let tmp = write_tmp(path, doc).await?;
    let linked = tokio::fs::hard_link(&tmp, path).await;
    let _ = tokio::fs::remove_file(&tmp).await;
    match linked {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(RemoteError::AlreadyExists(id)),
        Err(err) => Err(io_err(path, err)),
    }
}
