//! In-process remote store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{blob_name, encode_blob, record_from_blob, RemoteRecord, RemoteStore};
use crate::error::{Error, Result};
use crate::profile::Profile;

#[derive(Debug, Clone)]
struct Blob {
    modified_time: DateTime<Utc>,
    body: Vec<u8>,
}

/// Remote store kept in memory, keyed by blob name.
///
/// By default a put records the profile's `updated_at` as the blob's
/// modification time, the way the Drive backend requests it. With
/// [`MemoryRemote::with_server_clock`] the store stamps blobs with its own
/// clock instead.
#[derive(Debug)]
pub struct MemoryRemote {
    blobs: Mutex<BTreeMap<String, Blob>>,
    connected: AtomicBool,
    server_clock: bool,
    identity: Option<String>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    /// A connected, empty store
    pub fn new() -> Self {
        Self {
            blobs: Mutex::new(BTreeMap::new()),
            connected: AtomicBool::new(true),
            server_clock: false,
            identity: None,
        }
    }

    /// Stamp puts with the current time rather than the requested one
    pub fn with_server_clock(mut self) -> Self {
        self.server_clock = true;
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    fn blobs(&self) -> MutexGuard<'_, BTreeMap<String, Blob>> {
        // a poisoned map is still structurally valid
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::RemoteUnavailable("not connected".to_string()))
        }
    }

    /// Simulate losing or regaining the session
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Store an arbitrary blob body under `name`
    pub fn insert_raw(&self, name: impl Into<String>, body: impl Into<Vec<u8>>, modified_time: DateTime<Utc>) {
        self.blobs().insert(
            name.into(),
            Blob {
                modified_time,
                body: body.into(),
            },
        );
    }

    /// Override the modification time of the blob holding `id`
    pub fn set_modified_time(&self, id: &str, modified_time: DateTime<Utc>) -> bool {
        match self.blobs().get_mut(&blob_name(id)) {
            Some(blob) => {
                blob.modified_time = modified_time;
                true
            }
            None => false,
        }
    }

    pub fn modified_time(&self, id: &str) -> Option<DateTime<Utc>> {
        self.blobs().get(&blob_name(id)).map(|b| b.modified_time)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.blobs().contains_key(&blob_name(id))
    }

    pub fn len(&self) -> usize {
        self.blobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs().is_empty()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn list_all(&self) -> Result<Vec<RemoteRecord>> {
        self.ensure_connected()?;

        let snapshot: Vec<(String, Blob)> = self
            .blobs()
            .iter()
            .map(|(name, blob)| (name.clone(), blob.clone()))
            .collect();

        let mut records = Vec::with_capacity(snapshot.len());
        for (name, blob) in snapshot {
            match record_from_blob(name.clone(), &name, blob.modified_time, &blob.body) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping remote blob {}: {}", name, e),
            }
        }
        Ok(records)
    }

    async fn get(&self, key: &str) -> Result<Profile> {
        self.ensure_connected()?;
        let blob = self
            .blobs()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        super::decode_blob(key, &blob.body)
    }

    async fn put(&self, profile: &Profile) -> Result<DateTime<Utc>> {
        self.ensure_connected()?;
        let modified_time = if self.server_clock {
            Utc::now()
        } else {
            profile.updated_at
        };
        let body = encode_blob(profile)?;
        self.blobs().insert(
            blob_name(&profile.id),
            Blob {
                modified_time,
                body,
            },
        );
        Ok(modified_time)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.ensure_connected()?;
        self.blobs().remove(&blob_name(id));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn identity(&self) -> Result<Option<String>> {
        self.ensure_connected()?;
        Ok(self.identity.clone())
    }
}
