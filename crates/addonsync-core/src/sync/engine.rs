//! Reconciliation between the local profile store and a remote store

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{Error, Result};
use crate::remote::RemoteStore;
use crate::store::ProfileStore;
use crate::sync::guard::SyncGuard;
use crate::sync::plan::{PlannedDownload, SyncPlan};

/// Result of a sync operation
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    /// Names of profiles written to the remote store
    pub uploaded: Vec<String>,
    /// Names of profiles written to the local store.
    ///
    /// Only downloads that were persisted are listed. A planned download
    /// dropped because the local copy changed during the pass, or because the
    /// remote blob turned out missing or corrupt, is left out; use
    /// [`Reconciler::preview`] for the decisions themselves.
    pub downloaded: Vec<String>,
    /// Always empty: conflicts resolve whole-profile by timestamp
    pub conflicts: Vec<String>,
}

impl SyncResult {
    /// Total number of transfers
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.downloaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0 && self.conflicts.is_empty()
    }
}

/// Last-write-wins reconciler.
///
/// Operations run one at a time per [`SyncGuard`]; a second request while one
/// is running fails with [`Error::Busy`].
pub struct Reconciler {
    store: ProfileStore,
    remote: Arc<dyn RemoteStore>,
    guard: SyncGuard,
}

impl Reconciler {
    pub fn new(store: ProfileStore, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            remote,
            guard: SyncGuard::new(),
        }
    }

    /// Share an in-flight guard with other reconcilers over the same store
    pub fn with_guard(mut self, guard: SyncGuard) -> Self {
        self.guard = guard;
        self
    }

    pub fn guard(&self) -> &SyncGuard {
        &self.guard
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.remote.is_connected() {
            Ok(())
        } else {
            Err(Error::RemoteUnavailable("no authorized session".to_string()))
        }
    }

    /// Decide transfers without performing any of them
    pub async fn preview(&self) -> Result<SyncPlan> {
        self.ensure_connected()?;
        let local = self.store.list()?;
        let remote = self.remote.list_all().await?;
        Ok(SyncPlan::compute(&local, &remote))
    }

    /// Run one reconciliation pass.
    ///
    /// Both sides are listed once, every transfer is decided, then uploads
    /// and downloads run in order. Each download re-checks the local record
    /// first so a write made during the pass is never clobbered.
    pub async fn sync(&self) -> Result<SyncResult> {
        let _in_flight = self.guard.try_begin("sync")?;
        self.ensure_connected()?;
        let start = Instant::now();

        let local = self.store.list()?;
        let remote = self.remote.list_all().await?;
        tracing::info!(
            "Reconciling {} local and {} remote profiles",
            local.len(),
            remote.len()
        );

        let plan = SyncPlan::compute(&local, &remote);
        let mut result = SyncResult::default();

        for profile in &plan.uploads {
            let modified_time = self.remote.put(profile).await?;
            self.store.raise_timestamp(&profile.id, modified_time)?;
            result.uploaded.push(profile.name.clone());
        }

        for download in &plan.downloads {
            if self.download(download).await? {
                result.downloaded.push(download.name.clone());
            }
        }

        tracing::info!(
            "Sync finished in {:.1?}: {} uploaded, {} downloaded",
            start.elapsed(),
            result.uploaded.len(),
            result.downloaded.len()
        );
        Ok(result)
    }

    /// Fetch and persist one planned download. Returns false when skipped.
    async fn download(&self, download: &PlannedDownload) -> Result<bool> {
        match self.store.get(&download.id) {
            Ok(Some(current)) if current.updated_at >= download.modified_time => {
                tracing::debug!(
                    "{}: changed locally during sync, keeping local copy",
                    download.name
                );
                return Ok(false);
            }
            Ok(_) => {}
            Err(e @ Error::CorruptRecord { .. }) => {
                tracing::warn!("Replacing corrupt local record: {}", e);
            }
            Err(e) => return Err(e),
        }

        let profile = match self.remote.get(&download.key).await {
            Ok(profile) => profile,
            Err(e) if !e.is_systemic() => {
                tracing::warn!("Skipping remote profile {}: {}", download.name, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        self.store.save_synced(&profile, download.modified_time)?;
        Ok(true)
    }

    /// Upload every local profile, overwriting remote copies
    pub async fn push_all(&self) -> Result<SyncResult> {
        let _in_flight = self.guard.try_begin("push-all")?;
        self.ensure_connected()?;

        let mut result = SyncResult::default();
        for profile in self.store.list()? {
            let modified_time = self.remote.put(&profile).await?;
            self.store.raise_timestamp(&profile.id, modified_time)?;
            result.uploaded.push(profile.name);
        }

        tracing::info!("Pushed {} profiles", result.uploaded.len());
        Ok(result)
    }

    /// Download every remote profile, overwriting local copies
    pub async fn pull_all(&self) -> Result<SyncResult> {
        let _in_flight = self.guard.try_begin("pull-all")?;
        self.ensure_connected()?;

        let mut result = SyncResult::default();
        for record in self.remote.list_all().await? {
            self.store.save_synced(&record.profile, record.modified_time)?;
            result.downloaded.push(record.name);
        }

        tracing::info!("Pulled {} profiles", result.downloaded.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{GameVariant, Profile};
    use crate::remote::{blob_name, MemoryRemote, RemoteRecord};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use tempfile::TempDir;

    /// Something that happens between listing both sides and transferring
    enum Interleave {
        LocalEdit(ProfileStore, Profile),
        RemoteDelete(String),
    }

    /// Remote that runs one interleaved change right after `list_all`
    struct InterleavedRemote {
        inner: Arc<MemoryRemote>,
        change: Interleave,
    }

    #[async_trait]
    impl RemoteStore for InterleavedRemote {
        async fn list_all(&self) -> Result<Vec<RemoteRecord>> {
            let records = self.inner.list_all().await?;
            match self.change {
                Interleave::LocalEdit(ref store, ref profile) => {
                    store.save_synced(profile, profile.updated_at)?;
                }
                Interleave::RemoteDelete(ref id) => self.inner.delete(id).await?,
            }
            Ok(records)
        }

        async fn get(&self, key: &str) -> Result<Profile> {
            self.inner.get(key).await
        }

        async fn put(&self, profile: &Profile) -> Result<DateTime<Utc>> {
            self.inner.put(profile).await
        }

        async fn delete(&self, id: &str) -> Result<()> {
            self.inner.delete(id).await
        }

        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }
    }

    fn setup() -> (TempDir, ProfileStore, Arc<MemoryRemote>, Reconciler) {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles")).unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let reconciler = Reconciler::new(store.clone(), remote.clone());
        (dir, store, remote, reconciler)
    }

    #[tokio::test]
    async fn test_sync_converges() {
        let (_dir, store, remote, reconciler) = setup();
        let saved = store
            .save(&Profile::new("Mythic", GameVariant::Retail, "ACC"))
            .unwrap();

        let first = reconciler.sync().await.unwrap();
        assert_eq!(first.uploaded, vec!["Mythic"]);
        assert!(first.downloaded.is_empty());
        assert!(first.conflicts.is_empty());
        assert!(remote.contains(&saved.id));

        let second = reconciler.sync().await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_newer_remote_is_downloaded() {
        let (_dir, store, remote, reconciler) = setup();
        let saved = store
            .save(&Profile::new("Raid", GameVariant::Retail, "ACC"))
            .unwrap();
        reconciler.sync().await.unwrap();

        let mut edited = saved.clone();
        edited.description = Some("edited elsewhere".to_string());
        edited.updated_at = saved.updated_at + Duration::seconds(30);
        remote.put(&edited).await.unwrap();

        let result = reconciler.sync().await.unwrap();
        assert_eq!(result.downloaded, vec!["Raid"]);

        let local = store.get(&saved.id).unwrap().unwrap();
        assert_eq!(local.description.as_deref(), Some("edited elsewhere"));
        assert_eq!(Some(local.updated_at), remote.modified_time(&saved.id));
    }

    #[tokio::test]
    async fn test_disconnected_remote_fails() {
        let (_dir, _store, remote, reconciler) = setup();
        remote.set_connected(false);
        assert!(matches!(
            reconciler.sync().await,
            Err(Error::RemoteUnavailable(_))
        ));
        assert!(matches!(
            reconciler.preview().await,
            Err(Error::RemoteUnavailable(_))
        ));
        // the guard is released after a failed run
        assert!(!reconciler.guard().is_running());
    }

    #[tokio::test]
    async fn test_busy_guard_rejects_operations() {
        let (_dir, _store, _remote, reconciler) = setup();
        let _held = reconciler.guard().try_begin("test").unwrap();

        assert!(matches!(reconciler.sync().await, Err(Error::Busy(_))));
        assert!(matches!(reconciler.push_all().await, Err(Error::Busy(_))));
        assert!(matches!(reconciler.pull_all().await, Err(Error::Busy(_))));
    }

    #[tokio::test]
    async fn test_corrupt_remote_blob_does_not_block_others() {
        let (_dir, store, remote, reconciler) = setup();
        let good = Profile::new("Good", GameVariant::Retail, "ACC");
        remote.put(&good).await.unwrap();
        remote.insert_raw(blob_name("bad"), "not json", Utc::now());

        let result = reconciler.sync().await.unwrap();
        assert_eq!(result.downloaded, vec!["Good"]);
        assert!(store.get(&good.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_local_edit_during_sync_is_kept() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles")).unwrap();
        let inner = Arc::new(MemoryRemote::new());

        let saved = store
            .save(&Profile::new("Raid", GameVariant::Retail, "ACC"))
            .unwrap();
        let mut remote_copy = saved.clone();
        remote_copy.description = Some("from the laptop".to_string());
        remote_copy.updated_at = saved.updated_at + Duration::milliseconds(1);
        inner.put(&remote_copy).await.unwrap();

        // the user edits locally after the pass listed both sides
        let mut edited = saved.clone();
        edited.description = Some("edited here".to_string());
        edited.updated_at = saved.updated_at + Duration::milliseconds(2);
        let remote = InterleavedRemote {
            inner: inner.clone(),
            change: Interleave::LocalEdit(store.clone(), edited),
        };
        let reconciler = Reconciler::new(store.clone(), Arc::new(remote));

        let result = reconciler.sync().await.unwrap();
        assert!(result.downloaded.is_empty());
        let local = store.get(&saved.id).unwrap().unwrap();
        assert_eq!(local.description.as_deref(), Some("edited here"));
    }

    #[tokio::test]
    async fn test_remote_deleted_during_sync_is_skipped() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::open(dir.path().join("profiles")).unwrap();
        let inner = Arc::new(MemoryRemote::new());

        let gone = Profile::new("Gone", GameVariant::Retail, "ACC");
        let kept = Profile::new("Kept", GameVariant::Retail, "ACC");
        inner.put(&gone).await.unwrap();
        inner.put(&kept).await.unwrap();

        let remote = InterleavedRemote {
            inner,
            change: Interleave::RemoteDelete(gone.id.clone()),
        };
        let reconciler = Reconciler::new(store.clone(), Arc::new(remote));

        let result = reconciler.sync().await.unwrap();
        assert_eq!(result.downloaded, vec!["Kept"]);
        assert!(store.get(&gone.id).unwrap().is_none());
        assert!(store.get(&kept.id).unwrap().is_some());
    }
}
