//! Session context tying the local store, remote store and live target together
//!
//! An [`AppContext`] is built once per process from a [`Config`] and passed
//! to whatever drives it. It owns the sync guard and the per-target apply
//! locks, so all operations issued through one context are serialized the
//! same way.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::activity::{ActivityEntry, ActivityLog, ActivityType};
use crate::apply::{ApplyOutcome, ProfileApplier};
use crate::backup::{BackupInfo, BackupManager};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::profile::{capture, CaptureRequest, Profile};
use crate::remote::{DriveRemote, MemoryRemote, RemoteStatus, RemoteStore, StaticTokenProvider};
use crate::store::ProfileStore;
use crate::sync::{Reconciler, SyncGuard, SyncPlan, SyncResult};

pub struct AppContext {
    config: Config,
    store: ProfileStore,
    remote: Option<Arc<dyn RemoteStore>>,
    applier: ProfileApplier,
    guard: SyncGuard,
    activity: Mutex<ActivityLog>,
    offline: bool,
}

impl AppContext {
    /// Build a context over an explicit remote; `None` leaves sync unconfigured
    pub fn new(config: Config, remote: Option<Arc<dyn RemoteStore>>) -> Result<Self> {
        let store = ProfileStore::open(config.profiles_dir()?)?;
        let applier = ProfileApplier::new(BackupManager::new(config.backups_dir()?), config.backup_keep)
            .with_lock_dir(config.locks_dir()?);
        let activity = ActivityLog::load(config.activity_path()?);
        let guard = SyncGuard::at(config.sync_lock_path()?);

        Ok(Self {
            config,
            store,
            remote,
            applier,
            guard,
            activity: Mutex::new(activity),
            offline: false,
        })
    }

    /// Build a context over a throwaway in-memory remote. Nothing synced
    /// through it outlives the context, and activity entries say so.
    pub fn offline(config: Config) -> Result<Self> {
        let remote: Arc<dyn RemoteStore> = Arc::new(MemoryRemote::new());
        let mut ctx = Self::new(config, Some(remote))?;
        ctx.offline = true;
        Ok(ctx)
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Build a context, connecting to Drive if an access token is configured
    pub async fn open(config: Config) -> Result<Self> {
        let remote: Option<Arc<dyn RemoteStore>> = match config.access_token() {
            Some(token) => {
                let drive = DriveRemote::new(config.remote.api_base.clone());
                drive.connect(&StaticTokenProvider::new(Some(token))).await?;
                Some(Arc::new(drive) as Arc<dyn RemoteStore>)
            }
            None => None,
        };
        Self::new(config, remote)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    fn activity(&self) -> MutexGuard<'_, ActivityLog> {
        self.activity.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, activity_type: ActivityType, description: impl Into<String>) {
        self.activity().record(activity_type, description);
    }

    /// Record a transfer, listing the profiles moved as details
    fn record_transfer(&self, activity_type: ActivityType, description: String, result: &SyncResult) {
        let description = if self.offline {
            format!("{} (offline, not persisted remotely)", description)
        } else {
            description
        };
        let names: Vec<&str> = result
            .uploaded
            .iter()
            .chain(&result.downloaded)
            .map(String::as_str)
            .collect();
        let entry = if names.is_empty() {
            ActivityEntry::new(activity_type, description)
        } else {
            ActivityEntry::with_details(activity_type, description, names.join(", "))
        };
        self.activity().record_entry(entry);
    }

    /// Log a failed operation to the activity log and hand the error back
    fn record_failure<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            self.record(ActivityType::Error, format!("{} failed: {}", operation, e));
        }
        result
    }

    fn remote(&self) -> Result<Arc<dyn RemoteStore>> {
        self.remote.clone().ok_or(Error::NotConfigured)
    }

    fn reconciler(&self) -> Result<Reconciler> {
        Ok(Reconciler::new(self.store.clone(), self.remote()?).with_guard(self.guard.clone()))
    }

    /// Capture the configured live target into a new stored profile
    pub fn capture(&self, mut request: CaptureRequest) -> Result<Profile> {
        let target = self.config.live_target()?;
        if request.device.is_none() {
            request.device = self.config.device_name.clone();
        }

        let profile = self.store.save(&capture(&target, &request)?)?;
        self.record(
            ActivityType::Capture,
            format!("Captured {} ({} files)", profile.name, profile.file_count()),
        );
        Ok(profile)
    }

    pub fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.store.list()
    }

    pub fn get_profile(&self, id: &str) -> Result<Profile> {
        self.store
            .get(id)?
            .ok_or_else(|| Error::NotFound(format!("profile {}", id)))
    }

    /// Delete the local copy only; remote copies are managed separately
    pub fn delete_profile(&self, id: &str) -> Result<()> {
        self.store.delete(id)?;
        self.record(ActivityType::Delete, format!("Deleted local profile {}", id));
        Ok(())
    }

    pub async fn delete_remote_profile(&self, id: &str) -> Result<()> {
        let remote = self.remote()?;
        remote.delete(id).await?;
        self.record(ActivityType::Delete, format!("Deleted remote profile {}", id));
        Ok(())
    }

    /// Apply a stored profile to the configured live target
    pub fn apply_profile(&self, id: &str) -> Result<ApplyOutcome> {
        let result = self.get_profile(id).and_then(|profile| {
            let target = self.config.live_target()?;
            self.applier.apply(&profile, &target)
        });
        let outcome = self.record_failure("Apply", result)?;

        if let Some(ref backup) = outcome.backup {
            self.activity().record_entry(ActivityEntry::with_details(
                ActivityType::Backup,
                format!("Backed up {} files", outcome.files_backed_up),
                backup.display().to_string(),
            ));
        }
        self.record(
            ActivityType::Apply,
            format!("Applied {} ({} files)", outcome.profile, outcome.files_written),
        );
        Ok(outcome)
    }

    /// Remote connectivity, without changing anything
    pub async fn status(&self) -> RemoteStatus {
        let Some(remote) = self.remote.as_ref() else {
            return RemoteStatus::default();
        };

        let connected = remote.is_connected();
        let identity = if connected {
            remote.identity().await.unwrap_or_else(|e| {
                tracing::debug!("Could not fetch remote identity: {}", e);
                None
            })
        } else {
            None
        };

        RemoteStatus {
            configured: true,
            connected,
            identity,
        }
    }

    pub async fn preview(&self) -> Result<SyncPlan> {
        self.reconciler()?.preview().await
    }

    pub async fn sync(&self) -> Result<SyncResult> {
        let result = match self.reconciler() {
            Ok(reconciler) => reconciler.sync().await,
            Err(e) => Err(e),
        };
        let result = self.record_failure("Sync", result)?;
        self.record_transfer(
            ActivityType::Sync,
            format!(
                "Synced: {} uploaded, {} downloaded",
                result.uploaded.len(),
                result.downloaded.len()
            ),
            &result,
        );
        Ok(result)
    }

    pub async fn push_all(&self) -> Result<SyncResult> {
        let result = match self.reconciler() {
            Ok(reconciler) => reconciler.push_all().await,
            Err(e) => Err(e),
        };
        let result = self.record_failure("Push all", result)?;
        self.record_transfer(
            ActivityType::PushAll,
            format!("Pushed {} profiles", result.uploaded.len()),
            &result,
        );
        Ok(result)
    }

    pub async fn pull_all(&self) -> Result<SyncResult> {
        let result = match self.reconciler() {
            Ok(reconciler) => reconciler.pull_all().await,
            Err(e) => Err(e),
        };
        let result = self.record_failure("Pull all", result)?;
        self.record_transfer(
            ActivityType::PullAll,
            format!("Pulled {} profiles", result.downloaded.len()),
            &result,
        );
        Ok(result)
    }

    pub fn backups(&self) -> Result<Vec<BackupInfo>> {
        self.applier.backups().list_backups()
    }

    pub fn restore_backup(&self, backup_path: &Path) -> Result<usize> {
        let restored = self.record_failure("Restore", self.applier.restore(backup_path))?;
        self.record(
            ActivityType::Restore,
            format!("Restored {} files from {}", restored, backup_path.display()),
        );
        Ok(restored)
    }

    /// Most recent activity, newest first
    pub fn recent_activity(&self, count: usize) -> Vec<ActivityEntry> {
        self.activity().recent(count).to_vec()
    }
}
