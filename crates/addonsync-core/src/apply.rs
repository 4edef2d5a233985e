//! Applying stored profiles to live targets under a backup scope

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::backup::BackupManager;
use crate::error::{Error, Result};
use crate::lock::{lock_name, FileLock};
use crate::profile::{plan_apply, write_plan, LiveTarget, Profile};

/// What an apply did
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplyOutcome {
    pub profile: String,
    pub files_written: usize,
    /// File keys whose scope the target does not support
    pub skipped: Vec<String>,
    /// Backup taken before writing, if any live file existed
    pub backup: Option<PathBuf>,
    pub files_backed_up: usize,
    pub backups_pruned: usize,
}

/// Writes profiles onto live targets, one operation per target at a time.
///
/// Every apply backs up the files it is about to replace and aborts before
/// writing anything if that backup cannot be completed. With a lock
/// directory set, the per-target claim also holds across processes.
#[derive(Debug)]
pub struct ProfileApplier {
    backups: BackupManager,
    keep: usize,
    active: Mutex<HashSet<PathBuf>>,
    lock_dir: Option<PathBuf>,
}

/// Exclusive claim on one target directory; released on drop
struct TargetLock<'a> {
    active: &'a Mutex<HashSet<PathBuf>>,
    key: PathBuf,
    _file: Option<FileLock>,
}

impl Drop for TargetLock<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.key);
    }
}

impl ProfileApplier {
    /// `keep` is the number of backups retained per account after an apply
    pub fn new(backups: BackupManager, keep: usize) -> Self {
        Self {
            backups,
            keep,
            active: Mutex::new(HashSet::new()),
            lock_dir: None,
        }
    }

    /// Keep one lock file per target under `dir`
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = Some(dir.into());
        self
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    fn lock(&self, target_dir: &Path) -> Result<TargetLock<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(target_dir.to_path_buf()) {
            return Err(Error::Busy(format!(
                "another apply or restore is writing to {}",
                target_dir.display()
            )));
        }
        drop(active);

        // the claim above is released by TargetLock's drop if this fails
        let mut lock = TargetLock {
            active: &self.active,
            key: target_dir.to_path_buf(),
            _file: None,
        };
        if let Some(ref dir) = self.lock_dir {
            let holder = format!("an apply or restore on {}", target_dir.display());
            lock._file = Some(FileLock::try_acquire(&dir.join(lock_name(target_dir)), &holder)?);
        }
        Ok(lock)
    }

    /// Back up, then write every enabled bundle of `profile` onto `target`
    pub fn apply(&self, profile: &Profile, target: &LiveTarget) -> Result<ApplyOutcome> {
        let account_dir = target.account_dir();
        let _lock = self.lock(&account_dir)?;

        let plan = plan_apply(profile, target);
        let backup = self
            .backups
            .backup(&target.account, &account_dir, plan.paths())?;

        let files_written = write_plan(&plan)?;
        tracing::info!(
            "Applied {} to {} ({} files)",
            profile.name,
            account_dir.display(),
            files_written
        );

        // retention is housekeeping; the apply already succeeded
        let backups_pruned = match self.backups.prune_account(&target.account, self.keep) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed to prune backups: {}", e);
                0
            }
        };

        Ok(ApplyOutcome {
            profile: profile.name.clone(),
            files_written,
            skipped: plan.skipped,
            files_backed_up: backup.files.len(),
            backup: backup.dir,
            backups_pruned,
        })
    }

    /// Restore a backup onto the directory it was taken from
    pub fn restore(&self, backup_path: &Path) -> Result<usize> {
        let info = self.backups.inspect(backup_path)?;
        let _lock = self.lock(&info.manifest.source_root)?;
        self.backups.restore(backup_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{AddonBundle, FileKey, GameVariant, RawContent};
    use std::fs;
    use tempfile::TempDir;

    fn profile_with(file: &str, contents: &str) -> Profile {
        let mut profile = Profile::new("Raid", GameVariant::Retail, "ACC");
        let mut bundle = AddonBundle {
            enabled: true,
            ..AddonBundle::default()
        };
        bundle
            .files
            .insert(FileKey::account(file), RawContent(contents.as_bytes().to_vec()));
        profile.addons.insert("Plater".to_string(), bundle);
        profile
    }

    fn setup() -> (TempDir, LiveTarget, ProfileApplier) {
        let dir = TempDir::new().unwrap();
        let target = LiveTarget::new(dir.path().join("wow"), GameVariant::Retail, "ACC");
        let applier = ProfileApplier::new(BackupManager::new(dir.path().join("backups")), 2);
        (dir, target, applier)
    }

    #[test]
    fn test_apply_backs_up_before_overwrite() {
        let (_dir, target, applier) = setup();
        let live = target.saved_variables_dir().join("Plater.lua");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "live").unwrap();

        let outcome = applier.apply(&profile_with("Plater.lua", "stored"), &target).unwrap();

        assert_eq!(outcome.files_written, 1);
        assert_eq!(outcome.files_backed_up, 1);
        assert_eq!(fs::read_to_string(&live).unwrap(), "stored");
        let backup = outcome.backup.unwrap();
        assert_eq!(
            fs::read_to_string(backup.join("SavedVariables/Plater.lua")).unwrap(),
            "live"
        );
    }

    #[test]
    fn test_apply_to_fresh_target_needs_no_backup() {
        let (_dir, target, applier) = setup();
        let outcome = applier.apply(&profile_with("Plater.lua", "stored"), &target).unwrap();
        assert!(outcome.backup.is_none());
        assert_eq!(
            fs::read_to_string(target.saved_variables_dir().join("Plater.lua")).unwrap(),
            "stored"
        );
    }

    #[test]
    fn test_busy_target_is_rejected() {
        let (_dir, target, applier) = setup();
        let _held = applier.lock(&target.account_dir()).unwrap();
        assert!(matches!(
            applier.apply(&profile_with("Plater.lua", "x"), &target),
            Err(Error::Busy(_))
        ));

        let other = LiveTarget::new(target.game_path.clone(), GameVariant::Retail, "OTHER");
        assert!(applier.apply(&profile_with("Plater.lua", "x"), &other).is_ok());
    }

    #[test]
    fn test_busy_target_across_appliers() {
        let (dir, target, applier) = setup();
        let locks = dir.path().join("locks");
        let applier = applier.with_lock_dir(&locks);
        let other = ProfileApplier::new(BackupManager::new(dir.path().join("backups")), 2)
            .with_lock_dir(&locks);

        let held = other.lock(&target.account_dir()).unwrap();
        assert!(matches!(
            applier.apply(&profile_with("Plater.lua", "x"), &target),
            Err(Error::Busy(_))
        ));

        drop(held);
        assert!(applier.apply(&profile_with("Plater.lua", "x"), &target).is_ok());
    }

    #[test]
    fn test_apply_prunes_to_keep() {
        let (_dir, target, applier) = setup();
        let live = target.saved_variables_dir().join("Plater.lua");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "v0").unwrap();

        for i in 1..=4 {
            applier
                .apply(&profile_with("Plater.lua", &format!("v{}", i)), &target)
                .unwrap();
        }
        assert_eq!(applier.backups().list_backups().unwrap().len(), 2);
    }

    #[test]
    fn test_restore_reverts_apply() {
        let (_dir, target, applier) = setup();
        let live = target.saved_variables_dir().join("Plater.lua");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "original").unwrap();

        let outcome = applier.apply(&profile_with("Plater.lua", "stored"), &target).unwrap();
        applier.restore(&outcome.backup.unwrap()).unwrap();
        assert_eq!(fs::read_to_string(&live).unwrap(), "original");
    }
}
