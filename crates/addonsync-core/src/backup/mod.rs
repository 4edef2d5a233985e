//! Snapshots of live settings files taken before a profile is applied
//!
//! Each backup is a directory named `<account>-<timestamp>` under the backup
//! root. It mirrors the files' layout relative to the account directory and
//! carries a `manifest.json` describing where they came from, so it can be
//! listed, pruned and restored later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};

const MANIFEST_FILENAME: &str = "manifest.json";

/// Contents of a backup's `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub account: String,
    pub created_at: DateTime<Utc>,
    /// Directory the files were copied from
    pub source_root: PathBuf,
    /// Backed-up files, relative to `source_root`
    pub files: Vec<PathBuf>,
}

/// Result of a backup taken ahead of an apply
#[derive(Debug, Clone, Default)]
pub struct BackupHandle {
    /// Backup directory, or `None` if there was nothing to protect
    pub dir: Option<PathBuf>,
    /// Live files that were copied
    pub files: Vec<PathBuf>,
}

impl BackupHandle {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A backup found on disk
#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub manifest: BackupManifest,
}

impl BackupInfo {
    pub fn file_count(&self) -> usize {
        self.manifest.files.len()
    }
}

/// Directory-name-safe rendering of an account name
fn dir_safe(account: &str) -> String {
    let cleaned: String = account
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "account".to_string()
    } else {
        cleaned
    }
}

/// Manages the backup root directory
#[derive(Debug, Clone)]
pub struct BackupManager {
    backup_dir: PathBuf,
}

impl BackupManager {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Create a fresh, uniquely named directory for a backup
    fn create_unique_dir(&self, account: &str, now: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(&self.backup_dir)?;
        let base = format!("{}-{}", dir_safe(account), now.format("%Y%m%d-%H%M%S%.3f"));

        for attempt in 0..100 {
            let name = if attempt == 0 {
                base.clone()
            } else {
                format!("{}-{}", base, attempt)
            };
            let path = self.backup_dir.join(name);
            match fs::create_dir(&path) {
                Ok(()) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::BackupIncomplete {
            path: self.backup_dir.join(base),
            message: "could not allocate a unique backup directory".to_string(),
        })
    }

    /// Copy every existing file in `targets` into a new backup directory.
    ///
    /// All copies finish before this returns. If any copy fails the partial
    /// backup is removed and [`Error::BackupIncomplete`] is returned; callers
    /// must not overwrite anything in that case. A missing `source_root`
    /// means there is nothing to protect and yields an empty handle.
    pub fn backup<'a>(
        &self,
        account: &str,
        source_root: &Path,
        targets: impl IntoIterator<Item = &'a Path>,
    ) -> Result<BackupHandle> {
        if !source_root.exists() {
            tracing::debug!("{} does not exist, nothing to back up", source_root.display());
            return Ok(BackupHandle::default());
        }

        let existing: Vec<&Path> = targets
            .into_iter()
            .filter(|path| match fs::symlink_metadata(path) {
                Ok(meta) if meta.file_type().is_symlink() && fs::metadata(path).is_err() => {
                    tracing::warn!("Skipping broken symlink {}", path.display());
                    false
                }
                Ok(_) => true,
                Err(_) => false,
            })
            .collect();
        if existing.is_empty() {
            return Ok(BackupHandle::default());
        }

        let now = Utc::now();
        let dir = self.create_unique_dir(account, now)?;

        match Self::copy_files(&dir, source_root, &existing) {
            Ok(relative) => {
                let manifest = BackupManifest {
                    account: account.to_string(),
                    created_at: now,
                    source_root: source_root.to_path_buf(),
                    files: relative,
                };
                let written = serde_json::to_string_pretty(&manifest)
                    .map_err(Error::from)
                    .and_then(|json| fs::write(dir.join(MANIFEST_FILENAME), json).map_err(Error::from));
                if let Err(e) = written {
                    return Err(Self::abandon(dir, e.to_string()));
                }

                tracing::info!("Backed up {} files to {}", existing.len(), dir.display());
                Ok(BackupHandle {
                    dir: Some(dir),
                    files: existing.iter().map(|p| p.to_path_buf()).collect(),
                })
            }
            Err(message) => Err(Self::abandon(dir, message)),
        }
    }

    fn copy_files(dir: &Path, source_root: &Path, files: &[&Path]) -> std::result::Result<Vec<PathBuf>, String> {
        let mut relative = Vec::with_capacity(files.len());
        for file in files {
            let rel = file
                .strip_prefix(source_root)
                .map_err(|_| format!("{} is outside {}", file.display(), source_root.display()))?;
            let dest = dir.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| format!("{}: {}", parent.display(), e))?;
            }
            fs::copy(file, &dest).map_err(|e| format!("{}: {}", file.display(), e))?;
            relative.push(rel.to_path_buf());
        }
        Ok(relative)
    }

    /// Remove a partial backup and build the error describing it
    fn abandon(dir: PathBuf, message: String) -> Error {
        tracing::warn!("Backup into {} failed: {}", dir.display(), message);
        if let Err(e) = fs::remove_dir_all(&dir) {
            tracing::warn!("Could not remove partial backup {}: {}", dir.display(), e);
        }
        Error::BackupIncomplete { path: dir, message }
    }

    fn read_manifest(path: &Path) -> Result<BackupManifest> {
        let content = fs::read_to_string(path.join(MANIFEST_FILENAME))?;
        serde_json::from_str(&content).map_err(|e| Error::corrupt(path.display().to_string(), e))
    }

    /// All backups with a readable manifest, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.backup_dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.backup_dir)? {
            let path = entry?.path();
            if !path.is_dir() {
                continue;
            }
            match Self::read_manifest(&path) {
                Ok(manifest) => backups.push(BackupInfo { path, manifest }),
                Err(e) => tracing::debug!("Ignoring {}: {}", path.display(), e),
            }
        }

        backups.sort_by(|a, b| {
            b.manifest
                .created_at
                .cmp(&a.manifest.created_at)
                .then_with(|| b.path.cmp(&a.path))
        });
        Ok(backups)
    }

    /// Delete all but the newest `keep` backups, returning how many went
    pub fn prune(&self, keep: usize) -> Result<usize> {
        let backups = self.list_backups()?;
        self.remove_beyond(backups.iter().collect(), keep)
    }

    /// Like [`BackupManager::prune`], counting only backups of `account`
    pub fn prune_account(&self, account: &str, keep: usize) -> Result<usize> {
        let backups = self.list_backups()?;
        let own = backups.iter().filter(|b| b.manifest.account == account).collect();
        self.remove_beyond(own, keep)
    }

    fn remove_beyond(&self, newest_first: Vec<&BackupInfo>, keep: usize) -> Result<usize> {
        let mut removed = 0;
        for old in newest_first.into_iter().skip(keep) {
            self.delete_backup(&old.path)?;
            removed += 1;
        }
        if removed > 0 {
            tracing::info!("Pruned {} old backups", removed);
        }
        Ok(removed)
    }

    /// Read one backup's manifest; a directory without one is not a backup
    pub fn inspect(&self, backup_path: &Path) -> Result<BackupInfo> {
        let manifest = Self::read_manifest(backup_path).map_err(|e| match e {
            Error::Io(io) if io.kind() == ErrorKind::NotFound => {
                Error::NotFound(backup_path.display().to_string())
            }
            other => other,
        })?;
        Ok(BackupInfo {
            path: backup_path.to_path_buf(),
            manifest,
        })
    }

    /// Copy a backup's files back to where they were taken from
    pub fn restore(&self, backup_path: &Path) -> Result<usize> {
        let manifest = self.inspect(backup_path)?.manifest;

        let mut restored = 0;
        for entry in WalkDir::new(backup_path).min_depth(1) {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match entry.path().strip_prefix(backup_path) {
                Ok(rel) if rel != Path::new(MANIFEST_FILENAME) => rel,
                _ => continue,
            };

            let dest = manifest.source_root.join(rel);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
            restored += 1;
        }

        tracing::info!("Restored {} files from {}", restored, backup_path.display());
        Ok(restored)
    }

    /// Delete a backup directory
    pub fn delete_backup(&self, backup_path: &Path) -> Result<()> {
        if backup_path.exists() {
            fs::remove_dir_all(backup_path)?;
        }
        Ok(())
    }
}
