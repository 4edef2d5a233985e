//! Local durable storage of profiles, one JSON document per profile id

use chrono::{DateTime, SubsecRound, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::profile::{timestamp_now, Profile};

const RECORD_EXTENSION: &str = "json";

/// Directory-backed profile store.
///
/// Cloning is cheap; clones address the same directory.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(Error::NotFound(format!("invalid profile id '{}'", id)));
        }
        Ok(self.root.join(format!("{}.{}", id, RECORD_EXTENSION)))
    }

    fn read_record(path: &Path) -> Result<Profile> {
        let content = fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        serde_json::from_str(&content).map_err(|e| Error::corrupt(name, e))
    }

    /// All readable profiles, newest `updated_at` first, ties broken by id.
    ///
    /// Records that fail to parse are logged and skipped.
    pub fn list(&self) -> Result<Vec<Profile>> {
        let mut profiles = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().map(|e| e != RECORD_EXTENSION).unwrap_or(true) {
                continue;
            }

            match Self::read_record(&path) {
                Ok(profile) => profiles.push(profile),
                Err(e) => tracing::warn!("Skipping unreadable profile {}: {}", path.display(), e),
            }
        }

        profiles.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(profiles)
    }

    /// Look up a profile by id.
    ///
    /// A corrupt record is reported as an error; a missing one as `None`.
    pub fn get(&self, id: &str) -> Result<Option<Profile>> {
        let path = match self.record_path(id) {
            Ok(path) => path,
            Err(_) => return Ok(None),
        };
        match Self::read_record(&path) {
            Ok(profile) => Ok(Some(profile)),
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Insert or replace a profile, stamping `updated_at` with the current
    /// time in milliseconds. The stamp never moves backwards for an id
    /// already stored.
    pub fn save(&self, profile: &Profile) -> Result<Profile> {
        let mut stamp = timestamp_now();
        if let Ok(Some(existing)) = self.get(&profile.id) {
            stamp = stamp.max(existing.updated_at);
        }
        self.write_with_timestamp(profile, stamp)
    }

    /// Persist a profile received from the remote store, keeping the remote
    /// modification time as its `updated_at`.
    pub(crate) fn save_synced(&self, profile: &Profile, modified_time: DateTime<Utc>) -> Result<Profile> {
        self.write_with_timestamp(profile, modified_time)
    }

    /// Align the stored `updated_at` of `id` with the time the remote
    /// recorded for it: raise it when `stamp` is later, or drop sub-millisecond
    /// digits the remote did not keep.
    pub(crate) fn raise_timestamp(&self, id: &str, stamp: DateTime<Utc>) -> Result<()> {
        if let Some(profile) = self.get(id)? {
            let truncated = profile.updated_at.trunc_subsecs(3);
            if stamp > profile.updated_at || (stamp == truncated && stamp != profile.updated_at) {
                self.write_with_timestamp(&profile, stamp)?;
            }
        }
        Ok(())
    }

    fn write_with_timestamp(&self, profile: &Profile, stamp: DateTime<Utc>) -> Result<Profile> {
        let path = self.record_path(&profile.id)?;
        let mut record = profile.clone();
        record.updated_at = stamp;

        let content = serde_json::to_string_pretty(&record)?;

        // write-then-rename so a crash never leaves a half-written record
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;

        tracing::debug!("Saved profile {} ({})", record.name, record.id);
        Ok(record)
    }

    /// Remove a profile. Removing an unknown id is not an error.
    pub fn delete(&self, id: &str) -> Result<()> {
        let path = match self.record_path(id) {
            Ok(path) => path,
            Err(_) => return Ok(()),
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("Deleted local profile {}", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
