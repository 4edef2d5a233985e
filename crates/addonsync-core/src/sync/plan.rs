//! Deciding which profiles move in which direction

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::profile::Profile;
use crate::remote::RemoteRecord;

/// A remote profile chosen for download
#[derive(Debug, Clone, Serialize)]
pub struct PlannedDownload {
    /// Backend key to fetch it by
    pub key: String,
    pub id: String,
    /// Local name if the profile exists locally, else the remote name
    pub name: String,
    pub modified_time: DateTime<Utc>,
}

/// Transfers decided by one comparison of local and remote profiles
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub uploads: Vec<Profile>,
    pub downloads: Vec<PlannedDownload>,
}

impl SyncPlan {
    /// Compare both sides by id and timestamp.
    ///
    /// The strictly newer side wins; equal timestamps transfer nothing.
    /// Profiles present on one side only are copied to the other.
    pub fn compute(local: &[Profile], remote: &[RemoteRecord]) -> Self {
        // if a backend ever lists an id twice, the newest blob counts
        let mut remote_by_id: HashMap<&str, &RemoteRecord> = HashMap::with_capacity(remote.len());
        for record in remote {
            remote_by_id
                .entry(record.id.as_str())
                .and_modify(|seen| {
                    if record.modified_time > seen.modified_time {
                        *seen = record;
                    }
                })
                .or_insert(record);
        }

        let mut plan = Self::default();
        let mut local_ids: HashSet<&str> = HashSet::with_capacity(local.len());

        for profile in local {
            local_ids.insert(profile.id.as_str());

            match remote_by_id.get(profile.id.as_str()) {
                None => {
                    tracing::debug!("{}: only local, uploading", profile.name);
                    plan.uploads.push(profile.clone());
                }
                Some(record) if profile.updated_at > record.modified_time => {
                    tracing::debug!("{}: local is newer, uploading", profile.name);
                    plan.uploads.push(profile.clone());
                }
                Some(record) if record.modified_time > profile.updated_at => {
                    tracing::debug!("{}: remote is newer, downloading", profile.name);
                    plan.downloads.push(PlannedDownload {
                        key: record.key.clone(),
                        id: record.id.clone(),
                        name: profile.name.clone(),
                        modified_time: record.modified_time,
                    });
                }
                Some(_) => {}
            }
        }

        let mut remote_only: Vec<&RemoteRecord> = remote_by_id
            .values()
            .filter(|record| !local_ids.contains(record.id.as_str()))
            .copied()
            .collect();
        remote_only.sort_by(|a, b| a.id.cmp(&b.id));

        for record in remote_only {
            tracing::debug!("{}: only remote, downloading", record.name);
            plan.downloads.push(PlannedDownload {
                key: record.key.clone(),
                id: record.id.clone(),
                name: record.name.clone(),
                modified_time: record.modified_time,
            });
        }

        plan
    }

    pub fn is_empty(&self) -> bool {
        self.uploads.is_empty() && self.downloads.is_empty()
    }

    pub fn upload_names(&self) -> Vec<String> {
        self.uploads.iter().map(|p| p.name.clone()).collect()
    }

    pub fn download_names(&self) -> Vec<String> {
        self.downloads.iter().map(|d| d.name.clone()).collect()
    }
}
