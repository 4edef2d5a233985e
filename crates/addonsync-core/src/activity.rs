//! Activity log for tracking user actions
//!
//! Keeps the most recent captures, applies, syncs, backups and errors as JSON
//! lines in the data directory, newest first.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Maximum number of log entries to keep
pub const MAX_LOG_ENTRIES: usize = 50;

/// Type of activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityType {
    Capture,
    Apply,
    Sync,
    PushAll,
    PullAll,
    Backup,
    Restore,
    Delete,
    Error,
}

impl ActivityType {
    /// Get the display name for this activity type
    pub fn display_name(&self) -> &'static str {
        match self {
            ActivityType::Capture => "Capture",
            ActivityType::Apply => "Apply",
            ActivityType::Sync => "Sync",
            ActivityType::PushAll => "Push all",
            ActivityType::PullAll => "Pull all",
            ActivityType::Backup => "Backup",
            ActivityType::Restore => "Restore",
            ActivityType::Delete => "Delete",
            ActivityType::Error => "Error",
        }
    }
}

/// A single activity log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub activity_type: ActivityType,
    /// Description of what happened
    pub description: String,
    pub details: Option<String>,
}

impl ActivityEntry {
    /// Create a new activity entry with the current timestamp
    pub fn new(activity_type: ActivityType, description: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            activity_type,
            description: description.into(),
            details: None,
        }
    }

    pub fn with_details(
        activity_type: ActivityType,
        description: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            details: Some(details.into()),
            ..Self::new(activity_type, description)
        }
    }

    /// Format the timestamp in local time with date
    pub fn formatted_datetime(&self) -> String {
        self.timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Activity log bound to a file
#[derive(Debug)]
pub struct ActivityLog {
    path: PathBuf,
    /// In-memory log entries (most recent first)
    entries: Vec<ActivityEntry>,
}

impl ActivityLog {
    /// Create an empty log that saves to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Load the log from `path`; unreadable lines are dropped
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut log = Self::new(path);
        if let Ok(file) = File::open(&log.path) {
            let reader = BufReader::new(file);
            log.entries = reader
                .lines()
                .map_while(|line| line.ok())
                .filter_map(|line| serde_json::from_str::<ActivityEntry>(&line).ok())
                .take(MAX_LOG_ENTRIES)
                .collect();
        }
        log
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save activity log to file
    pub fn save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(&self.path)?;
        for entry in self.entries.iter().take(MAX_LOG_ENTRIES) {
            if let Ok(json) = serde_json::to_string(entry) {
                writeln!(file, "{}", json)?;
            }
        }
        Ok(())
    }

    /// Add a new entry to the log
    pub fn add(&mut self, entry: ActivityEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_LOG_ENTRIES);
    }

    /// Add an entry and persist; a failed write is logged, not returned
    pub fn record(&mut self, activity_type: ActivityType, description: impl Into<String>) {
        self.record_entry(ActivityEntry::new(activity_type, description));
    }

    pub fn record_entry(&mut self, entry: ActivityEntry) {
        self.add(entry);
        if let Err(e) = self.save() {
            tracing::warn!("Failed to write activity log {}: {}", self.path.display(), e);
        }
    }

    pub fn entries(&self) -> &[ActivityEntry] {
        &self.entries
    }

    /// Get the most recent N entries
    pub fn recent(&self, count: usize) -> &[ActivityEntry] {
        &self.entries[..count.min(self.entries.len())]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_activity_entry_creation() {
        let entry = ActivityEntry::with_details(ActivityType::Apply, "Applied Raid", "12 files");
        assert_eq!(entry.activity_type, ActivityType::Apply);
        assert_eq!(entry.description, "Applied Raid");
        assert_eq!(entry.details.as_deref(), Some("12 files"));
    }

    #[test]
    fn test_activity_log_order_and_cap() {
        let dir = TempDir::new().unwrap();
        let mut log = ActivityLog::new(dir.path().join("activity.log"));
        assert!(log.is_empty());

        for i in 0..(MAX_LOG_ENTRIES + 5) {
            log.add(ActivityEntry::new(ActivityType::Sync, format!("sync {}", i)));
        }
        assert_eq!(log.len(), MAX_LOG_ENTRIES);
        // Most recent should be first
        assert_eq!(log.entries()[0].description, format!("sync {}", MAX_LOG_ENTRIES + 4));
        assert_eq!(log.recent(2).len(), 2);
    }

    #[test]
    fn test_activity_log_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("activity.log");

        let mut log = ActivityLog::new(&path);
        log.record(ActivityType::Capture, "Captured Raid");
        log.record(ActivityType::Delete, "Deleted Old");

        let loaded = ActivityLog::load(&path);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.entries()[0].activity_type, ActivityType::Delete);
        assert_eq!(loaded.entries()[1].description, "Captured Raid");
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(ActivityLog::load(dir.path().join("none.log")).is_empty());
    }
}
