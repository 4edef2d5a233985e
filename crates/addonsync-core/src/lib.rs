//! # addonsync-core
//!
//! Core library for capturing game add-on settings into named profiles and
//! keeping them in step across machines through a remote store.
//!
//! This crate provides the foundational functionality for:
//! - Capturing add-on saved variables from a live account into a profile
//! - Applying a stored profile back, always behind a complete backup
//! - Persisting profiles locally, one JSON record per profile
//! - Last-write-wins reconciliation against a remote blob store
//! - Cross-platform detection of game installations
//!
//! ## Modules
//!
//! - [`activity`] - Persistent log of recent actions
//! - [`apply`] - Serialized, backed-up application of profiles
//! - [`backup`] - Snapshots of live files, with list, prune and restore
//! - [`config`] - Configuration and path detection
//! - [`context`] - Session context used by front ends
//! - [`error`] - Error types and Result alias
//! - [`profile`] - Profile data model, add-on table and capture/apply codec
//! - [`remote`] - Remote store contract and backends
//! - [`store`] - Local profile store
//! - [`sync`] - Reconciler, transfer plan and in-flight guard
//!
//! ## Example
//!
//! ```no_run
//! use addonsync_core::{Addon, AppContext, CaptureRequest, Config};
//!
//! # async fn run() -> addonsync_core::Result<()> {
//! let ctx = AppContext::open(Config::load()).await?;
//! let profile = ctx.capture(CaptureRequest::new("Raid night", vec![Addon::Plater, Addon::Dbm]))?;
//! println!("Captured {} files", profile.file_count());
//!
//! let result = ctx.sync().await?;
//! println!("{} uploaded, {} downloaded", result.uploaded.len(), result.downloaded.len());
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod apply;
pub mod backup;
pub mod config;
pub mod context;
pub mod error;
mod lock;
pub mod profile;
pub mod remote;
pub mod store;
pub mod sync;

// Error types
pub use error::{Error, Result};

// Configuration
pub use config::{detect_game_path, list_accounts, validate_game_path, Config, RemoteConfig};

// Profiles
pub use profile::{
    capture, plan_apply, write_plan, Addon, AddonBundle, ApplyPlan, CaptureRequest, FileKey,
    FileScope, GameVariant, LiveTarget, PlannedWrite, Profile, RawContent,
};

// Storage
pub use store::ProfileStore;

// Remote store
pub use remote::{
    AccessToken, CredentialProvider, DriveRemote, MemoryRemote, RemoteRecord, RemoteStatus,
    RemoteStore, StaticTokenProvider,
};

// Sync
pub use sync::{PlannedDownload, Reconciler, SyncGuard, SyncPlan, SyncResult};

// Backup and apply
pub use apply::{ApplyOutcome, ProfileApplier};
pub use backup::{BackupHandle, BackupInfo, BackupManager, BackupManifest};

// Activity log
pub use activity::{ActivityEntry, ActivityLog, ActivityType};

// Session
pub use context::AppContext;
