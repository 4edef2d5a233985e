//! Profile synchronization between the local store and a remote store

mod engine;
mod guard;
mod plan;

pub use engine::{Reconciler, SyncResult};
pub use guard::{InFlight, SyncGuard};
pub use plan::{PlannedDownload, SyncPlan};
