//! At most one reconciliation, push-all or pull-all per local store

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::lock::FileLock;

/// Shared "sync in progress" flag. Clones observe the same flag.
///
/// A guard built with [`SyncGuard::at`] also takes a lock file, so guards in
/// other processes over the same store see the operation too.
#[derive(Debug, Clone, Default)]
pub struct SyncGuard {
    running: Arc<AtomicBool>,
    lock_path: Option<PathBuf>,
}

/// Held for the duration of a sync operation; releases the guard on drop.
#[derive(Debug)]
pub struct InFlight {
    running: Arc<AtomicBool>,
    _lock: Option<FileLock>,
}

impl SyncGuard {
    /// Guard visible to this process only
    pub fn new() -> Self {
        Self::default()
    }

    /// Guard backed by the lock file at `lock_path`
    pub fn at(lock_path: impl Into<PathBuf>) -> Self {
        Self {
            running: Arc::default(),
            lock_path: Some(lock_path.into()),
        }
    }

    pub fn lock_path(&self) -> Option<&Path> {
        self.lock_path.as_deref()
    }

    /// Claim the guard, or fail with [`Error::Busy`] if an operation is
    /// already running here or in another process.
    pub fn try_begin(&self, operation: &str) -> Result<InFlight> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| Error::Busy(format!("cannot start {} while a sync is running", operation)))?;

        let lock = match self.lock_path {
            Some(ref path) => match FileLock::try_acquire(path, "a sync") {
                Ok(lock) => Some(lock),
                Err(e) => {
                    self.running.store(false, Ordering::SeqCst);
                    return Err(e);
                }
            },
            None => None,
        };

        Ok(InFlight {
            running: Arc::clone(&self.running),
            _lock: lock,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_begin_is_rejected() {
        let guard = SyncGuard::new();
        let shared = guard.clone();

        let flight = guard.try_begin("sync").unwrap();
        assert!(shared.is_running());
        assert!(matches!(shared.try_begin("pull-all"), Err(Error::Busy(_))));

        drop(flight);
        assert!(!guard.is_running());
        assert!(shared.try_begin("push-all").is_ok());
    }

    #[test]
    fn test_separate_guards_share_the_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync.lock");
        // two guards that share nothing but the path, as two processes would
        let first = SyncGuard::at(&path);
        let second = SyncGuard::at(&path);

        let flight = first.try_begin("sync").unwrap();
        assert!(matches!(second.try_begin("sync"), Err(Error::Busy(_))));
        assert!(!second.is_running());

        drop(flight);
        assert!(second.try_begin("sync").is_ok());
    }
}
