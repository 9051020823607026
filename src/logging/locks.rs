//! Per-day-file locks
//!
//! Appends to a day-file and archiving of that day-file both take the
//! file's lock, so lines never interleave and an archive never drops a
//! line written between its read and its delete.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Registry of one mutex per day-file path
#[derive(Debug, Default)]
pub struct DayFileLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl DayFileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock handle for a path, creating it on first use
    pub fn handle(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(path.to_path_buf()).or_default())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forget paths whose lock nobody holds a handle to
    ///
    /// Run after archiving, so removed day-files do not keep an entry.
    pub fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

/// Acquire a handle's lock, ignoring poisoning
///
/// A writer that panicked mid-append leaves at worst a partial line; later
/// writers must still be able to log.
pub fn acquire(handle: &Mutex<()>) -> MutexGuard<'_, ()> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}
