use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::fingerprint::Fingerprint;

/// Keyed reader/writer locks, one per fingerprint.
///
/// Writers (materialization) are exclusive per fingerprint, readers share.
/// Entries are held weakly so a fingerprint nobody is using costs nothing.
pub struct FingerprintLocks {
    locks: Arc<Mutex<HashMap<Fingerprint, Weak<RwLock<()>>>>>,
}

impl FingerprintLocks {
    pub fn new() -> Self {
        FingerprintLocks {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_for(&self, fp: &Fingerprint) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = locks.get(fp).and_then(Weak::upgrade) {
            return lock;
        }

        locks.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(RwLock::new(()));
        locks.insert(fp.clone(), Arc::downgrade(&lock));
        lock
    }

    /// Wait for exclusive access to a fingerprint
    pub async fn write(&self, fp: &Fingerprint) -> OwnedRwLockWriteGuard<()> {
        self.lock_for(fp).write_owned().await
    }

    /// Wait for shared access to a fingerprint
    pub async fn read(&self, fp: &Fingerprint) -> OwnedRwLockReadGuard<()> {
        self.lock_for(fp).read_owned().await
    }

    /// Number of fingerprints with a live guard
    #[cfg(test)]
    fn len(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.values().filter(|lock| lock.strong_count() > 0).count()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FingerprintLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for FingerprintLocks {
    fn clone(&self) -> Self {
        FingerprintLocks {
            locks: Arc::clone(&self.locks),
        }
    }
}
