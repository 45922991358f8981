//! Exclusive advisory locks around dataset construction.

use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// Interval between acquisition attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock backend keyed by string.
pub trait LockFactory: Send + Sync {
    /// Try to take `key` for `owner`. Returns false if someone else holds it.
    ///
    /// # Errors
    /// Returns error if the backend is unavailable
    fn try_acquire(&self, key: &str, owner: u64) -> Result<bool>;

    /// Release `key` if `owner` holds it.
    ///
    /// # Errors
    /// Returns error if the backend is unavailable
    fn release(&self, key: &str, owner: u64) -> Result<()>;
}

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct MemoryLockFactory {
    held: DashMap<String, u64>,
}

impl MemoryLockFactory {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held.
    #[must_use]
    pub fn is_locked(&self, key: &str) -> bool {
        self.held.contains_key(key)
    }
}

impl LockFactory for MemoryLockFactory {
    fn try_acquire(&self, key: &str, owner: u64) -> Result<bool> {
        match self.held.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(owner);
                Ok(true)
            }
        }
    }

    fn release(&self, key: &str, owner: u64) -> Result<()> {
        self.held.remove_if(key, |_, holder| *holder == owner);
        Ok(())
    }
}

/// RAII guard for a held dataset lock.
///
/// Released on drop, so every exit path of the pipeline run, including
/// unwinding panics, frees the key.
pub struct DatasetLock {
    factory: Arc<dyn LockFactory>,
    key: String,
    owner: u64,
    released: bool,
}

impl std::fmt::Debug for DatasetLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatasetLock")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl DatasetLock {
    /// Block until `key` is acquired or `timeout` elapses.
    ///
    /// # Errors
    /// Returns `Error::LockTimeout` when the key stays held for `timeout`
    pub fn acquire(factory: Arc<dyn LockFactory>, key: &str, timeout: Duration) -> Result<Self> {
        let owner = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;
        loop {
            if factory.try_acquire(key, owner)? {
                tracing::debug!(key, owner, "Dataset lock acquired");
                return Ok(Self {
                    factory,
                    key: key.to_string(),
                    owner,
                    released: false,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::LockTimeout(key.to_string()));
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Locked key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release explicitly, surfacing backend errors.
    ///
    /// # Errors
    /// Returns error if the backend fails to release
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.factory.release(&self.key, self.owner)
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.factory.release(&self.key, self.owner) {
            tracing::warn!(key = %self.key, error = %e, "Failed to release dataset lock");
        }
    }
}
