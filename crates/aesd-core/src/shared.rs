//! Shared, lock-guarded access to a [`RecordStore`]
//!
//! One coarse async mutex guards the whole store. Every writer, reader and
//! the periodic timestamp task go through it, so all mutations are totally
//! ordered by lock acquisition. The guard may be held across awaits (the
//! socket front-end streams its response while holding it).

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

use crate::error::{AesdError, AesdResult};
use crate::store::RecordStore;

/// How long [`SharedStore::lock`] waits before giving up
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Cloneable handle to the single process-wide record store
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<RecordStore>>,
    lock_timeout: Duration,
}

impl SharedStore {
    /// Wrap an existing store
    pub fn new(store: RecordStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Create an empty store with room for `capacity` records
    pub fn with_capacity(capacity: usize) -> AesdResult<Self> {
        Ok(Self::new(RecordStore::new(capacity)?))
    }

    /// Set the bound on lock acquisition
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Acquire the store lock, waiting at most the configured timeout
    ///
    /// Fails with [`AesdError::LockAcquisition`] on expiry. The failure is
    /// retryable and leaves the store untouched.
    pub async fn lock(&self) -> AesdResult<MutexGuard<'_, RecordStore>> {
        match tokio::time::timeout(self.lock_timeout, self.inner.lock()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                warn!(
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "Timed out waiting for store lock"
                );
                Err(AesdError::lock_acquisition(format!(
                    "store lock not acquired within {:?}",
                    self.lock_timeout
                )))
            }
        }
    }

    /// Acquire the store lock without a bound (used at teardown)
    pub async fn lock_unbounded(&self) -> MutexGuard<'_, RecordStore> {
        self.inner.lock().await
    }

    /// Append one completed record, returning whether the oldest was evicted
    pub async fn append(&self, record: impl Into<Bytes>) -> AesdResult<bool> {
        Ok(self.lock().await?.append(record))
    }

    /// Full store content, oldest first
    pub async fn snapshot(&self) -> AesdResult<Bytes> {
        Ok(self.lock().await?.read_from(0))
    }

    /// Number of records currently held
    pub async fn len(&self) -> AesdResult<usize> {
        Ok(self.lock().await?.len())
    }

    /// Sum of the lengths of the records currently held
    pub async fn total_size(&self) -> AesdResult<usize> {
        Ok(self.lock().await?.total_size())
    }
}
