//! Per-blog mutual exclusion across worker processes
//!
//! Built on the store's atomic set-if-absent with expiry. A holder that
//! dies without releasing blocks others only until its lease runs out.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::kv::KeyValueStore;

/// Lease-based mutex with a single holder per resource key
#[derive(Clone)]
pub struct DistributedMutex {
    store: Arc<dyn KeyValueStore>,
    lease: Duration,
}

impl DistributedMutex {
    pub fn new(store: Arc<dyn KeyValueStore>, lease: Duration) -> Self {
        Self { store, lease }
    }

    /// Resource key guarding a blog's sync
    pub fn resource_key(blog_name: &str) -> String {
        format!("mutex-blog-{}", blog_name)
    }

    /// Try to take the mutex without waiting
    ///
    /// # Returns
    /// `None` if another holder's lease is still live.
    pub async fn try_acquire(&self, resource_key: &str) -> Result<Option<MutexLease>, AppError> {
        let token = ulid::Ulid::new().to_string();
        if !self
            .store
            .set_if_absent(resource_key, &token, self.lease)
            .await?
        {
            return Ok(None);
        }

        tracing::debug!(key = %resource_key, "Mutex acquired");
        Ok(Some(MutexLease {
            store: self.store.clone(),
            key: resource_key.to_string(),
            token,
            released: false,
        }))
    }
}

/// A held mutex
///
/// Release with [`MutexLease::release`]. Dropping an unreleased lease
/// schedules the release on the current runtime; if that is impossible the
/// entry expires with the lease.
pub struct MutexLease {
    store: Arc<dyn KeyValueStore>,
    key: String,
    token: String,
    released: bool,
}

impl MutexLease {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the mutex
    ///
    /// # Returns
    /// `false` if the lease had already expired and someone else holds the
    /// key now; their entry is left untouched.
    pub async fn release(mut self) -> Result<bool, AppError> {
        self.released = true;
        let released = self.store.delete_if_equals(&self.key, &self.token).await?;
        if !released {
            tracing::warn!(key = %self.key, "Mutex lease expired before release");
        }
        Ok(released)
    }
}

impl Drop for MutexLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            if let Err(error) = store.delete_if_equals(&key, &token).await {
                tracing::warn!(%error, key = %key, "Failed to release dropped mutex lease");
            }
        });
    }
}
