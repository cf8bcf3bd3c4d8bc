//! Interval gate
//!
//! Throttles re-syncs of the same blog with an expiring marker. The blog
//! may sync again once the marker is gone.

use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::kv::KeyValueStore;

/// Result of an interval check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Allowed,
    Throttled { remaining: Duration },
}

impl GateStatus {
    /// Whole seconds until the gate opens, rounded up
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            GateStatus::Allowed => None,
            GateStatus::Throttled { remaining } => {
                let seconds = remaining.as_secs();
                Some(if remaining.subsec_nanos() > 0 {
                    seconds + 1
                } else {
                    seconds
                })
            }
        }
    }
}

/// Per-blog sync throttle
#[derive(Clone)]
pub struct IntervalGate {
    store: Arc<dyn KeyValueStore>,
    interval: Duration,
}

impl IntervalGate {
    pub fn new(store: Arc<dyn KeyValueStore>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Marker key for a blog
    pub fn key(blog_name: &str) -> String {
        format!("{}-updated", blog_name)
    }

    /// Configured time between syncs
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check whether a sync may start now. Does not touch the marker.
    pub async fn check(&self, blog_name: &str) -> Result<GateStatus, AppError> {
        Ok(match self.store.ttl(&Self::key(blog_name)).await? {
            Some(remaining) => GateStatus::Throttled { remaining },
            None => GateStatus::Allowed,
        })
    }

    /// Close the gate for `ttl`, replacing any earlier marker
    pub async fn mark_updated(&self, blog_name: &str, ttl: Duration) -> Result<(), AppError> {
        self.store
            .set_with_expiry(&Self::key(blog_name), "1", ttl)
            .await
    }
}
