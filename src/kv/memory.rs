//! Process-local key-value store

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::AppError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        let remaining = self.expires_at.saturating_duration_since(now);
        (!remaining.is_zero()).then_some(remaining)
    }
}

/// In-memory store
///
/// Expired entries are dropped lazily when their key is written again or
/// when `prune_expired` runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .and_then(|entry| entry.remaining(Instant::now())))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), AppError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if entries
            .get(key)
            .is_some_and(|entry| entry.remaining(now).is_some())
        {
            return Ok(false);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(entry) if entry.value == value => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn prune_expired(&self) -> Result<u64, AppError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.remaining(now).is_some());
        Ok((before - entries.len()) as u64)
    }
}
