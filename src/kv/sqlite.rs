//! Key-value store backed by the shared SQLite database

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::KeyValueStore;
use crate::data::Database;
use crate::error::AppError;

/// Store whose entries live in the `kv_entries` table
///
/// Expiry is compared against wall-clock milliseconds, the only clock all
/// processes sharing the file agree on.
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_ms(now_ms: i64, ttl: Duration) -> i64 {
    now_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, AppError> {
        let now = now_ms();
        let expires_at = self.db.kv_expiry(key, now).await?;
        Ok(expires_at.map(|expires_at| Duration::from_millis((expires_at - now).max(0) as u64)))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), AppError> {
        self.db.kv_set(key, value, expiry_ms(now_ms(), ttl)).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, AppError> {
        let now = now_ms();
        self.db
            .kv_set_if_absent(key, value, now, expiry_ms(now, ttl))
            .await
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, AppError> {
        self.db.kv_delete_if_equals(key, value).await
    }

    async fn prune_expired(&self) -> Result<u64, AppError> {
        self.db.kv_prune(now_ms()).await
    }
}
