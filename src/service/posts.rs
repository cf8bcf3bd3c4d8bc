//! Posts service
//!
//! Entry points a web front end calls: sync requests and the analytics
//! read from mirrored posts.

use std::sync::Arc;

use crate::data::{Blog, Database, TopPost};
use crate::error::AppError;
use crate::metrics::SYNC_REQUESTS_TOTAL;
use crate::sync::{IntervalGate, SyncQueue, SyncRequest};

/// Default number of top posts
pub const DEFAULT_TOP_POSTS: u32 = 5;

/// Largest accepted number of top posts
pub const MAX_TOP_POSTS: u32 = 50;

/// Answer to a sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRequestOutcome {
    /// A job was queued
    Accepted,
    /// The blog synced recently; nothing was queued
    Throttled { retry_after_seconds: u64 },
}

/// Posts service
pub struct PostsService {
    db: Arc<Database>,
    gate: IntervalGate,
    queue: SyncQueue,
}

impl PostsService {
    /// Create new posts service
    pub fn new(db: Arc<Database>, gate: IntervalGate, queue: SyncQueue) -> Self {
        Self { db, gate, queue }
    }

    /// Queue a sync of the account's primary blog
    ///
    /// # Errors
    /// - `NotFound` for an unknown account
    /// - `Unauthorized` if no credentials are stored
    /// - `QueueClosed` if the workers are gone
    pub async fn request_sync(&self, account_id: &str) -> Result<SyncRequestOutcome, AppError> {
        let Some(account) = self.db.get_account(account_id).await? else {
            SYNC_REQUESTS_TOTAL.with_label_values(&["not_found"]).inc();
            return Err(AppError::NotFound);
        };

        if self.db.get_credentials(&account.id).await?.is_none() {
            SYNC_REQUESTS_TOTAL.with_label_values(&["unauthorized"]).inc();
            tracing::info!(account_id = %account.id, "Sync rejected: no stored credentials");
            return Err(AppError::Unauthorized);
        }

        let status = self.gate.check(&account.username).await?;
        if let Some(retry_after_seconds) = status.retry_after_seconds() {
            SYNC_REQUESTS_TOTAL.with_label_values(&["throttled"]).inc();
            tracing::debug!(
                account_id = %account.id,
                retry_after_seconds,
                "Sync rejected: interval not elapsed"
            );
            return Ok(SyncRequestOutcome::Throttled {
                retry_after_seconds,
            });
        }

        self.queue
            .enqueue(SyncRequest {
                account_id: account.id.clone(),
            })
            .await?;
        SYNC_REQUESTS_TOTAL.with_label_values(&["accepted"]).inc();
        tracing::info!(account_id = %account.id, blog = %account.username, "Sync queued");

        Ok(SyncRequestOutcome::Accepted)
    }

    /// Most noted posts of a blog
    ///
    /// # Arguments
    /// * `blog_name` - Blog of the account, defaults to its primary blog
    /// * `count` - Number of posts, 1 to 50
    /// * `exclude_reblogs` - Leave reblogs out
    ///
    /// # Returns
    /// Posts ordered by note count, highest first. Empty before the first
    /// sync.
    pub async fn top_posts(
        &self,
        account_id: &str,
        blog_name: Option<&str>,
        count: u32,
        exclude_reblogs: bool,
    ) -> Result<Vec<TopPost>, AppError> {
        if !(1..=MAX_TOP_POSTS).contains(&count) {
            return Err(AppError::Validation(format!(
                "count must be between 1 and {}",
                MAX_TOP_POSTS
            )));
        }

        let Some(blog) = self.resolve_blog(account_id, blog_name).await? else {
            return Ok(Vec::new());
        };

        let posts = self
            .db
            .get_top_posts(&blog.id, count, exclude_reblogs)
            .await?;

        Ok(posts
            .into_iter()
            .map(|post| TopPost {
                title: post.display_title(),
                note_count: post.note_count,
                url: post.post_url,
            })
            .collect())
    }

    /// Note counts of a blog's posts in publish order
    pub async fn note_series(
        &self,
        account_id: &str,
        blog_name: Option<&str>,
        exclude_reblogs: bool,
    ) -> Result<Vec<i64>, AppError> {
        match self.resolve_blog(account_id, blog_name).await? {
            Some(blog) => self.db.get_note_series(&blog.id, exclude_reblogs).await,
            None => Ok(Vec::new()),
        }
    }

    /// Blog the analytics read from
    ///
    /// A named blog must belong to the account. Without a name the blog
    /// matching the account's username is used, which may not exist yet.
    async fn resolve_blog(
        &self,
        account_id: &str,
        blog_name: Option<&str>,
    ) -> Result<Option<Blog>, AppError> {
        let account = self
            .db
            .get_account(account_id)
            .await?
            .ok_or(AppError::NotFound)?;

        match blog_name {
            Some(name) => self
                .db
                .get_account_blog(&account.id, name)
                .await?
                .map(Some)
                .ok_or(AppError::NotFound),
            None => self.db.get_account_blog(&account.id, &account.username).await,
        }
    }
}
