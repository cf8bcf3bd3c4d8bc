//! Sync orchestrator
//!
//! One `SyncJob` per invocation:
//! `Pending -> MutexWait -> {Skipped | Running -> {Completed | Failed}}`.
//! Every collaborator comes from an explicitly built [`SyncContext`].

use std::sync::Arc;
use std::time::Instant;

use super::fetcher::Fetcher;
use super::interval::IntervalGate;
use super::merge::MergeEngine;
use super::mutex::DistributedMutex;
use crate::config::AppConfig;
use crate::data::{Account, Blog, Database};
use crate::error::AppError;
use crate::kv::KeyValueStore;
use crate::metrics::{SYNC_JOBS_TOTAL, observe_sync};
use crate::tumblr::BlogApi;

/// Collaborators of a sync job
#[derive(Clone)]
pub struct SyncContext {
    pub db: Arc<Database>,
    pub gate: IntervalGate,
    pub mutex: DistributedMutex,
    pub fetcher: Fetcher,
    pub merge: MergeEngine,
}

impl SyncContext {
    /// Wire a context from configuration
    ///
    /// `store` backs both the interval gate and the mutex.
    pub fn new(
        config: &AppConfig,
        db: Arc<Database>,
        store: Arc<dyn KeyValueStore>,
        api: Arc<dyn BlogApi>,
    ) -> Self {
        Self {
            gate: IntervalGate::new(store.clone(), config.sync.interval()),
            mutex: DistributedMutex::new(store, config.sync.mutex_lease()),
            fetcher: Fetcher::new(api, &config.tumblr),
            merge: MergeEngine::new(db.clone()),
            db,
        }
    }
}

/// Lifecycle state of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    MutexWait,
    Skipped,
    Running,
    Completed,
    Failed,
}

/// Result of a job that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another sync of the same blog holds the mutex
    Skipped,
    Completed { blog_name: String, posts: usize },
}

/// One sync of an account's primary blog
pub struct SyncJob {
    ctx: Arc<SyncContext>,
    account_id: String,
    state: SyncState,
}

impl SyncJob {
    pub fn new(ctx: Arc<SyncContext>, account_id: impl Into<String>) -> Self {
        Self {
            ctx,
            account_id: account_id.into(),
            state: SyncState::Pending,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Run the job to a terminal state
    ///
    /// A busy mutex ends the job as `Skipped` without touching the interval
    /// gate. When the blog was renamed, the mutex of the new name is held
    /// as well before any post is merged. Errors from fetching or merging are returned unretried; the
    /// mutex is released on every path.
    pub async fn run(&mut self) -> Result<SyncOutcome, AppError> {
        let account = match self.ctx.db.get_account(&self.account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return self.fail(AppError::NotFound),
            Err(error) => return self.fail(error),
        };

        self.state = SyncState::MutexWait;
        let resource_key = DistributedMutex::resource_key(&account.username);
        let lease = match self.ctx.mutex.try_acquire(&resource_key).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                self.state = SyncState::Skipped;
                SYNC_JOBS_TOTAL.with_label_values(&["skipped"]).inc();
                tracing::debug!(
                    account_id = %account.id,
                    key = %resource_key,
                    "Sync already running, skipping"
                );
                return Ok(SyncOutcome::Skipped);
            }
            Err(error) => return self.fail(error),
        };

        self.state = SyncState::Running;
        let started = Instant::now();
        let result = self.sync(&account).await;

        if let Err(error) = lease.release().await {
            tracing::warn!(%error, key = %resource_key, "Failed to release sync mutex");
        }

        match result {
            Ok(SyncOutcome::Skipped) => {
                self.state = SyncState::Skipped;
                SYNC_JOBS_TOTAL.with_label_values(&["skipped"]).inc();
                Ok(SyncOutcome::Skipped)
            }
            Ok(outcome) => {
                self.state = SyncState::Completed;
                observe_sync("completed", started.elapsed());
                tracing::info!(
                    account_id = %account.id,
                    outcome = ?outcome,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Sync completed"
                );
                Ok(outcome)
            }
            Err(error) => {
                observe_sync("failed", started.elapsed());
                self.fail(error)
            }
        }
    }

    async fn sync(&self, account: &Account) -> Result<SyncOutcome, AppError> {
        let ctx = &self.ctx;
        let interval = ctx.gate.interval();

        // Closed before fetching so a crashed run still throttles retries
        ctx.gate.mark_updated(&account.username, interval).await?;

        let credentials = ctx
            .db
            .get_credentials(&account.id)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let info = ctx.fetcher.fetch_account_info(&credentials).await?;
        let merged = ctx.merge.merge_blog_info(account, &info).await?;
        if merged.previous_username.is_none() {
            return self.sync_posts(&merged.primary).await;
        }

        // Jobs started after the rename lock the new name
        ctx.gate
            .mark_updated(&merged.primary.blog_name, interval)
            .await?;
        let renamed_key = DistributedMutex::resource_key(&merged.primary.blog_name);
        let Some(lease) = ctx.mutex.try_acquire(&renamed_key).await? else {
            tracing::debug!(
                account_id = %account.id,
                key = %renamed_key,
                "Renamed blog already syncing, skipping"
            );
            return Ok(SyncOutcome::Skipped);
        };

        let result = self.sync_posts(&merged.primary).await;
        if let Err(error) = lease.release().await {
            tracing::warn!(%error, key = %renamed_key, "Failed to release sync mutex");
        }
        result
    }

    async fn sync_posts(&self, primary: &Blog) -> Result<SyncOutcome, AppError> {
        let posts = self.ctx.fetcher.fetch_all_posts(&primary.blog_name).await?;
        let merged_posts = self.ctx.merge.merge_posts(primary, &posts).await?;

        Ok(SyncOutcome::Completed {
            blog_name: primary.blog_name.clone(),
            posts: merged_posts,
        })
    }

    fn fail(&mut self, error: AppError) -> Result<SyncOutcome, AppError> {
        self.state = SyncState::Failed;
        tracing::error!(
            account_id = %self.account_id,
            error = %error,
            kind = error.kind(),
            "Sync failed"
        );
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::sync::GateStatus;
    use crate::tumblr::{MockBlogApi, RawAccountInfo, RawBlog, RawPost};
    use tempfile::TempDir;

    fn account_info(name: &str) -> RawAccountInfo {
        RawAccountInfo {
            name: name.to_string(),
            likes: 0,
            following: 0,
            blogs: vec![RawBlog {
                name: name.to_string(),
                uuid: "t:1".to_string(),
                title: "Title".to_string(),
                primary: true,
                followers: 1,
                posts: 2,
                avatar: Vec::new(),
            }],
        }
    }

    fn raw_post(id: i64) -> RawPost {
        RawPost {
            id,
            post_url: format!("https://writer.tumblr.com/post/{}/slug", id),
            post_type: "text".to_string(),
            timestamp: 1_588_888_888 + id,
            date: "2020-05-07 22:01:28 GMT".to_string(),
            tags: vec!["tag".to_string()],
            note_count: id,
            title: None,
            summary: None,
            slug: None,
            mobile: None,
            reblogged_from_id: None,
        }
    }

    struct Harness {
        ctx: Arc<SyncContext>,
        store: Arc<MemoryStore>,
        account: Account,
        _temp_dir: TempDir,
    }

    async fn harness(api: MockBlogApi, with_credentials: bool) -> Harness {
        let temp_dir = TempDir::new().unwrap();
        let db = Arc::new(
            Database::connect(&temp_dir.path().join("job.db"))
                .await
                .unwrap(),
        );
        let account = db.create_account("writer").await.unwrap();
        if with_credentials {
            db.store_credentials(&account.id, "token", "secret")
                .await
                .unwrap();
        }

        let store = Arc::new(MemoryStore::new());
        let config = crate::config::tests::valid_config();
        let ctx = Arc::new(SyncContext::new(&config, db, store.clone(), Arc::new(api)));
        Harness {
            ctx,
            store,
            account,
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_completed_run_merges_and_closes_gate() {
        let mut api = MockBlogApi::new();
        api.expect_fetch_account_info()
            .times(1)
            .return_once(|_| Ok(account_info("renamed")));
        api.expect_fetch_posts_page()
            .returning(|blog, _, offset| {
                assert_eq!(blog, "renamed");
                Ok(if offset == 0 {
                    vec![raw_post(1), raw_post(2)]
                } else {
                    Vec::new()
                })
            });
        let h = harness(api, true).await;

        let mut job = SyncJob::new(h.ctx.clone(), h.account.id.clone());
        let outcome = job.run().await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Completed {
                blog_name: "renamed".to_string(),
                posts: 2
            }
        );
        assert_eq!(job.state(), SyncState::Completed);
        assert!(matches!(
            h.ctx.gate.check("writer").await.unwrap(),
            GateStatus::Throttled { .. }
        ));
        assert!(matches!(
            h.ctx.gate.check("renamed").await.unwrap(),
            GateStatus::Throttled { .. }
        ));
        assert!(
            h.ctx
                .mutex
                .try_acquire(&DistributedMutex::resource_key("writer"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_busy_mutex_skips_without_touching_gate() {
        let api = MockBlogApi::new();
        let h = harness(api, true).await;

        let _held = h
            .ctx
            .mutex
            .try_acquire(&DistributedMutex::resource_key("writer"))
            .await
            .unwrap()
            .unwrap();

        let mut job = SyncJob::new(h.ctx.clone(), h.account.id.clone());
        assert_eq!(job.run().await.unwrap(), SyncOutcome::Skipped);
        assert_eq!(job.state(), SyncState::Skipped);
        assert_eq!(
            h.ctx.gate.check("writer").await.unwrap(),
            GateStatus::Allowed
        );
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_rename_onto_busy_blog_skips_post_merge() {
        let mut api = MockBlogApi::new();
        api.expect_fetch_account_info()
            .times(1)
            .return_once(|_| Ok(account_info("renamed")));
        api.expect_fetch_posts_page().never();
        let h = harness(api, true).await;

        let _held = h
            .ctx
            .mutex
            .try_acquire(&DistributedMutex::resource_key("renamed"))
            .await
            .unwrap()
            .unwrap();

        let mut job = SyncJob::new(h.ctx.clone(), h.account.id.clone());
        assert_eq!(job.run().await.unwrap(), SyncOutcome::Skipped);
        assert_eq!(job.state(), SyncState::Skipped);

        // Two gate markers and the held lease; the old name is unlocked
        assert_eq!(h.store.len().await, 3);
        assert!(
            h.ctx
                .mutex
                .try_acquire(&DistributedMutex::resource_key("writer"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_releases_mutex() {
        let mut api = MockBlogApi::new();
        api.expect_fetch_account_info()
            .times(1)
            .return_once(|_| Ok(account_info("writer")));
        api.expect_fetch_posts_page()
            .times(1)
            .return_once(|_, _, _| Err(AppError::Upstream("HTTP 503".to_string())));
        let h = harness(api, true).await;

        let mut job = SyncJob::new(h.ctx.clone(), h.account.id.clone());
        let error = job.run().await.unwrap_err();

        assert!(matches!(error, AppError::Upstream(_)));
        assert_eq!(job.state(), SyncState::Failed);
        assert!(matches!(
            h.ctx.gate.check("writer").await.unwrap(),
            GateStatus::Throttled { .. }
        ));
        assert!(
            h.ctx
                .mutex
                .try_acquire(&DistributedMutex::resource_key("writer"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_the_job() {
        let api = MockBlogApi::new();
        let h = harness(api, false).await;

        let mut job = SyncJob::new(h.ctx.clone(), h.account.id.clone());
        assert!(matches!(job.run().await, Err(AppError::Unauthorized)));
        assert_eq!(job.state(), SyncState::Failed);
    }

    #[tokio::test]
    async fn test_unknown_account_fails_before_mutex() {
        let api = MockBlogApi::new();
        let h = harness(api, true).await;

        let mut job = SyncJob::new(h.ctx.clone(), "missing");
        assert!(matches!(job.run().await, Err(AppError::NotFound)));
        assert_eq!(h.store.len().await, 0);
    }
}
