//! Common test utilities for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use blogmirror::config::{
    self, AppConfig, DatabaseConfig, KvBackend, LoggingConfig, SyncConfig, TumblrConfig,
};
use blogmirror::data::{Account, Credentials};
use blogmirror::error::AppError;
use blogmirror::sync::{SyncReport, WorkerPool};
use blogmirror::tumblr::{AvatarVariant, BlogApi, RawAccountInfo, RawBlog, RawPost};
use blogmirror::AppState;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Scripted stand-in for the Tumblr API
///
/// Serves fixed pages of posts and one account info payload, counts calls
/// and records how many account syncs overlapped.
pub struct FakeBlogApi {
    account: StdMutex<RawAccountInfo>,
    pages: StdMutex<Vec<Vec<RawPost>>>,
    fail_at_offset: StdMutex<Option<u32>>,
    delay: Duration,
    page_delay: Duration,
    pub page_calls: AtomicUsize,
    pub info_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeBlogApi {
    pub fn new(account: RawAccountInfo, pages: Vec<Vec<RawPost>>) -> Self {
        Self {
            account: StdMutex::new(account),
            pages: StdMutex::new(pages),
            fail_at_offset: StdMutex::new(None),
            delay: Duration::ZERO,
            page_delay: Duration::ZERO,
            page_calls: AtomicUsize::new(0),
            info_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Slow down account info calls so concurrent syncs overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Slow down every page of posts
    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Answer the page at `offset` with an upstream error
    pub fn fail_at(&self, offset: u32) {
        *self.fail_at_offset.lock().unwrap() = Some(offset);
    }

    pub fn set_pages(&self, pages: Vec<Vec<RawPost>>) {
        *self.pages.lock().unwrap() = pages;
    }
}

#[async_trait]
impl BlogApi for FakeBlogApi {
    async fn fetch_posts_page(
        &self,
        _blog_name: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<RawPost>, AppError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.page_delay).await;
        if *self.fail_at_offset.lock().unwrap() == Some(offset) {
            return Err(AppError::Upstream("HTTP 503 Service Unavailable".to_string()));
        }

        let index = (offset / limit) as usize;
        Ok(self
            .pages
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_account_info(
        &self,
        _credentials: &Credentials,
    ) -> Result<RawAccountInfo, AppError> {
        self.info_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(self.account.lock().unwrap().clone())
    }
}

/// Account info with one primary blog plus an optional side blog
pub fn account_info(primary: &str, side: Option<&str>) -> RawAccountInfo {
    let mut blogs = vec![RawBlog {
        name: primary.to_string(),
        uuid: format!("t:{}", primary),
        title: format!("{} title", primary),
        primary: true,
        followers: 42,
        posts: 107,
        avatar: vec![
            AvatarVariant {
                width: 64,
                height: 64,
                url: format!("https://64.media.tumblr.com/{}/64.png", primary),
            },
            AvatarVariant {
                width: 128,
                height: 128,
                url: format!("https://64.media.tumblr.com/{}/128.png", primary),
            },
        ],
    }];
    if let Some(side) = side {
        blogs.push(RawBlog {
            name: side.to_string(),
            uuid: format!("t:{}", side),
            title: format!("{} title", side),
            primary: false,
            followers: 1,
            posts: 0,
            avatar: Vec::new(),
        });
    }

    RawAccountInfo {
        name: primary.to_string(),
        likes: 0,
        following: 0,
        blogs,
    }
}

/// One fetched post
///
/// Every tenth post is a reblog; note counts and timestamps vary by id.
pub fn raw_post(blog: &str, id: i64) -> RawPost {
    RawPost {
        id,
        post_url: format!("https://{}.tumblr.com/post/{}/post-{}", blog, id, id),
        post_type: if id % 3 == 0 { "photo" } else { "text" }.to_string(),
        timestamp: 1_588_000_000 + id * 60,
        date: "2020-04-27 15:06:40 GMT".to_string(),
        tags: vec![format!("tag-{}", id % 4), "common".to_string()],
        note_count: (id * 7) % 101,
        title: (id % 2 == 0).then(|| format!("Post {}", id)),
        summary: Some(format!("Summary of post {}", id)),
        slug: Some(format!("post-{}", id)),
        mobile: (id % 5 == 0).then_some(true),
        reblogged_from_id: (id % 10 == 0).then(|| serde_json::json!(id + 1_000_000)),
    }
}

/// Pages of the given sizes with consecutive post ids starting at 1
pub fn pages(blog: &str, sizes: &[usize]) -> Vec<Vec<RawPost>> {
    let mut next = 1;
    sizes
        .iter()
        .map(|size| {
            let page = (next..next + *size as i64)
                .map(|id| raw_post(blog, id))
                .collect();
            next += *size as i64;
            page
        })
        .collect()
}

/// Application wired to a [`FakeBlogApi`] and a temporary database
pub struct TestApp {
    pub state: AppState,
    pub workers: Option<WorkerPool>,
    pub api: Arc<FakeBlogApi>,
    pub _temp_dir: TempDir,
}

pub fn test_config(temp_dir: &TempDir, kv_backend: KvBackend) -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            path: temp_dir.path().join("test.db"),
        },
        tumblr: TumblrConfig {
            api_base_url: "http://127.0.0.1:9/v2".to_string(),
            consumer_key: "test-consumer-key".to_string(),
            consumer_secret: "test-consumer-secret".to_string(),
            page_size: 50,
            avatar_size: 128,
            max_pages: None,
            request_timeout_seconds: 5,
        },
        sync: SyncConfig {
            profile: config::SyncProfile::Development,
            mutex_lease_seconds: 60,
            workers: 2,
            queue_capacity: 16,
            kv_backend,
            ..SyncConfig::default()
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

impl TestApp {
    pub async fn new(api: FakeBlogApi, kv_backend: KvBackend) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(&temp_dir, kv_backend);
        let api = Arc::new(api);

        let (state, workers) = AppState::with_api(config, api.clone()).await.unwrap();

        Self {
            state,
            workers: Some(workers),
            api,
            _temp_dir: temp_dir,
        }
    }

    /// Create an account, optionally with stored credentials
    pub async fn account(&self, username: &str, with_credentials: bool) -> Account {
        let account = self.state.db.create_account(username).await.unwrap();
        if with_credentials {
            self.state
                .db
                .store_credentials(&account.id, "user-token", "user-secret")
                .await
                .unwrap();
        }
        account
    }

    pub fn reports(&self) -> broadcast::Receiver<SyncReport> {
        self.state.queue.subscribe()
    }
}

/// Wait for the next finished job
pub async fn next_report(reports: &mut broadcast::Receiver<SyncReport>) -> SyncReport {
    tokio::time::timeout(Duration::from_secs(10), reports.recv())
        .await
        .expect("sync job finished in time")
        .expect("report channel open")
}
