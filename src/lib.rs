//! BlogMirror - mirrors Tumblr blogs into SQLite and serves note analytics
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - request_sync / top_posts / note_series                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ SyncQueue
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Sync Workers                            │
//! │  - interval gate + per-blog mutex (kv)                      │
//! │  - fetcher (Tumblr API) → merge engine                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Data Layer                              │
//! │  - SQLite (sqlx)                                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `service`: Operations exposed to a web front end
//! - `sync`: Background sync of blogs and posts
//! - `tumblr`: Tumblr API client and OAuth1 signing
//! - `kv`: Expiring key-value store behind the gate and the mutex
//! - `data`: Database layer
//! - `config`: Configuration management
//! - `error`: Error types

pub mod config;
pub mod data;
pub mod error;
pub mod kv;
pub mod metrics;
pub mod service;
pub mod sync;
pub mod tumblr;

use std::sync::Arc;

/// Application state shared by the binary and any front end
///
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Store behind the interval gate and the blog mutex
    pub kv: Arc<dyn kv::KeyValueStore>,

    /// Collaborators handed to every sync job
    pub sync: Arc<sync::SyncContext>,

    /// Producer side of the sync queue
    pub queue: sync::SyncQueue,

    /// Sync requests and analytics
    pub posts: Arc<service::PostsService>,
}

impl AppState {
    /// Initialize application state against the Tumblr API
    ///
    /// # Steps
    /// 1. Build HTTP client
    /// 2. Wire state through [`AppState::with_api`]
    ///
    /// # Returns
    /// The state and the started worker pool
    pub async fn new(
        config: config::AppConfig,
    ) -> Result<(Self, sync::WorkerPool), error::AppError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("BlogMirror/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(
                config.tumblr.request_timeout_seconds,
            ))
            .build()
            .map_err(|e| error::AppError::Internal(e.into()))?;

        let api = Arc::new(tumblr::TumblrClient::new(
            Arc::new(http_client),
            &config.tumblr,
        ));

        Self::with_api(config, api).await
    }

    /// Initialize application state with a given upstream API
    ///
    /// # Steps
    /// 1. Connect to SQLite database
    /// 2. Select the key-value backend
    /// 3. Build the sync context
    /// 4. Start the worker pool
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub async fn with_api(
        config: config::AppConfig,
        api: Arc<dyn tumblr::BlogApi>,
    ) -> Result<(Self, sync::WorkerPool), error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(
            data::Database::connect(&config.database.path).await?,
        );
        tracing::info!(path = %config.database.path.display(), "Database connected");

        // 2. Select the key-value backend
        let kv: Arc<dyn kv::KeyValueStore> = match config.sync.kv_backend {
            config::KvBackend::Sqlite => Arc::new(kv::SqliteStore::new(db.clone())),
            config::KvBackend::Memory => {
                tracing::warn!("Using process-local kv store; run a single worker process");
                Arc::new(kv::MemoryStore::new())
            }
        };

        // 3. Build the sync context
        let sync = Arc::new(sync::SyncContext::new(&config, db.clone(), kv.clone(), api));
        tracing::info!(
            interval_seconds = config.sync.interval().as_secs(),
            mutex_lease_seconds = config.sync.mutex_lease_seconds,
            "Sync context initialized"
        );

        // 4. Start the worker pool
        let (queue, workers) = sync::WorkerPool::start(
            sync.clone(),
            config.sync.workers,
            config.sync.queue_capacity,
        );

        let posts = Arc::new(service::PostsService::new(
            db.clone(),
            sync.gate.clone(),
            queue.clone(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok((
            Self {
                config: Arc::new(config),
                db,
                kv,
                sync,
                queue,
                posts,
            },
            workers,
        ))
    }

    /// Request a sync for every account with stored credentials
    ///
    /// Throttled accounts are skipped.
    ///
    /// # Returns
    /// Number of accepted requests
    pub async fn refresh_all(&self) -> Result<usize, error::AppError> {
        let accounts = self.db.list_accounts_with_credentials().await?;
        let mut accepted = 0;

        for account in &accounts {
            match self.posts.request_sync(&account.id).await {
                Ok(service::SyncRequestOutcome::Accepted) => accepted += 1,
                Ok(service::SyncRequestOutcome::Throttled { .. }) => {}
                Err(error::AppError::QueueClosed) => return Err(error::AppError::QueueClosed),
                Err(error) => {
                    tracing::warn!(account_id = %account.id, %error, "Refresh request failed");
                }
            }
        }

        tracing::info!(accounts = accounts.len(), accepted, "Refresh round queued");
        Ok(accepted)
    }
}
