//! Background blog sync
//!
//! - `interval`: per-blog throttle on an expiring marker
//! - `mutex`: lease-based single holder per blog
//! - `fetcher`: paginated reads from the upstream API
//! - `merge`: idempotent upserts into storage
//! - `job`: the orchestrator tying them together
//! - `worker`: queue and worker pool running jobs

mod fetcher;
mod interval;
mod job;
mod merge;
mod mutex;
mod worker;

pub use fetcher::{AccountInfo, BlogInfo, Fetcher, select_avatar};
pub use interval::{GateStatus, IntervalGate};
pub use job::{SyncContext, SyncJob, SyncOutcome, SyncState};
pub use merge::{MergeEngine, MergedAccount, normalize_post_url};
pub use mutex::{DistributedMutex, MutexLease};
pub use worker::{SyncQueue, SyncReport, SyncRequest, WorkerPool};
