//! Sync queue and worker pool
//!
//! Requests go through a bounded channel. Each worker pulls one request at
//! a time and runs a [`SyncJob`] to completion. Failed jobs are reported,
//! not retried.

use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;

use super::job::{SyncContext, SyncJob, SyncOutcome};
use crate::error::AppError;
use crate::metrics::SYNC_QUEUE_DEPTH;

/// A queued sync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub account_id: String,
}

/// Outcome of one dequeued request, published to subscribers
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub account_id: String,
    /// Error message on failure
    pub result: Result<SyncOutcome, String>,
}

/// Producer side of the sync queue
#[derive(Clone)]
pub struct SyncQueue {
    sender: mpsc::Sender<SyncRequest>,
    reports: broadcast::Sender<SyncReport>,
}

impl SyncQueue {
    /// Queue a request, waiting while the queue is full
    pub async fn enqueue(&self, request: SyncRequest) -> Result<(), AppError> {
        SYNC_QUEUE_DEPTH.inc();
        if self.sender.send(request).await.is_err() {
            SYNC_QUEUE_DEPTH.dec();
            return Err(AppError::QueueClosed);
        }
        Ok(())
    }

    /// Receive reports of jobs finished after this call
    pub fn subscribe(&self) -> broadcast::Receiver<SyncReport> {
        self.reports.subscribe()
    }
}

/// Running worker tasks
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` tasks consuming a new queue of `capacity`
    pub fn start(ctx: Arc<SyncContext>, workers: usize, capacity: usize) -> (SyncQueue, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (reports, _) = broadcast::channel(capacity.max(16));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let ctx = ctx.clone();
                let receiver = receiver.clone();
                let reports = reports.clone();
                tokio::spawn(async move {
                    run_worker(worker, ctx, receiver, reports).await;
                })
            })
            .collect();

        tracing::info!(workers = workers.max(1), capacity, "Sync workers started");
        (SyncQueue { sender, reports }, Self { handles })
    }

    /// Wait for the workers to drain the queue
    ///
    /// Workers exit once every `SyncQueue` clone has been dropped and the
    /// remaining requests are processed.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(error) = handle.await {
                if error.is_panic() {
                    tracing::error!(%error, "Sync worker panicked");
                }
            }
        }
    }

    /// Stop the workers without draining
    pub fn abort(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn run_worker(
    worker: usize,
    ctx: Arc<SyncContext>,
    receiver: Arc<Mutex<mpsc::Receiver<SyncRequest>>>,
    reports: broadcast::Sender<SyncReport>,
) {
    loop {
        // Lock only while waiting so other workers can run jobs meanwhile
        let request = { receiver.lock().await.recv().await };
        let Some(request) = request else {
            break;
        };
        SYNC_QUEUE_DEPTH.dec();

        tracing::debug!(worker, account_id = %request.account_id, "Sync job dequeued");
        let mut job = SyncJob::new(ctx.clone(), request.account_id.clone());
        let result = job.run().await.map_err(|error| error.to_string());

        // No subscribers is fine
        let _ = reports.send(SyncReport {
            account_id: request.account_id,
            result,
        });
    }

    tracing::debug!(worker, "Sync worker stopped");
}
