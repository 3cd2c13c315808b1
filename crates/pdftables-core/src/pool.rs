//! Worker pool for extracting many documents concurrently.
//!
//! Each worker task pulls jobs from a shared channel and runs one cascade at
//! a time on the blocking thread pool, bounded by the hard timeout. The
//! cascade itself stays sequential; concurrency is across documents only.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolSettings;
use crate::orchestrator::{CANCELLED_NOTE, TableExtractor};
use crate::{ExtractError, Outcome, PrivilegeTier, ResultAggregate};

/// A document extraction job submitted to the pool.
pub struct ExtractJob {
    pub path: PathBuf,
    pub tier: PrivilegeTier,
    pub result_tx: oneshot::Sender<Result<ResultAggregate, ExtractError>>,
}

/// A pool of worker tasks that process extraction jobs.
///
/// Submit jobs via [`submit()`](ExtractionPool::submit), receive results via
/// the oneshot receiver paired with each job.
pub struct ExtractionPool {
    job_tx: async_channel::Sender<ExtractJob>,
    pool_handle: JoinHandle<()>,
}

impl ExtractionPool {
    /// Create a new pool with `settings.num_workers` worker tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        extractor: Arc<TableExtractor>,
        cancel: CancellationToken,
        settings: &PoolSettings,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<ExtractJob>();
        let num_workers = settings.num_workers.max(1);
        let hard_timeout = settings.hard_timeout;

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers);
            for worker in 0..num_workers {
                handles.push(tokio::spawn(worker_loop(
                    worker,
                    job_rx.clone(),
                    extractor.clone(),
                    cancel.clone(),
                    hard_timeout,
                )));
            }

            // Drop our clone so workers are the last holders
            drop(job_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    /// Submit a job to the pool.
    pub async fn submit(&self, job: ExtractJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Submit `path` and return the receiver for its result.
    pub async fn submit_path(
        &self,
        path: PathBuf,
        tier: PrivilegeTier,
    ) -> oneshot::Receiver<Result<ResultAggregate, ExtractError>> {
        let (result_tx, result_rx) = oneshot::channel();
        self.submit(ExtractJob {
            path,
            tier,
            result_tx,
        })
        .await;
        result_rx
    }

    /// Close the pool and wait for all workers to finish queued jobs.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

/// Aggregate returned for jobs dequeued after cancellation.
fn cancelled_aggregate() -> ResultAggregate {
    ResultAggregate {
        outcome: Outcome::Cancelled,
        warnings: vec![CANCELLED_NOTE.to_string()],
        ..ResultAggregate::empty()
    }
}

async fn worker_loop(
    worker: usize,
    job_rx: async_channel::Receiver<ExtractJob>,
    extractor: Arc<TableExtractor>,
    cancel: CancellationToken,
    hard_timeout: Duration,
) {
    while let Ok(job) = job_rx.recv().await {
        if cancel.is_cancelled() {
            tracing::debug!(worker, path = %job.path.display(), "skipping: cancelled");
            let _ = job.result_tx.send(Ok(cancelled_aggregate()));
            continue;
        }

        // A per-job child token lets a hard timeout stop the cascade at its
        // next checkpoint; the blocking thread itself cannot be killed.
        let job_cancel = cancel.child_token();
        let task = {
            let extractor = extractor.clone();
            let job_cancel = job_cancel.clone();
            let path = job.path.clone();
            let tier = job.tier;
            tokio::task::spawn_blocking(move || extractor.extract(&path, tier, Some(&job_cancel)))
        };

        let result = match tokio::time::timeout(hard_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                tracing::warn!(worker, path = %job.path.display(), error = %e, "extraction worker panicked");
                Err(ExtractError::WorkerPanicked(e.to_string()))
            }
            Err(_) => {
                job_cancel.cancel();
                tracing::warn!(
                    worker,
                    path = %job.path.display(),
                    timeout_secs = hard_timeout.as_secs_f64(),
                    "extraction exceeded hard timeout"
                );
                Err(ExtractError::HardTimeout(hard_timeout))
            }
        };
        let _ = job.result_tx.send(result);
    }
}
