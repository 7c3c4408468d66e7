//! Background worker: claims pending jobs and runs them through the pipeline.
//!
//! Up to `concurrency` jobs run at once on the current runtime, the same
//! `buffer_unordered` fan-out used for any other independent I/O-bound work.
//! Jobs share nothing but the storage backend and the job store; each writes
//! only its own keys.

use super::{JobState, JobStore};
use crate::config::ServiceConfig;
use crate::error::Result;
use crate::lesson::LessonPipeline;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Counts from one pass over the pending set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Pending when listed but taken by another worker before we claimed it.
    pub skipped: usize,
}

impl WorkSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Runs jobs from a [`JobStore`].
pub struct JobWorker {
    store: Arc<dyn JobStore>,
    pipeline: LessonPipeline,
    concurrency: usize,
    poll_interval: Duration,
}

impl JobWorker {
    pub fn new(store: Arc<dyn JobStore>, pipeline: LessonPipeline, config: &ServiceConfig) -> Self {
        Self {
            store,
            pipeline,
            concurrency: config.worker_concurrency.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    /// Claim and run every job that is pending right now.
    pub async fn run_once(&self) -> Result<WorkSummary> {
        self.drain(&AtomicBool::new(false)).await
    }

    /// One pass over the pending set. Once `stopping` is set, jobs not yet
    /// claimed are skipped; claimed jobs run to completion.
    async fn drain(&self, stopping: &AtomicBool) -> Result<WorkSummary> {
        let pending = self.store.pending().await?;
        if pending.is_empty() {
            return Ok(WorkSummary::default());
        }
        debug!("{} pending jobs", pending.len());

        let outcomes: Vec<Result<Option<JobState>>> = stream::iter(pending)
            .map(|record| async move {
                if stopping.load(Ordering::SeqCst) {
                    return Ok(None);
                }
                self.process_job(&record.job_id).await
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = WorkSummary::default();
        for outcome in outcomes {
            match outcome {
                Ok(Some(JobState::Succeeded)) => summary.succeeded += 1,
                Ok(Some(_)) => summary.failed += 1,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    // The job ran (or not) but its record could not be written.
                    error!("Job bookkeeping failed: {}", e);
                    summary.failed += 1;
                }
            }
        }
        info!(
            "Processed {} jobs ({} succeeded, {} failed)",
            summary.processed(),
            summary.succeeded,
            summary.failed
        );
        Ok(summary)
    }

    /// Poll for work until `shutdown` resolves.
    ///
    /// On shutdown no further jobs are claimed, and jobs already running are
    /// finished and recorded before this returns.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let stopping = AtomicBool::new(false);
        info!(
            "Worker started (concurrency {}, poll every {:?})",
            self.concurrency, self.poll_interval
        );
        loop {
            let pass = self.drain(&stopping);
            tokio::pin!(pass);
            let outcome = tokio::select! {
                outcome = &mut pass => outcome,
                _ = &mut shutdown => {
                    info!("Shutdown requested, finishing running jobs");
                    stopping.store(true, Ordering::SeqCst);
                    if let Err(e) = pass.await {
                        error!("Polling job store failed: {}", e);
                    }
                    break;
                }
            };
            if let Err(e) = outcome {
                error!("Polling job store failed: {}", e);
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Claim one job, run it, and record the terminal state.
    ///
    /// Returns `None` if the job was not ours to run.
    pub async fn process_job(&self, job_id: &str) -> Result<Option<JobState>> {
        let Some(mut record) = self.store.claim(job_id).await? else {
            debug!("Job {} already claimed", job_id);
            return Ok(None);
        };

        match self.pipeline.run(&record.spec()).await {
            Ok(result) => record.succeed(result)?,
            Err(e) => record.fail(e.to_string())?,
        }
        self.store.update(&record).await?;
        Ok(Some(record.state))
    }
}
