//! Bounded-concurrency batches
//!
//! A batch runs keyed jobs with at most `limit` in flight and hands every
//! result back to the caller. When a job fails with an error that
//! [cancels the batch](MigrationError::cancels_batch), jobs that have not
//! started yet are reported as cancelled; jobs already running finish.

use crate::error::MigrationError;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-job outcome of one batch
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Successful jobs, in completion order
    pub completed: Vec<(String, T)>,
    pub failed: Vec<(String, MigrationError)>,
    /// Jobs never started because a sibling failed remotely
    pub cancelled: Vec<String>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            completed: Vec::new(),
            failed: Vec::new(),
            cancelled: Vec::new(),
        }
    }
}

impl<T> BatchOutcome<T> {
    /// First failure that cancelled the batch, else the first failure
    #[must_use]
    pub fn first_error(&self) -> Option<&(String, MigrationError)> {
        self.failed
            .iter()
            .find(|(_, err)| err.cancels_batch())
            .or_else(|| self.failed.first())
    }

    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

enum JobResult<T> {
    Done(T),
    Failed(MigrationError),
    Cancelled,
}

/// A bounded batch runner
#[derive(Debug, Clone, Copy)]
pub struct BoundedBatch {
    limit: usize,
    cancel_on_remote: bool,
}

impl BoundedBatch {
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            cancel_on_remote: true,
        }
    }

    /// A batch in which no failure cancels its siblings
    #[must_use]
    pub fn without_cancellation(mut self) -> Self {
        self.cancel_on_remote = false;
        self
    }

    #[inline]
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run every job through `task`
    pub async fn run<J, T, F, Fut>(&self, jobs: Vec<(String, J)>, task: F) -> BatchOutcome<T>
    where
        F: Fn(J) -> Fut,
        Fut: Future<Output = Result<T, MigrationError>>,
    {
        let tripped = AtomicBool::new(false);
        let tripped = &tripped;
        let task = &task;
        let cancel_on_remote = self.cancel_on_remote;

        let results: Vec<(String, JobResult<T>)> = stream::iter(jobs)
            .map(|(key, job)| async move {
                if tripped.load(Ordering::SeqCst) {
                    return (key, JobResult::Cancelled);
                }
                match task(job).await {
                    Ok(value) => (key, JobResult::Done(value)),
                    Err(err) => {
                        if cancel_on_remote && err.cancels_batch() {
                            tracing::warn!(key = %key, error = %err, "remote failure, cancelling unstarted jobs");
                            tripped.store(true, Ordering::SeqCst);
                        }
                        (key, JobResult::Failed(err))
                    }
                }
            })
            .buffer_unordered(self.limit)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        for (key, result) in results {
            match result {
                JobResult::Done(value) => outcome.completed.push((key, value)),
                JobResult::Failed(err) => outcome.failed.push((key, err)),
                JobResult::Cancelled => outcome.cancelled.push(key),
            }
        }
        outcome
    }
}
