//! The evaluation-engine seam.
//!
//! The coordinator never owns rule evaluation; it only pushes jobs into the
//! engine's queue and polls how many are still pending. [`AlertEngine`] is
//! that boundary, injected at construction rather than reached for as
//! ambient state.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use takt_core::EvalJob;

#[derive(Error, Debug)]
#[error("Alert engine error: {0}")]
pub struct EngineError(pub String);

#[async_trait]
pub trait AlertEngine: Send + Sync {
    /// Enqueue one evaluation job. Must not block on evaluation itself.
    async fn push_job(&self, job: EvalJob) -> Result<(), EngineError>;

    /// Number of jobs accepted but not yet evaluated.
    async fn pending_job_count(&self) -> Result<usize, EngineError>;
}

/// In-process job queue: the hand-off point between the coordinator and a
/// co-located evaluation engine, which drains it with [`JobQueue::pop`].
#[derive(Default)]
pub struct JobQueue {
    jobs: Mutex<VecDeque<EvalJob>>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the oldest pending job, if any.
    pub fn pop(&self) -> Option<EvalJob> {
        self.jobs.lock().unwrap().pop_front()
    }

    /// Drain every pending job.
    pub fn drain(&self) -> Vec<EvalJob> {
        self.jobs.lock().unwrap().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AlertEngine for JobQueue {
    async fn push_job(&self, job: EvalJob) -> Result<(), EngineError> {
        self.jobs.lock().unwrap().push_back(job);
        Ok(())
    }

    async fn pending_job_count(&self) -> Result<usize, EngineError> {
        Ok(self.jobs.lock().unwrap().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use takt_core::AlertRule;

    fn job(id: i64) -> EvalJob {
        EvalJob::regular(AlertRule {
            id,
            name: format!("rule-{id}"),
            frequency_secs: 60,
            last_eval: Utc::now(),
        })
    }

    #[tokio::test]
    async fn queue_counts_and_drains_in_order() {
        let queue = JobQueue::new();
        queue.push_job(job(1)).await.unwrap();
        queue.push_job(job(2)).await.unwrap();
        assert_eq!(queue.pending_job_count().await.unwrap(), 2);

        assert_eq!(queue.pop().unwrap().rule.id, 1);
        assert_eq!(queue.pop().unwrap().rule.id, 2);
        assert!(queue.pop().is_none());
        assert_eq!(queue.pending_job_count().await.unwrap(), 0);
    }
}
