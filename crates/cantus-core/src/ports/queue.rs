//! Task queue port: at-least-once delivery with visibility timeouts.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::JobId;

/// Handle for acknowledging one delivery of one task.
///
/// Tokens are per-delivery: redelivery of the same job after a visibility
/// timeout carries a fresh token, and the stale token no longer acks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskToken(pub u64);

impl fmt::Display for TaskToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// One dequeued task delivery.
#[derive(Debug, Clone)]
pub struct TaskLease {
    pub token: TaskToken,
    pub job_id: JobId,
    /// Correlation id of the request that enqueued the job.
    pub request_id: String,
    /// 1 on first delivery, incremented on each redelivery.
    pub attempt: u32,
}

/// Queue depth snapshot for the health probe.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueStats {
    pub ready: usize,
    pub in_flight: usize,
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// The broker is shutting down; no further deliveries.
    #[error("queue is closed")]
    Closed,

    #[error("queue error: {0}")]
    Internal(String),
}

/// Thin facade over the task broker.
///
/// Delivery is at-least-once: handlers must be idempotent at the level of
/// "produce the artifact for this job id". The number of concurrently
/// leased tasks is bounded by the pool size; further dequeues park until
/// an ack or nack frees a slot.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a job for processing.
    async fn enqueue(&self, job_id: JobId, request_id: String) -> Result<(), QueueError>;

    /// Wait for the next task. Returns `Ok(None)` when the broker closes,
    /// which is the worker's signal to exit its loop.
    async fn dequeue(&self) -> Result<Option<TaskLease>, QueueError>;

    /// Settle a delivery: the task is done (whatever the job outcome).
    async fn ack(&self, token: TaskToken) -> Result<(), QueueError>;

    /// Return a delivery; `requeue` controls whether it becomes ready
    /// again immediately or is dropped.
    async fn nack(&self, token: TaskToken, requeue: bool) -> Result<(), QueueError>;

    fn stats(&self) -> QueueStats;

    /// Stop delivering tasks; pending `dequeue` calls resolve to `None`.
    fn close(&self);
}
