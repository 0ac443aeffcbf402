//! Job store port.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobId, JobOutcome, JobStatus};
use crate::error::RepositoryError;

/// Listing filter and pagination.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub page: u32,
    pub page_size: u32,
}

/// One page of the job listing, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

/// Durable job storage.
///
/// Updates are atomic per record: a concurrent reader sees either the
/// pre-update or the post-update row, never a torn state. Status changes
/// are guarded by the transition graph inside the store, so a stale writer
/// gets [`RepositoryError::InvalidTransition`] instead of clobbering a
/// terminal record.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn get(&self, id: &JobId) -> Result<Job, RepositoryError>;

    async fn list(&self, filter: JobFilter) -> Result<JobPage, RepositoryError>;

    /// Remove the record. Returns the removed job so the caller can delete
    /// its artifact, or `None` when the id is unknown.
    async fn delete(&self, id: &JobId) -> Result<Option<Job>, RepositoryError>;

    /// `queued → processing`, stamping `started_at` and resetting progress.
    async fn mark_processing(&self, id: &JobId) -> Result<Job, RepositoryError>;

    /// Publish a progress checkpoint. Regressions are clamped away: the
    /// stored value never decreases.
    async fn set_progress(&self, id: &JobId, progress: f64) -> Result<(), RepositoryError>;

    /// Apply a terminal outcome, stamping `completed_at`.
    async fn finish(&self, id: &JobId, outcome: &JobOutcome) -> Result<(), RepositoryError>;

    /// Clean-shutdown hand-back: `processing → queued`, clearing
    /// `started_at` and resetting progress, so a future process
    /// instance redelivers the job. Called only by the worker pool's
    /// drain path, after it nacks the broker lease with requeue; never
    /// reachable from the HTTP surface. Returns `false` when the job is
    /// not currently `processing`.
    async fn requeue_interrupted(&self, id: &JobId) -> Result<bool, RepositoryError>;

    /// Set the cancellation tombstone on a live job. Returns `false` when
    /// the job is already terminal (nothing to cancel).
    async fn request_cancel(&self, id: &JobId) -> Result<bool, RepositoryError>;

    /// Read the tombstone; the worker polls this at progress checkpoints.
    async fn cancel_requested(&self, id: &JobId) -> Result<bool, RepositoryError>;

    /// All ids currently in the given status, oldest first. Used by the
    /// startup reconciliation pass to re-enqueue queued jobs.
    async fn ids_by_status(&self, status: JobStatus) -> Result<Vec<JobId>, RepositoryError>;

    /// Startup reconciliation: transition `processing` jobs older than
    /// `grace` (which cannot have an in-flight task in a fresh process)
    /// to `failed` with `error_kind = abandoned`. Returns the ids touched.
    async fn recover_orphans(&self, grace: Duration) -> Result<Vec<JobId>, RepositoryError>;

    /// Cheap connectivity probe for the health endpoint.
    async fn ping(&self) -> Result<(), RepositoryError>;
}
