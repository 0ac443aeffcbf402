//! Per-task execution: one leased broker task, driven to an ack.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Instrument;

use cantus_core::domain::{Job, JobKind, JobOutcome};
use cantus_core::error::RepositoryError;
use cantus_core::ports::{
    JobRepository, QualityProfileRepository, ReferenceAudioProcessor, SpeechSynthesizer,
    TaskLease, TaskQueue, VoiceProfileRepository,
};

use crate::clone::run_clone_job;
use crate::error::JobFailure;
use crate::synthesis::run_synthesis_job;

/// Dependencies for one worker slot: cloned Arcs to ports, no locks of
/// its own.
#[derive(Clone)]
pub struct WorkerDeps {
    pub jobs: Arc<dyn JobRepository>,
    pub voices: Arc<dyn VoiceProfileRepository>,
    pub quality: Arc<dyn QualityProfileRepository>,
    pub queue: Arc<dyn TaskQueue>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub audio: Arc<dyn ReferenceAudioProcessor>,
    pub artifact_dir: PathBuf,
    pub voice_dir: PathBuf,
}

impl WorkerDeps {
    /// Cooperative-cancellation checkpoint: honor the tombstone, then
    /// publish progress.
    pub(crate) async fn checkpoint(&self, job: &Job, progress: f64) -> Result<(), JobFailure> {
        if self.jobs.cancel_requested(&job.id).await? {
            return Err(JobFailure::cancelled());
        }
        self.jobs.set_progress(&job.id, progress).await?;
        Ok(())
    }
}

/// Drive one lease to completion and settle it with the broker.
///
/// Delivery is at-least-once, so everything here is idempotent at the
/// level of "produce the outcome for this job id": redeliveries of
/// terminal jobs ack without touching state.
pub async fn process_lease(deps: &WorkerDeps, lease: TaskLease) {
    let span = tracing::info_span!(
        "job",
        job_id = %lease.job_id,
        request_id = %lease.request_id,
        attempt = lease.attempt
    );
    process_lease_inner(deps, lease).instrument(span).await;
}

async fn process_lease_inner(deps: &WorkerDeps, lease: TaskLease) {
    let job = match deps.jobs.get(&lease.job_id).await {
        Ok(job) => job,
        Err(RepositoryError::NotFound(_)) => {
            // Deleted between enqueue and dequeue.
            tracing::info!("job vanished before pickup, dropping task");
            settle(deps, lease.token).await;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "could not load job, dropping task");
            settle(deps, lease.token).await;
            return;
        }
    };

    if job.status.is_terminal() {
        tracing::info!(status = %job.status, "redelivery of a settled job, ignoring");
        settle(deps, lease.token).await;
        return;
    }

    let job = match deps.jobs.mark_processing(&job.id).await {
        Ok(job) => job,
        Err(RepositoryError::InvalidTransition(_)) => {
            // Another delivery beat us to it.
            settle(deps, lease.token).await;
            return;
        }
        Err(e) => {
            tracing::error!(error = %e, "could not mark job processing");
            settle(deps, lease.token).await;
            return;
        }
    };

    let result = match job.kind {
        JobKind::Synthesize => run_synthesis_job(deps, &job).await,
        JobKind::Clone => run_clone_job(deps, &job).await,
    };

    let outcome = match result {
        Ok(outcome) => {
            tracing::info!("job completed");
            outcome
        }
        Err(failure) => {
            tracing::warn!(kind = %failure.kind, message = %failure.message, "job failed");
            JobOutcome::Failed {
                kind: failure.kind,
                message: failure.message,
            }
        }
    };

    if let Err(e) = deps.jobs.finish(&job.id, &outcome).await {
        // The record may have been deleted mid-flight; the task is still
        // settled so the broker does not redeliver a terminal job.
        tracing::warn!(error = %e, "could not persist job outcome");
    }

    settle(deps, lease.token).await;
}

async fn settle(deps: &WorkerDeps, token: cantus_core::ports::TaskToken) {
    if let Err(e) = deps.queue.ack(token).await {
        tracing::debug!(error = %e, "ack failed (stale lease after visibility timeout?)");
    }
}
