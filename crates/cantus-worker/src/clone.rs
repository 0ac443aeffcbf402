//! Clone job execution: canonicalize the upload, create the profile.

use chrono::Utc;

use cantus_core::domain::{Job, JobOutcome, VoiceProfile, VoiceProfileId};

use crate::error::JobFailure;
use crate::runner::WorkerDeps;

pub async fn run_clone_job(deps: &WorkerDeps, job: &Job) -> Result<JobOutcome, JobFailure> {
    deps.checkpoint(job, 0.0).await?;

    let request = job
        .clone_request
        .clone()
        .ok_or_else(|| JobFailure::internal("clone job without clone parameters"))?;

    let voice_id = VoiceProfileId::new();
    let reference_audio_path = deps.voice_dir.join(format!("{voice_id}.pcm24k"));

    deps.checkpoint(job, 0.1).await?;
    let normalized = deps
        .audio
        .normalize(&request.staged_audio_path, &reference_audio_path)
        .await?;
    deps.checkpoint(job, 0.8).await?;

    let profile = VoiceProfile {
        id: voice_id.clone(),
        name: request.name,
        description: request.description,
        language: request.language,
        reference_audio_path: reference_audio_path.clone(),
        ref_text: request.ref_text,
        duration_seconds: normalized.duration_seconds,
        sample_rate: normalized.sample_rate,
        usage_count: 0,
        created_at: Utc::now(),
    };

    if let Err(e) = deps.voices.insert(&profile).await {
        // Do not leave a canonical reference behind for a profile that
        // was never recorded.
        let _ = std::fs::remove_file(&reference_audio_path);
        return Err(e.into());
    }

    // The staged upload has served its purpose.
    if let Err(e) = std::fs::remove_file(&request.staged_audio_path) {
        tracing::debug!(
            path = %request.staged_audio_path.display(),
            error = %e,
            "could not remove staged upload"
        );
    }

    Ok(JobOutcome::CompletedClone { voice_id })
}
