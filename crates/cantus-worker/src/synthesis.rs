//! Synthesis job execution.

use std::path::PathBuf;

use cantus_core::domain::{Engine, Job, JobMode, JobOutcome, PcmAudio, QualityProfile};
use cantus_core::error::ErrorKind;
use cantus_core::ports::SynthesisTask;

use cantus_engine::audio::write_pcm_atomic;

use crate::error::JobFailure;
use crate::presets::preset_reference_path;
use crate::runner::WorkerDeps;

/// Resolve inputs, synthesize under the facade's policy, persist the
/// artifact.
///
/// Progress checkpoints double as cancellation points; there is no
/// mid-inference preemption.
pub async fn run_synthesis_job(deps: &WorkerDeps, job: &Job) -> Result<JobOutcome, JobFailure> {
    deps.checkpoint(job, 0.0).await?;

    let params = resolve_quality(deps, job).await?;
    let reference_audio_path = resolve_reference(deps, job).await?;
    deps.checkpoint(job, 0.1).await?;

    let text = job
        .text
        .clone()
        .ok_or_else(|| JobFailure::internal("synthesis job without text"))?;
    let language = job
        .target_language
        .clone()
        .or_else(|| job.source_language.clone())
        .ok_or_else(|| JobFailure::internal("synthesis job without language"))?;

    deps.checkpoint(job, 0.2).await?;
    let pcm = deps
        .synthesizer
        .synthesize(SynthesisTask {
            text,
            language,
            reference_audio_path,
            params: params.parameters,
            request_id: job.request_id.clone(),
        })
        .await?;
    deps.checkpoint(job, 0.9).await?;

    let artifact_path = persist_artifact(deps, job, &pcm).await?;

    if job.mode == Some(JobMode::VoiceClone) {
        if let Some(voice_id) = &job.voice_profile_id {
            deps.voices.increment_usage(voice_id).await?;
        }
    }

    Ok(JobOutcome::Completed { artifact_path })
}

async fn resolve_quality(deps: &WorkerDeps, job: &Job) -> Result<QualityProfile, JobFailure> {
    match &job.quality_profile_id {
        Some(id) => Ok(deps.quality.get(id).await?),
        None => Ok(deps.quality.get_default(Engine::Xtts).await?),
    }
}

async fn resolve_reference(deps: &WorkerDeps, job: &Job) -> Result<PathBuf, JobFailure> {
    match job.mode {
        Some(JobMode::Preset) => {
            let preset = job.voice_preset.ok_or_else(|| {
                JobFailure::internal("preset job without a voice preset")
            })?;
            let path = preset_reference_path(&deps.voice_dir, preset);
            if !path.exists() {
                return Err(JobFailure::new(
                    ErrorKind::Internal,
                    format!("preset reference missing: {}", path.display()),
                ));
            }
            Ok(path)
        }
        Some(JobMode::VoiceClone) => {
            let voice_id = job.voice_profile_id.as_ref().ok_or_else(|| {
                JobFailure::internal("voice_clone job without a voice profile id")
            })?;
            let profile = deps.voices.get(voice_id).await?;
            if !profile.reference_audio_path.exists() {
                return Err(JobFailure::new(
                    ErrorKind::Internal,
                    format!(
                        "reference audio missing for voice {voice_id}: {}",
                        profile.reference_audio_path.display()
                    ),
                ));
            }
            Ok(profile.reference_audio_path)
        }
        None => Err(JobFailure::internal("synthesis job without a mode")),
    }
}

async fn persist_artifact(
    deps: &WorkerDeps,
    job: &Job,
    pcm: &PcmAudio,
) -> Result<PathBuf, JobFailure> {
    let path = deps.artifact_dir.join(format!("{}.pcm24k", job.id));
    let pcm = pcm.clone();
    let write_path = path.clone();
    tokio::task::spawn_blocking(move || write_pcm_atomic(&write_path, &pcm))
        .await
        .map_err(|e| JobFailure::internal(format!("artifact write task failed: {e}")))?
        .map_err(|e| JobFailure::internal(format!("artifact write failed: {e}")))?;
    Ok(path)
}
