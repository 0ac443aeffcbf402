//! Server bootstrap - the composition root.
//!
//! The ONLY place where infrastructure is wired together: database,
//! repositories, broker, synthesis facade, audio pipeline, transcoder
//! and worker pool are all instantiated here and injected as ports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use cantus_core::domain::{JobStatus, QualityProfile};
use cantus_core::ports::{
    JobRepository, QualityProfileRepository, ReferenceAudioProcessor, SpeechSynthesizer,
    TaskQueue, Transcoder, VoiceProfileRepository,
};
use cantus_core::settings::Settings;
use cantus_db::{setup_database, Repositories};
use cantus_engine::backend::SynthesisBackend;
use cantus_engine::{
    AudioNormalizer, BreakerRegistry, FfmpegTranscoder, HttpSynthesisBackend, SynthesisFacade,
};
use cantus_queue::MemoryBroker;
use cantus_worker::{install_presets, WorkerDeps, WorkerPool};

use crate::state::AppState;

/// Orphan grace at startup. The broker is in-process and a clean
/// shutdown returns interrupted jobs to `queued`, so any `processing`
/// row a fresh process finds is a crash leftover, whatever its age.
const ORPHAN_GRACE: Duration = Duration::ZERO;

/// Application context for the HTTP adapter.
pub struct AxumContext {
    pub settings: Settings,
    pub jobs: Arc<dyn JobRepository>,
    pub voices: Arc<dyn VoiceProfileRepository>,
    pub quality: Arc<dyn QualityProfileRepository>,
    pub queue: Arc<dyn TaskQueue>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub audio: Arc<dyn ReferenceAudioProcessor>,
    pub transcoder: Arc<dyn Transcoder>,
    shutting_down: AtomicBool,
}

impl AxumContext {
    /// Flip the gateway into drain mode: new jobs answer 503.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }
}

/// Bootstrap with the production HTTP sidecar backend.
pub async fn bootstrap(settings: Settings) -> Result<(AppState, WorkerPool)> {
    let backend = Arc::new(HttpSynthesisBackend::new(settings.engine_url.clone()));
    bootstrap_with_backend(settings, backend).await
}

/// Bootstrap with an injected backend (tests use the scripted fake).
pub async fn bootstrap_with_backend(
    settings: Settings,
    backend: Arc<dyn SynthesisBackend>,
) -> Result<(AppState, WorkerPool)> {
    settings.validate()?;

    for dir in [
        &settings.artifact_dir,
        &settings.voice_dir,
        &settings.upload_dir,
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
    }

    let pool = setup_database(&settings.database_path)
        .await
        .context("database setup failed")?;
    let repos = Repositories::new(&pool);

    repos
        .quality
        .seed_builtins(&QualityProfile::builtins())
        .await
        .map_err(|e| anyhow::anyhow!("seeding built-in profiles failed: {e}"))?;
    install_presets(&settings.voice_dir).context("installing voice presets failed")?;

    // Eager model load: the first request must not pay warm-up cost.
    let facade = SynthesisFacade::start(backend, &settings, &BreakerRegistry::new())
        .await
        .map_err(|e| anyhow::anyhow!("model load failed: {e}"))?;
    let synthesizer: Arc<dyn SpeechSynthesizer> = Arc::new(facade);

    // Visibility timeout outlives the synthesis deadline plus retries,
    // so a live job is never redelivered mid-flight.
    let visibility = settings.synthesis_timeout * 4 + Duration::from_secs(60);
    let queue: Arc<dyn TaskQueue> = Arc::new(MemoryBroker::new(
        visibility,
        settings.max_concurrent_jobs,
    ));

    recover_state(&repos, queue.as_ref()).await?;

    let deps = WorkerDeps {
        jobs: repos.jobs.clone(),
        voices: repos.voices.clone(),
        quality: repos.quality.clone(),
        queue: queue.clone(),
        synthesizer: synthesizer.clone(),
        audio: Arc::new(AudioNormalizer::new()),
        artifact_dir: settings.artifact_dir.clone(),
        voice_dir: settings.voice_dir.clone(),
    };
    let workers = WorkerPool::start(deps, settings.max_concurrent_jobs, settings.shutdown_grace);

    let context = Arc::new(AxumContext {
        jobs: repos.jobs,
        voices: repos.voices,
        quality: repos.quality,
        queue,
        synthesizer,
        audio: Arc::new(AudioNormalizer::new()),
        transcoder: Arc::new(FfmpegTranscoder::detect()) as Arc<dyn Transcoder>,
        settings,
        shutting_down: AtomicBool::new(false),
    });

    Ok((context, workers))
}

/// Startup reconciliation.
///
/// Jobs a clean shutdown handed back are already `queued` and get
/// re-enqueued below, which is what makes the drain-timeout
/// nack-with-requeue land on a future process instance. `processing`
/// rows mean the previous process died without draining; a fresh
/// process has no in-flight tasks, so they are recovered as
/// `abandoned`.
async fn recover_state(repos: &Repositories, queue: &dyn TaskQueue) -> Result<()> {
    let abandoned = repos
        .jobs
        .recover_orphans(ORPHAN_GRACE)
        .await
        .map_err(|e| anyhow::anyhow!("orphan recovery failed: {e}"))?;
    if !abandoned.is_empty() {
        tracing::warn!(count = abandoned.len(), "recovered orphaned jobs as abandoned");
    }

    let queued = repos
        .jobs
        .ids_by_status(JobStatus::Queued)
        .await
        .map_err(|e| anyhow::anyhow!("queued-job scan failed: {e}"))?;
    for id in queued {
        let request_id = repos
            .jobs
            .get(&id)
            .await
            .map(|job| job.request_id)
            .unwrap_or_default();
        if let Err(e) = queue.enqueue(id.clone(), request_id).await {
            tracing::error!(job_id = %id, error = %e, "could not re-enqueue queued job");
        } else {
            tracing::info!(job_id = %id, "re-enqueued job from previous run");
        }
    }
    Ok(())
}
