//! The synthesis facade: one resident model, serialized access,
//! deadline, retry and breaker around every call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cantus_core::domain::{Engine, PcmAudio, CANONICAL_SAMPLE_RATE};
use cantus_core::ports::{EngineHealth, SpeechSynthesizer, SynthesisError, SynthesisTask};
use cantus_core::settings::{Device, Settings};

use crate::backend::SynthesisBackend;
use crate::breaker::{BreakerRegistry, CircuitBreaker};
use crate::denoise;
use crate::retry::RetryPolicy;

/// Facade over the single resident TTS model.
///
/// The model handle is not safe for concurrent inference, so every call
/// passes through `model_lock`; effective synthesis parallelism is one
/// per facade instance. Construction is eager: [`SynthesisFacade::start`]
/// loads the model before returning, so the first request never pays
/// load cost.
pub struct SynthesisFacade {
    backend: Arc<dyn SynthesisBackend>,
    model_lock: Mutex<()>,
    breaker: Arc<CircuitBreaker>,
    device: Device,
    timeout: Duration,
    retry: RetryPolicy,
}

impl SynthesisFacade {
    /// Eagerly load the model and return a ready facade.
    ///
    /// GPU load failures fall through to CPU only when
    /// `allow_cpu_fallback` is set; otherwise the error propagates and
    /// startup aborts.
    pub async fn start(
        backend: Arc<dyn SynthesisBackend>,
        settings: &Settings,
        breakers: &BreakerRegistry,
    ) -> Result<Self, SynthesisError> {
        let device = match backend.load(settings.device).await {
            Ok(()) => settings.device,
            Err(e) if settings.device == Device::Cuda && settings.allow_cpu_fallback => {
                tracing::warn!(error = %e, "GPU load failed, falling back to CPU");
                backend.load(Device::Cpu).await?;
                Device::Cpu
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            backend,
            model_lock: Mutex::new(()),
            breaker: breakers.get(Engine::Xtts, device),
            device,
            timeout: settings.synthesis_timeout,
            retry: RetryPolicy::default(),
        })
    }

    /// One guarded inference call: serialize on the model lock, enforce
    /// the deadline.
    async fn attempt(&self, task: &SynthesisTask) -> Result<PcmAudio, SynthesisError> {
        let _guard = self.model_lock.lock().await;
        match tokio::time::timeout(self.timeout, self.backend.synthesize(task)).await {
            Ok(result) => result,
            Err(_) => Err(SynthesisError::Timeout {
                elapsed: self.timeout,
            }),
        }
    }

    #[must_use]
    pub fn device(&self) -> Device {
        self.device
    }
}

#[async_trait]
impl SpeechSynthesizer for SynthesisFacade {
    async fn synthesize(&self, task: SynthesisTask) -> Result<PcmAudio, SynthesisError> {
        let mut attempt: u32 = 1;
        loop {
            // An open breaker fails fast without touching the model and
            // without counting toward the failure streak.
            self.breaker.admit()?;

            match self.attempt(&task).await {
                Ok(pcm) => {
                    self.breaker.on_success();
                    if pcm.sample_rate != CANONICAL_SAMPLE_RATE {
                        return Err(SynthesisError::Internal(format!(
                            "backend produced {} Hz, expected {CANONICAL_SAMPLE_RATE} Hz",
                            pcm.sample_rate
                        )));
                    }
                    let pcm = if task.params.denoise {
                        // Outside the model lock; the next job may enter
                        // inference while we post-process.
                        denoise::spectral_gate(&pcm)
                    } else {
                        pcm
                    };
                    return Ok(pcm);
                }
                Err(e) => {
                    self.breaker.on_failure();
                    let retriable = e.kind().is_retriable();
                    if retriable && attempt < self.retry.max_attempts {
                        let delay = self.retry.delay(attempt);
                        tracing::warn!(
                            request_id = %task.request_id,
                            attempt,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "synthesis attempt failed, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn health(&self) -> EngineHealth {
        EngineHealth {
            engine: Engine::Xtts,
            device: self.device,
            model_loaded: true,
            breaker: self.breaker.state_label().to_string(),
        }
    }
}
