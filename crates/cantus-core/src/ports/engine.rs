//! Engine-side ports: synthesis, reference-audio processing, transcoding.
//!
//! These traits are the only surface the worker and the HTTP adapter see;
//! the engine crate implements them and is injected at the composition
//! root, keeping core free of any inference or codec dependency.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::{AudioFormat, Engine, PcmAudio, QualityParameters};
use crate::error::ErrorKind;
use crate::settings::Device;

/// One synthesis invocation, fully resolved by the worker.
#[derive(Debug, Clone)]
pub struct SynthesisTask {
    /// Already sanitized.
    pub text: String,
    /// Already validated.
    pub language: String,
    /// Canonical 24 kHz mono PCM reference.
    pub reference_audio_path: PathBuf,
    /// Merged per the selected quality profile, verbatim.
    pub params: QualityParameters,
    pub request_id: String,
}

/// Typed failure of a synthesis call.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Device out of memory, reported by the model.
    #[error("engine out of memory: {0}")]
    OutOfMemory(String),

    /// Model I/O or device initialization reported as retriable.
    #[error("transient backend failure: {0}")]
    TransientBackend(String),

    /// The per-call deadline elapsed.
    #[error("synthesis deadline exceeded after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// The breaker is open; the model was not touched.
    #[error("circuit open, retry in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    /// The engine rejected the inputs.
    #[error("engine rejected input: {0}")]
    InvalidInput(String),

    /// Anything unclassified.
    #[error("engine failure: {0}")]
    Internal(String),
}

impl SynthesisError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OutOfMemory(_) => ErrorKind::OutOfMemory,
            Self::TransientBackend(_) => ErrorKind::TransientBackend,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::InvalidInput(_) => ErrorKind::ValidationError,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Engine readiness, surfaced by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub engine: Engine,
    pub device: Device,
    pub model_loaded: bool,
    /// Breaker state label: `closed`, `open` or `half_open`.
    pub breaker: String,
}

/// The single neural text-to-speech capability.
///
/// Implementations serialize calls internally (the model handle is not
/// safe for concurrent inference) and own retry, deadline and breaker
/// policy; callers see only the final typed outcome.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `task.text` as 24 kHz mono PCM using the reference voice.
    async fn synthesize(&self, task: SynthesisTask) -> Result<PcmAudio, SynthesisError>;

    async fn health(&self) -> EngineHealth;
}

/// Failure while decoding or normalizing reference audio.
#[derive(Debug, Error)]
pub enum AudioError {
    /// The container or codec could not be decoded.
    #[error("could not decode audio: {0}")]
    Decode(String),

    /// Post-trim duration below the 3 s floor. There is no long
    /// counterpart: over-long audio is truncated, not rejected.
    #[error("reference audio too short after trimming: {seconds:.2}s")]
    TooShort { seconds: f64 },

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AudioError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Decode(_) | Self::TooShort { .. } => ErrorKind::ValidationError,
            Self::Resample(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }
}

/// Result of canonicalizing an uploaded reference.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedReference {
    pub duration_seconds: f64,
    pub sample_rate: u32,
}

/// Decodes and canonicalizes uploaded reference audio.
#[async_trait]
pub trait ReferenceAudioProcessor: Send + Sync {
    /// Decode just enough of `path` to learn its duration, for the upload
    /// gate.
    async fn probe_duration(&self, path: &Path) -> Result<f64, AudioError>;

    /// Resample to 24 kHz, downmix to mono, trim edge silence, truncate
    /// to the 300 s ceiling and write the canonical PCM file to `dest`
    /// atomically. Rejects audio shorter than 3 s after trimming.
    async fn normalize(&self, src: &Path, dest: &Path) -> Result<NormalizedReference, AudioError>;
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    /// The format is known but no encoder is available on this host.
    #[error("format not available: {0}")]
    Unavailable(AudioFormat),

    /// The external encoder failed.
    #[error("transcode failed: {0}")]
    Tool(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pure `(pcm, format) → bytes` container transcoder.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        pcm: &PcmAudio,
        format: AudioFormat,
    ) -> Result<Vec<u8>, TranscodeError>;

    /// Formats this host can actually produce.
    fn available_formats(&self) -> Vec<AudioFormat>;
}
