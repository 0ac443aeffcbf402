//! Core domain types and port definitions for the cantus synthesis service.
//!
//! This crate is adapter-free: no HTTP, no SQL, no codecs. It owns the
//! data model (jobs, voice profiles, quality profiles), the error
//! taxonomy, inbound validation, configuration, and the trait ports that
//! `cantus-db`, `cantus-queue`, `cantus-engine` and `cantus-worker`
//! implement or consume.

pub mod domain;
pub mod error;
pub mod ports;
pub mod settings;
pub mod validation;

// Re-export commonly used types for convenience
pub use domain::{
    AudioFormat, CloneRequest, Engine, Job, JobId, JobKind, JobMode, JobOutcome, JobStatus,
    PcmAudio, QualityParameters, QualityProfile, SynthesisCommand, VoicePreset, VoiceProfile,
    VoiceProfileId, CANONICAL_SAMPLE_RATE,
};
pub use error::{CatalogError, ErrorKind, RepositoryError, ValidationError};
pub use ports::{
    AudioError, EngineHealth, JobFilter, JobPage, JobRepository, NormalizedReference,
    QualityProfilePatch, QualityProfileRepository, QueueError, QueueStats,
    ReferenceAudioProcessor, SpeechSynthesizer, SynthesisError, SynthesisTask, TaskLease,
    TaskQueue, TaskToken, TranscodeError, Transcoder, VoiceProfileRepository,
};
pub use settings::{Device, Settings, SettingsError};
