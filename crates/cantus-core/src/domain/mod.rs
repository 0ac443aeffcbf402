//! Domain types owned by the core crate.

pub mod audio;
pub mod job;
pub mod quality_profile;
pub mod voice_profile;

pub use audio::{AudioFormat, PcmAudio, CANONICAL_SAMPLE_RATE};
pub use job::{
    CloneRequest, Job, JobId, JobKind, JobMode, JobOutcome, JobStatus, SynthesisCommand,
};
pub use quality_profile::{
    Engine, QualityParameters, QualityProfile, BALANCED_PARAMETERS, FAST_PARAMETERS,
    HIGH_QUALITY_PARAMETERS, RESERVED_PROFILE_PREFIX,
};
pub use voice_profile::{VoicePreset, VoiceProfile, VoiceProfileId};
