//! Port definitions: the trait seams between core and the adapter crates.

pub mod catalog;
pub mod engine;
pub mod queue;
pub mod store;

pub use catalog::{QualityProfilePatch, QualityProfileRepository, VoiceProfileRepository};
pub use engine::{
    AudioError, EngineHealth, NormalizedReference, ReferenceAudioProcessor, SpeechSynthesizer,
    SynthesisError, SynthesisTask, TranscodeError, Transcoder,
};
pub use queue::{QueueError, QueueStats, TaskLease, TaskQueue, TaskToken};
pub use store::{JobFilter, JobPage, JobRepository};
