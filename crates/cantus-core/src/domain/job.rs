//! Job record and lifecycle state machine.
//!
//! A job either renders an audio artifact (`kind = synthesize`) or produces
//! a voice profile from uploaded reference audio (`kind = clone`). Both kinds
//! share one queue, one worker pool and one polling endpoint.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::voice_profile::{VoicePreset, VoiceProfileId};
use crate::error::ErrorKind;

/// Opaque, globally unique job identifier.
///
/// Printable and stable for the life of the job; rendered as a hyphenated
/// UUID on the wire and in artifact file names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its wire form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Voice selection mode for a synthesis job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobMode {
    /// Use one of the pre-baked voice preset references.
    Preset,
    /// Use a user-cloned [`VoiceProfile`](crate::domain::VoiceProfile).
    VoiceClone,
}

/// What the job produces.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobKind {
    /// Produces a rendered audio artifact.
    Synthesize,
    /// Produces a [`VoiceProfile`](crate::domain::VoiceProfile), no artifact.
    Clone,
}

/// Durable job state.
///
/// Transitions are monotonic: `queued → processing → {completed, failed}`,
/// with `queued → failed` permitted for validation at dequeue time. There is
/// no transition out of a terminal state except deletion of the record.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether the state machine admits `self → next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Queued, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Terminal states admit no further transition.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Live states keep referenced voice profiles pinned.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Queued | Self::Processing)
    }
}

/// Parameters of a clone job, captured at submission time.
///
/// The uploaded reference audio is staged to disk by the HTTP layer before
/// the job is enqueued; the worker normalizes it from `staged_audio_path`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloneRequest {
    pub name: String,
    pub language: String,
    pub description: Option<String>,
    /// Advisory transcript of the reference audio. Unused by the engine,
    /// stored verbatim on the resulting profile.
    pub ref_text: Option<String>,
    pub staged_audio_path: PathBuf,
}

/// Validated synthesis submission, produced by the HTTP layer.
///
/// Downstream components never re-parse form data; invariants (mode/preset
/// pairing, text bounds, language shape) hold by construction.
#[derive(Debug, Clone)]
pub struct SynthesisCommand {
    pub mode: JobMode,
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    pub voice_preset: Option<VoicePreset>,
    pub voice_profile_id: Option<VoiceProfileId>,
    pub quality_profile_id: Option<String>,
}

/// A unit of work owned by the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// Voice selection mode; `None` for clone jobs.
    pub mode: Option<JobMode>,
    /// Sanitized input text; `None` for clone jobs.
    pub text: Option<String>,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub voice_preset: Option<VoicePreset>,
    pub voice_profile_id: Option<VoiceProfileId>,
    pub quality_profile_id: Option<String>,
    pub clone_request: Option<CloneRequest>,
    pub status: JobStatus,
    /// Monotonic non-decreasing, in `[0, 1]`.
    pub progress: f64,
    /// Set iff `status = completed` and `kind = synthesize`.
    pub artifact_path: Option<PathBuf>,
    /// Set iff `status = completed` and `kind = clone`.
    pub voice_id: Option<VoiceProfileId>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Correlation handle propagated from the inbound HTTP request.
    pub request_id: String,
    /// Cooperative-cancellation tombstone, honored by the worker at
    /// progress checkpoints.
    pub cancel_requested: bool,
}

impl Job {
    /// Build a queued synthesis job from a validated command.
    #[must_use]
    pub fn new_synthesis(cmd: SynthesisCommand, request_id: String) -> Self {
        Self {
            id: JobId::new(),
            kind: JobKind::Synthesize,
            mode: Some(cmd.mode),
            text: Some(cmd.text),
            source_language: Some(cmd.source_language),
            target_language: Some(cmd.target_language),
            voice_preset: cmd.voice_preset,
            voice_profile_id: cmd.voice_profile_id,
            quality_profile_id: cmd.quality_profile_id,
            clone_request: None,
            status: JobStatus::Queued,
            progress: 0.0,
            artifact_path: None,
            voice_id: None,
            error_kind: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            request_id,
            cancel_requested: false,
        }
    }

    /// Build a queued clone job.
    #[must_use]
    pub fn new_clone(req: CloneRequest, request_id: String) -> Self {
        Self {
            id: JobId::new(),
            kind: JobKind::Clone,
            mode: None,
            text: None,
            source_language: Some(req.language.clone()),
            target_language: None,
            voice_preset: None,
            voice_profile_id: None,
            quality_profile_id: None,
            clone_request: Some(req),
            status: JobStatus::Queued,
            progress: 0.0,
            artifact_path: None,
            voice_id: None,
            error_kind: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            request_id,
            cancel_requested: false,
        }
    }
}

/// Terminal outcome applied by the worker in a single atomic update.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Synthesis finished; the artifact was persisted at this path.
    Completed { artifact_path: PathBuf },
    /// Clone finished; a voice profile was created.
    CompletedClone { voice_id: VoiceProfileId },
    /// The job failed terminally.
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn transition_graph_is_monotonic() {
        use JobStatus::{Completed, Failed, Processing, Queued};

        assert!(Queued.can_transition_to(Processing));
        assert!(Queued.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        // No exit from terminal states, no skips backward.
        for terminal in [Completed, Failed] {
            for next in JobStatus::iter() {
                assert!(!terminal.can_transition_to(next));
            }
        }
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Queued));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!("QUEUED".parse::<JobStatus>().unwrap(), JobStatus::Queued);
        assert_eq!(
            "Processing".parse::<JobStatus>().unwrap(),
            JobStatus::Processing
        );
        assert!("done".parse::<JobStatus>().is_err());
    }

    #[test]
    fn new_synthesis_starts_queued_with_zero_progress() {
        let cmd = SynthesisCommand {
            mode: JobMode::Preset,
            text: "Hello, world.".to_string(),
            source_language: "en".to_string(),
            target_language: "en".to_string(),
            voice_preset: Some(VoicePreset::FemaleGeneric),
            voice_profile_id: None,
            quality_profile_id: None,
        };
        let job = Job::new_synthesis(cmd, "req-1".to_string());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert!(job.artifact_path.is_none());
        assert!(job.error_kind.is_none());
        assert_eq!(job.request_id, "req-1");
    }
}
