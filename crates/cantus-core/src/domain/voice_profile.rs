//! Voice profiles: persisted, canonicalized reference-audio recordings.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque stable identifier of a voice profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoiceProfileId(Uuid);

impl VoiceProfileId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for VoiceProfileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VoiceProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A cloned voice: the canonical 24 kHz mono reference plus metadata.
///
/// Created by clone jobs, read by the synthesis facade, never mutated by
/// the worker beyond `usage_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub id: VoiceProfileId,
    pub name: String,
    pub description: Option<String>,
    pub language: String,
    /// Canonicalized 24 kHz mono PCM file on disk.
    pub reference_audio_path: PathBuf,
    /// Optional transcript of the reference. Advisory; unused by the
    /// engine, reserved for engines that condition on it.
    pub ref_text: Option<String>,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

/// The fixed set of pre-baked voice references available to preset jobs.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum VoicePreset {
    FemaleGeneric,
    MaleGeneric,
    FemaleYoung,
    MaleDeep,
    FemaleWarm,
    MaleWarm,
    FemaleSoft,
    MaleSoft,
}

impl VoicePreset {
    /// File stem of the baked reference within the preset directory.
    #[must_use]
    pub fn file_stem(self) -> String {
        self.to_string()
    }
}
