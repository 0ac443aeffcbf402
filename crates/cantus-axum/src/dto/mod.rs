//! Wire shapes for the HTTP API.
//!
//! Responses re-shape domain records rather than serializing them raw:
//! server-side paths stay private, and the download location is exposed
//! as a URL instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cantus_core::domain::{
    Engine, Job, JobKind, JobMode, JobStatus, QualityParameters, QualityProfile, VoicePreset,
    VoiceProfile,
};
use cantus_core::error::ErrorKind;
use cantus_core::ports::JobPage;

/// Job view returned by every `/jobs` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub kind: JobKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<JobMode>,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_preset: Option<VoicePreset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_profile_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_profile_id: Option<String>,
    /// Set on completed clone jobs: the created voice profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Set on completed synthesize jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub request_id: String,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        let download_url = (job.status == JobStatus::Completed
            && job.artifact_path.is_some())
        .then(|| format!("/jobs/{}/download", job.id));

        Self {
            id: job.id.to_string(),
            kind: job.kind,
            mode: job.mode,
            status: job.status,
            progress: job.progress,
            text: job.text,
            source_language: job.source_language,
            target_language: job.target_language,
            voice_preset: job.voice_preset,
            voice_profile_id: job.voice_profile_id.map(|id| id.to_string()),
            quality_profile_id: job.quality_profile_id,
            voice_id: job.voice_id.map(|id| id.to_string()),
            download_url,
            error_kind: job.error_kind,
            error_message: job.error_message,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            request_id: job.request_id,
        }
    }
}

/// Paginated listing envelope.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub items: Vec<JobResponse>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

impl From<JobPage> for JobListResponse {
    fn from(page: JobPage) -> Self {
        Self {
            items: page.items.into_iter().map(JobResponse::from).collect(),
            page: page.page,
            page_size: page.page_size,
            total: page.total,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VoiceProfileResponse {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_text: Option<String>,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub usage_count: u64,
    pub created_at: DateTime<Utc>,
}

impl From<VoiceProfile> for VoiceProfileResponse {
    fn from(profile: VoiceProfile) -> Self {
        Self {
            id: profile.id.to_string(),
            name: profile.name,
            description: profile.description,
            language: profile.language,
            ref_text: profile.ref_text,
            duration_seconds: profile.duration_seconds,
            sample_rate: profile.sample_rate,
            usage_count: profile.usage_count,
            created_at: profile.created_at,
        }
    }
}

/// Quality profiles serialize as stored; nothing in them is private.
#[derive(Debug, Serialize)]
pub struct QualityProfileResponse {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub engine: Engine,
    pub parameters: QualityParameters,
    pub is_default: bool,
    pub is_builtin: bool,
}

impl From<QualityProfile> for QualityProfileResponse {
    fn from(profile: QualityProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name,
            description: profile.description,
            engine: profile.engine,
            parameters: profile.parameters,
            is_default: profile.is_default,
            is_builtin: profile.is_builtin,
        }
    }
}

/// Accepted clone job.
#[derive(Debug, Serialize)]
pub struct CloneAcceptedResponse {
    pub job_id: String,
}

/// `GET /jobs/{id}/formats`
#[derive(Debug, Serialize)]
pub struct FormatsResponse {
    pub formats: Vec<String>,
}

/// Partial quality-parameter update; unset knobs keep their stored
/// values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QualityParametersPatch {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub repetition_penalty: Option<f64>,
    pub length_penalty: Option<f64>,
    pub speed: Option<f64>,
    pub enable_text_splitting: Option<bool>,
    pub denoise: Option<bool>,
}

impl QualityParametersPatch {
    /// Merge onto `base`; the caller re-validates the result.
    #[must_use]
    pub fn apply(self, base: &QualityParameters) -> QualityParameters {
        QualityParameters {
            temperature: self.temperature.unwrap_or(base.temperature),
            top_p: self.top_p.unwrap_or(base.top_p),
            top_k: self.top_k.unwrap_or(base.top_k),
            repetition_penalty: self.repetition_penalty.unwrap_or(base.repetition_penalty),
            length_penalty: self.length_penalty.unwrap_or(base.length_penalty),
            speed: self.speed.unwrap_or(base.speed),
            enable_text_splitting: self
                .enable_text_splitting
                .unwrap_or(base.enable_text_splitting),
            denoise: self.denoise.unwrap_or(base.denoise),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cantus_core::domain::SynthesisCommand;

    #[test]
    fn download_url_only_on_completed_synthesis() {
        let mut job = Job::new_synthesis(
            SynthesisCommand {
                mode: JobMode::Preset,
                text: "x".to_string(),
                source_language: "en".to_string(),
                target_language: "en".to_string(),
                voice_preset: Some(VoicePreset::FemaleGeneric),
                voice_profile_id: None,
                quality_profile_id: None,
            },
            "req".to_string(),
        );
        assert!(JobResponse::from(job.clone()).download_url.is_none());

        job.status = JobStatus::Completed;
        job.artifact_path = Some("/data/a.pcm24k".into());
        let view = JobResponse::from(job);
        assert_eq!(
            view.download_url.as_deref(),
            Some(format!("/jobs/{}/download", view.id).as_str())
        );
    }

    #[test]
    fn parameter_patch_merges_over_base() {
        let base = QualityParameters::default();
        let patch = QualityParametersPatch {
            temperature: Some(1.2),
            denoise: Some(true),
            ..QualityParametersPatch::default()
        };
        let merged = patch.apply(&base);
        assert_eq!(merged.temperature, 1.2);
        assert!(merged.denoise);
        assert_eq!(merged.top_k, base.top_k);
    }
}
