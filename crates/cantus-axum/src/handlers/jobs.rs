//! Handlers for the `/jobs` endpoints.
//!
//! All inbound validation happens here, before anything is persisted;
//! the worker receives fully validated commands and never re-parses
//! form data.

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Form, Json};
use serde::Deserialize;

use cantus_core::domain::{
    AudioFormat, Job, JobId, JobKind, JobMode, JobStatus, SynthesisCommand, VoicePreset,
};
use cantus_core::error::{CatalogError, ErrorKind, ValidationError};
use cantus_core::ports::JobFilter;
use cantus_core::validation::{coerce_enum, normalize_language, sanitize_text};

use crate::dto::{FormatsResponse, JobListResponse, JobResponse};
use crate::error::HttpError;
use crate::request_id::RequestId;
use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

// ── Request shapes ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateJobForm {
    pub mode: Option<String>,
    pub text: Option<String>,
    pub source_language: Option<String>,
    pub target_language: Option<String>,
    pub voice_preset: Option<String>,
    pub voice_profile_id: Option<String>,
    pub quality_profile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub format: Option<String>,
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ValidationError::new(field, "is required"))
}

fn parse_job_id(raw: &str) -> Result<JobId, HttpError> {
    JobId::parse(raw).map_err(|_| HttpError::not_found(format!("job '{raw}'")))
}

/// Assemble and fully validate the synthesis command.
async fn validate_command(
    state: &AppState,
    form: CreateJobForm,
) -> Result<SynthesisCommand, HttpError> {
    let mode: JobMode = coerce_enum("mode", required("mode", &form.mode)?)?;
    let text = sanitize_text(required("text", &form.text)?)?;
    let source_language =
        normalize_language("source_language", required("source_language", &form.source_language)?)?;
    let target_language = match &form.target_language {
        Some(raw) if !raw.trim().is_empty() => normalize_language("target_language", raw)?,
        _ => source_language.clone(),
    };

    let (voice_preset, voice_profile_id) = match mode {
        JobMode::Preset => {
            let preset: VoicePreset =
                coerce_enum("voice_preset", required("voice_preset", &form.voice_preset)?)?;
            (Some(preset), None)
        }
        JobMode::VoiceClone => {
            let raw = required("voice_profile_id", &form.voice_profile_id)?;
            let id = cantus_core::domain::VoiceProfileId::parse(raw).map_err(|_| {
                ValidationError::new("voice_profile_id", format!("'{raw}' is not a valid id"))
            })?;
            // Referential integrity holds before the job is persisted.
            match state.voices.get(&id).await {
                Ok(_) => {}
                Err(CatalogError::NotFound(_)) => {
                    return Err(ValidationError::new(
                        "voice_profile_id",
                        format!("voice profile '{id}' does not exist"),
                    )
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
            (None, Some(id))
        }
    };

    let quality_profile_id = match &form.quality_profile_id {
        Some(raw) if !raw.trim().is_empty() => {
            let id = raw.trim().to_ascii_lowercase();
            match state.quality.get(&id).await {
                Ok(profile) => Some(profile.id),
                Err(CatalogError::NotFound(_)) => {
                    let accepted = state
                        .quality
                        .list(None)
                        .await
                        .map(|profiles| profiles.into_iter().map(|p| p.id).collect())
                        .unwrap_or_default();
                    return Err(ValidationError::unknown_value(
                        "quality_profile_id",
                        raw,
                        accepted,
                    )
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
        }
        _ => None,
    };

    Ok(SynthesisCommand {
        mode,
        text,
        source_language,
        target_language,
        voice_preset,
        voice_profile_id,
        quality_profile_id,
    })
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// `POST /jobs`
pub async fn create(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Form(form): Form<CreateJobForm>,
) -> Result<(StatusCode, Json<JobResponse>), HttpError> {
    if state.is_shutting_down() {
        return Err(HttpError::shutting_down());
    }

    let command = validate_command(&state, form).await?;
    let job = Job::new_synthesis(command, request_id.to_string());

    state.jobs.insert(&job).await?;
    if let Err(e) = state
        .queue
        .enqueue(job.id.clone(), job.request_id.clone())
        .await
    {
        // Do not leave an accepted record that no worker will ever see.
        let _ = state.jobs.delete(&job.id).await;
        return Err(e.into());
    }

    tracing::info!(job_id = %job.id, "synthesis job queued");
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job))))
}

/// `GET /jobs`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<JobListResponse>, HttpError> {
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(ValidationError::new(
            "page_size",
            format!("must be within 1..={MAX_PAGE_SIZE}"),
        )
        .into());
    }
    let status = match &query.status {
        Some(raw) => Some(coerce_enum::<JobStatus>("status", raw)?),
        None => None,
    };

    let jobs = state
        .jobs
        .list(JobFilter {
            status,
            page: query.page.unwrap_or(1).max(1),
            page_size,
        })
        .await?;
    Ok(Json(JobListResponse::from(jobs)))
}

/// `GET /jobs/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, HttpError> {
    let id = parse_job_id(&id)?;
    let job = state.jobs.get(&id).await?;
    Ok(Json(JobResponse::from(job)))
}

/// `GET /jobs/{id}/formats`
pub async fn formats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FormatsResponse>, HttpError> {
    let id = parse_job_id(&id)?;
    state.jobs.get(&id).await?;

    Ok(Json(FormatsResponse {
        formats: state
            .transcoder
            .available_formats()
            .into_iter()
            .map(|f| f.to_string())
            .collect(),
    }))
}

/// `GET /jobs/{id}/download?format=F`
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, HttpError> {
    let id = parse_job_id(&id)?;
    let job = state.jobs.get(&id).await?;

    let format = match &query.format {
        Some(raw) => coerce_enum::<AudioFormat>("format", raw)?,
        None => AudioFormat::Wav,
    };

    if job.status != JobStatus::Completed || job.kind != JobKind::Synthesize {
        return Err(HttpError::new(
            ErrorKind::Conflict,
            format!("job {id} has no downloadable artifact (status: {})", job.status),
        ));
    }
    let artifact_path = job
        .artifact_path
        .ok_or_else(|| HttpError::internal(format!("completed job {id} has no artifact path")))?;

    let pcm = tokio::task::spawn_blocking(move || cantus_engine::audio::read_pcm(&artifact_path))
        .await
        .map_err(|e| HttpError::internal(format!("artifact read task failed: {e}")))?
        .map_err(|e| HttpError::internal(format!("artifact unreadable: {e}")))?;

    let bytes = state.transcoder.transcode(&pcm, format).await?;

    let headers = [
        (header::CONTENT_TYPE, format.mime().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{id}.{}\"", format.extension()),
        ),
    ];
    Ok((headers, bytes).into_response())
}

/// `DELETE /jobs/{id}`
///
/// Terminal and queued jobs are removed outright (artifact included);
/// a processing job gets a tombstone and is reaped by the worker at its
/// next checkpoint.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    let id = parse_job_id(&id)?;
    let job = state.jobs.get(&id).await?;

    if job.status == JobStatus::Processing {
        state.jobs.request_cancel(&id).await?;
        tracing::info!(job_id = %id, "tombstoned processing job");
        return Ok(StatusCode::NO_CONTENT);
    }

    let removed = state
        .jobs
        .delete(&id)
        .await?
        .ok_or_else(|| HttpError::not_found(format!("job {id}")))?;

    if let Some(artifact) = removed.artifact_path {
        if let Err(e) = tokio::fs::remove_file(&artifact).await {
            tracing::debug!(path = %artifact.display(), error = %e, "artifact already gone");
        }
    }
    if let Some(request) = removed.clone_request {
        let _ = tokio::fs::remove_file(&request.staged_audio_path).await;
    }

    tracing::info!(job_id = %id, "job deleted");
    Ok(StatusCode::NO_CONTENT)
}
