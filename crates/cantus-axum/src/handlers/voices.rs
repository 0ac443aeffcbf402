//! Handlers for `/voices` endpoints: clone submission and the catalog.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use cantus_core::domain::{CloneRequest, Job, VoiceProfileId};
use cantus_core::error::ValidationError;
use cantus_core::validation::{
    normalize_language, validate_profile_name, validate_reference_duration, validate_upload,
};

use crate::dto::{CloneAcceptedResponse, VoiceProfileResponse};
use crate::error::HttpError;
use crate::request_id::RequestId;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct VoiceListQuery {
    pub language: Option<String>,
}

/// Collected multipart fields of a clone submission.
#[derive(Default)]
struct CloneUpload {
    file: Option<(Vec<u8>, String)>,
    name: Option<String>,
    language: Option<String>,
    description: Option<String>,
    ref_text: Option<String>,
}

async fn read_multipart(mut multipart: Multipart) -> Result<CloneUpload, HttpError> {
    let mut upload = CloneUpload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::from(ValidationError::new("body", e.to_string())))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "file" => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| HttpError::from(ValidationError::new("file", e.to_string())))?;
                upload.file = Some((bytes.to_vec(), content_type));
            }
            "name" => upload.name = Some(text_field(field).await?),
            "language" => upload.language = Some(text_field(field).await?),
            "description" => upload.description = Some(text_field(field).await?),
            "ref_text" => upload.ref_text = Some(text_field(field).await?),
            other => {
                tracing::debug!(field = other, "ignoring unknown multipart field");
            }
        }
    }
    Ok(upload)
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, HttpError> {
    let name = field.name().unwrap_or("field").to_string();
    field
        .text()
        .await
        .map_err(|e| HttpError::from(ValidationError::new(name, e.to_string())))
}

/// `POST /voices/clone` (multipart)
///
/// Validates the upload, stages it to disk, and enqueues a clone job.
/// Normalization happens in the worker; only the 3 s acceptance floor
/// is probed here. Over-long audio is accepted and truncated to the
/// 300 s ceiling during normalization.
pub async fn clone_voice(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<CloneAcceptedResponse>), HttpError> {
    if state.is_shutting_down() {
        return Err(HttpError::shutting_down());
    }

    let upload = read_multipart(multipart).await?;

    let (bytes, content_type) = upload
        .file
        .ok_or_else(|| ValidationError::new("file", "is required"))?;
    validate_upload(&content_type, bytes.len() as u64)?;
    let name = validate_profile_name(
        upload
            .name
            .as_deref()
            .ok_or_else(|| ValidationError::new("name", "is required"))?,
    )?;
    let language = normalize_language(
        "language",
        upload
            .language
            .as_deref()
            .ok_or_else(|| ValidationError::new("language", "is required"))?,
    )?;

    // Stage the upload so the probe and the worker read from disk, not
    // from memory held across the job's lifetime.
    let staged_audio_path = state
        .settings
        .upload_dir
        .join(format!("{}.upload", Uuid::new_v4().simple()));
    tokio::fs::create_dir_all(&state.settings.upload_dir)
        .await
        .map_err(|e| HttpError::internal(format!("could not create upload dir: {e}")))?;
    tokio::fs::write(&staged_audio_path, &bytes)
        .await
        .map_err(|e| HttpError::internal(format!("could not stage upload: {e}")))?;

    let seconds = match state.audio.probe_duration(&staged_audio_path).await {
        Ok(seconds) => seconds,
        Err(e) => {
            let _ = tokio::fs::remove_file(&staged_audio_path).await;
            return Err(e.into());
        }
    };
    if let Err(e) = validate_reference_duration(seconds) {
        let _ = tokio::fs::remove_file(&staged_audio_path).await;
        return Err(e.into());
    }

    let job = Job::new_clone(
        CloneRequest {
            name,
            language,
            description: upload.description.filter(|d| !d.trim().is_empty()),
            ref_text: upload.ref_text.filter(|t| !t.trim().is_empty()),
            staged_audio_path: staged_audio_path.clone(),
        },
        request_id.to_string(),
    );

    state.jobs.insert(&job).await?;
    if let Err(e) = state
        .queue
        .enqueue(job.id.clone(), job.request_id.clone())
        .await
    {
        let _ = state.jobs.delete(&job.id).await;
        let _ = tokio::fs::remove_file(&staged_audio_path).await;
        return Err(e.into());
    }

    tracing::info!(job_id = %job.id, duration_seconds = seconds, "clone job queued");
    Ok((
        StatusCode::ACCEPTED,
        Json(CloneAcceptedResponse {
            job_id: job.id.to_string(),
        }),
    ))
}

/// `GET /voices`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<VoiceListQuery>,
) -> Result<Json<Vec<VoiceProfileResponse>>, HttpError> {
    let language = match &query.language {
        Some(raw) => Some(normalize_language("language", raw)?),
        None => None,
    };
    let profiles = state.voices.list(language.as_deref()).await?;
    Ok(Json(
        profiles.into_iter().map(VoiceProfileResponse::from).collect(),
    ))
}

fn parse_voice_id(raw: &str) -> Result<VoiceProfileId, HttpError> {
    VoiceProfileId::parse(raw).map_err(|_| HttpError::not_found(format!("voice profile '{raw}'")))
}

/// `GET /voices/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<VoiceProfileResponse>, HttpError> {
    let id = parse_voice_id(&id)?;
    let profile = state.voices.get(&id).await?;
    Ok(Json(VoiceProfileResponse::from(profile)))
}

/// `DELETE /voices/{id}`
///
/// 409 while any live job references the profile.
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    let id = parse_voice_id(&id)?;
    let removed = state.voices.delete(&id).await?;

    if let Err(e) = tokio::fs::remove_file(&removed.reference_audio_path).await {
        tracing::debug!(
            path = %removed.reference_audio_path.display(),
            error = %e,
            "reference audio already gone"
        );
    }
    tracing::info!(voice_id = %id, "voice profile deleted");
    Ok(StatusCode::NO_CONTENT)
}
