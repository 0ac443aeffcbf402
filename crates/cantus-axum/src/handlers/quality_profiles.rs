//! Handlers for the `/quality-profiles` catalog.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use cantus_core::domain::{Engine, QualityParameters, QualityProfile};
use cantus_core::error::ValidationError;
use cantus_core::ports::QualityProfilePatch;
use cantus_core::validation::coerce_enum;

use crate::dto::{QualityParametersPatch, QualityProfileResponse};
use crate::error::HttpError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProfileRequest {
    /// Optional explicit id; generated when omitted. Reserved ids are
    /// rejected with 409.
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub engine: Option<String>,
    pub parameters: Option<QualityParameters>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub parameters: Option<QualityParametersPatch>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DuplicateRequest {
    pub new_name: Option<String>,
}

fn validate_profile_id(raw: &str) -> Result<String, ValidationError> {
    let id = raw.trim().to_ascii_lowercase();
    let valid_shape = !id.is_empty()
        && id.len() <= 64
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if !valid_shape {
        return Err(ValidationError::new(
            "id",
            "must be 1-64 characters of [a-z0-9_-]",
        ));
    }
    Ok(id)
}

/// `POST /quality-profiles`
pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateProfileRequest>,
) -> Result<(StatusCode, Json<QualityProfileResponse>), HttpError> {
    let id = match &request.id {
        Some(raw) => validate_profile_id(raw)?,
        None => format!("qp_{}", Uuid::new_v4().simple()),
    };
    let engine: Engine = match &request.engine {
        Some(raw) => coerce_enum("engine", raw)?,
        None => Engine::Xtts,
    };
    let name = request.name.trim();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(ValidationError::new("name", "must be 1-100 characters").into());
    }

    let parameters = request.parameters.unwrap_or_default();
    parameters.validate()?;

    let profile = QualityProfile {
        id,
        name: name.to_string(),
        description: request.description,
        engine,
        parameters,
        is_default: false,
        is_builtin: false,
    };
    state.quality.insert(&profile).await?;

    tracing::info!(profile_id = %profile.id, "quality profile created");
    Ok((StatusCode::CREATED, Json(QualityProfileResponse::from(profile))))
}

/// `GET /quality-profiles`
pub async fn list(
    State(state): State<AppState>,
) -> Result<Json<Vec<QualityProfileResponse>>, HttpError> {
    let profiles = state.quality.list(None).await?;
    Ok(Json(
        profiles
            .into_iter()
            .map(QualityProfileResponse::from)
            .collect(),
    ))
}

/// `GET /quality-profiles/{id}`
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QualityProfileResponse>, HttpError> {
    let profile = state.quality.get(&id.to_ascii_lowercase()).await?;
    Ok(Json(QualityProfileResponse::from(profile)))
}

/// `PATCH /quality-profiles/{id}`
///
/// Partial update of a custom profile; built-ins answer 403.
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<QualityProfileResponse>, HttpError> {
    let id = id.to_ascii_lowercase();

    // Merge partial knobs over the stored set, then re-validate bounds.
    let parameters = match request.parameters {
        Some(patch) => {
            let current = state.quality.get(&id).await?;
            let merged = patch.apply(&current.parameters);
            merged.validate()?;
            Some(merged)
        }
        None => None,
    };

    let updated = state
        .quality
        .update(
            &id,
            QualityProfilePatch {
                name: request.name,
                description: request.description,
                parameters,
            },
        )
        .await?;
    Ok(Json(QualityProfileResponse::from(updated)))
}

/// `DELETE /quality-profiles/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, HttpError> {
    state.quality.delete(&id.to_ascii_lowercase()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /quality-profiles/{id}/duplicate`
pub async fn duplicate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<DuplicateRequest>>,
) -> Result<(StatusCode, Json<QualityProfileResponse>), HttpError> {
    let new_name = request.and_then(|Json(r)| r.new_name);
    let copy = state
        .quality
        .duplicate(&id.to_ascii_lowercase(), new_name)
        .await?;
    Ok((StatusCode::CREATED, Json(QualityProfileResponse::from(copy))))
}

/// `POST /quality-profiles/{id}/set-default`
pub async fn set_default(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QualityProfileResponse>, HttpError> {
    let profile = state.quality.set_default(&id.to_ascii_lowercase()).await?;
    tracing::info!(profile_id = %profile.id, engine = %profile.engine, "default profile changed");
    Ok(Json(QualityProfileResponse::from(profile)))
}
