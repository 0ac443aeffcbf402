//! Row-to-domain mapping shared by the repositories.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use cantus_core::domain::{
    Engine, Job, JobId, JobKind, JobMode, JobStatus, QualityProfile, VoicePreset, VoiceProfile,
    VoiceProfileId,
};
use cantus_core::error::{CatalogError, ErrorKind, RepositoryError};

/// Column list for `SELECT ... FROM jobs`, kept in one place so every
/// query and the mapper agree on ordering.
pub const JOB_SELECT_COLUMNS: &str = "id, kind, mode, text, source_language, target_language, \
     voice_preset, voice_profile_id, quality_profile_id, clone_request, status, progress, \
     artifact_path, voice_id, error_kind, error_message, created_at, started_at, completed_at, \
     request_id, cancel_requested";

pub const VOICE_SELECT_COLUMNS: &str = "id, name, description, language, reference_audio_path, \
     ref_text, duration_seconds, sample_rate, usage_count, created_at";

pub const QUALITY_SELECT_COLUMNS: &str =
    "id, name, description, engine, parameters, is_default, is_builtin";

fn storage(e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Storage(e.to_string())
}

fn corrupt(column: &str, e: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Serialization(format!("column {column}: {e}"))
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| corrupt(column, e))
}

fn parse_opt_timestamp(
    raw: Option<String>,
    column: &str,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|s| parse_timestamp(&s, column)).transpose()
}

pub fn row_to_job(row: &SqliteRow) -> Result<Job, RepositoryError> {
    let id: String = row.try_get("id").map_err(storage)?;
    let kind: String = row.try_get("kind").map_err(storage)?;
    let mode: Option<String> = row.try_get("mode").map_err(storage)?;
    let voice_preset: Option<String> = row.try_get("voice_preset").map_err(storage)?;
    let voice_profile_id: Option<String> = row.try_get("voice_profile_id").map_err(storage)?;
    let clone_request: Option<String> = row.try_get("clone_request").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    let artifact_path: Option<String> = row.try_get("artifact_path").map_err(storage)?;
    let voice_id: Option<String> = row.try_get("voice_id").map_err(storage)?;
    let error_kind: Option<String> = row.try_get("error_kind").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;
    let started_at: Option<String> = row.try_get("started_at").map_err(storage)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(storage)?;

    Ok(Job {
        id: JobId::parse(&id).map_err(|e| corrupt("id", e))?,
        kind: kind.parse::<JobKind>().map_err(|e| corrupt("kind", e))?,
        mode: mode
            .map(|m| m.parse::<JobMode>().map_err(|e| corrupt("mode", e)))
            .transpose()?,
        text: row.try_get("text").map_err(storage)?,
        source_language: row.try_get("source_language").map_err(storage)?,
        target_language: row.try_get("target_language").map_err(storage)?,
        voice_preset: voice_preset
            .map(|p| {
                p.parse::<VoicePreset>()
                    .map_err(|e| corrupt("voice_preset", e))
            })
            .transpose()?,
        voice_profile_id: voice_profile_id
            .map(|v| VoiceProfileId::parse(&v).map_err(|e| corrupt("voice_profile_id", e)))
            .transpose()?,
        quality_profile_id: row.try_get("quality_profile_id").map_err(storage)?,
        clone_request: clone_request
            .map(|json| serde_json::from_str(&json).map_err(|e| corrupt("clone_request", e)))
            .transpose()?,
        status: status
            .parse::<JobStatus>()
            .map_err(|e| corrupt("status", e))?,
        progress: row.try_get("progress").map_err(storage)?,
        artifact_path: artifact_path.map(Into::into),
        voice_id: voice_id
            .map(|v| VoiceProfileId::parse(&v).map_err(|e| corrupt("voice_id", e)))
            .transpose()?,
        error_kind: error_kind
            .map(|k| k.parse::<ErrorKind>().map_err(|e| corrupt("error_kind", e)))
            .transpose()?,
        error_message: row.try_get("error_message").map_err(storage)?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        started_at: parse_opt_timestamp(started_at, "started_at")?,
        completed_at: parse_opt_timestamp(completed_at, "completed_at")?,
        request_id: row.try_get("request_id").map_err(storage)?,
        cancel_requested: row
            .try_get::<i64, _>("cancel_requested")
            .map_err(storage)?
            != 0,
    })
}

fn catalog_storage(e: impl std::fmt::Display) -> CatalogError {
    CatalogError::Storage(e.to_string())
}

pub fn row_to_voice_profile(row: &SqliteRow) -> Result<VoiceProfile, CatalogError> {
    let id: String = row.try_get("id").map_err(catalog_storage)?;
    let path: String = row
        .try_get("reference_audio_path")
        .map_err(catalog_storage)?;
    let created_at: String = row.try_get("created_at").map_err(catalog_storage)?;

    Ok(VoiceProfile {
        id: VoiceProfileId::parse(&id).map_err(catalog_storage)?,
        name: row.try_get("name").map_err(catalog_storage)?,
        description: row.try_get("description").map_err(catalog_storage)?,
        language: row.try_get("language").map_err(catalog_storage)?,
        reference_audio_path: path.into(),
        ref_text: row.try_get("ref_text").map_err(catalog_storage)?,
        duration_seconds: row.try_get("duration_seconds").map_err(catalog_storage)?,
        sample_rate: u32::try_from(row.try_get::<i64, _>("sample_rate").map_err(catalog_storage)?)
            .map_err(catalog_storage)?,
        usage_count: u64::try_from(row.try_get::<i64, _>("usage_count").map_err(catalog_storage)?)
            .unwrap_or(0),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(catalog_storage)?,
    })
}

pub fn row_to_quality_profile(row: &SqliteRow) -> Result<QualityProfile, CatalogError> {
    let engine: String = row.try_get("engine").map_err(catalog_storage)?;
    let parameters: String = row.try_get("parameters").map_err(catalog_storage)?;

    Ok(QualityProfile {
        id: row.try_get("id").map_err(catalog_storage)?,
        name: row.try_get("name").map_err(catalog_storage)?,
        description: row.try_get("description").map_err(catalog_storage)?,
        engine: engine.parse::<Engine>().map_err(catalog_storage)?,
        parameters: serde_json::from_str(&parameters).map_err(catalog_storage)?,
        is_default: row.try_get::<i64, _>("is_default").map_err(catalog_storage)? != 0,
        is_builtin: row.try_get::<i64, _>("is_builtin").map_err(catalog_storage)? != 0,
    })
}
