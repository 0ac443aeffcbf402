//! `SQLite` implementation of the `VoiceProfileRepository` trait.

use async_trait::async_trait;
use sqlx::SqlitePool;

use cantus_core::domain::{VoiceProfile, VoiceProfileId};
use cantus_core::error::CatalogError;
use cantus_core::ports::VoiceProfileRepository;

use super::row_mappers::{row_to_voice_profile, VOICE_SELECT_COLUMNS};

pub struct SqliteVoiceProfileRepository {
    pool: SqlitePool,
}

impl SqliteVoiceProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn storage(e: sqlx::Error) -> CatalogError {
        CatalogError::Storage(e.to_string())
    }
}

#[async_trait]
impl VoiceProfileRepository for SqliteVoiceProfileRepository {
    async fn insert(&self, profile: &VoiceProfile) -> Result<(), CatalogError> {
        sqlx::query(
            r#"INSERT INTO voice_profiles (
                id, name, description, language, reference_audio_path, ref_text,
                duration_seconds, sample_rate, usage_count, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(profile.id.to_string())
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(&profile.language)
        .bind(profile.reference_audio_path.to_string_lossy().into_owned())
        .bind(&profile.ref_text)
        .bind(profile.duration_seconds)
        .bind(i64::from(profile.sample_rate))
        .bind(i64::try_from(profile.usage_count).unwrap_or(0))
        .bind(profile.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        Ok(())
    }

    async fn get(&self, id: &VoiceProfileId) -> Result<VoiceProfile, CatalogError> {
        let query = format!("SELECT {VOICE_SELECT_COLUMNS} FROM voice_profiles WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?
            .ok_or_else(|| CatalogError::NotFound(format!("voice profile {id}")))?;

        row_to_voice_profile(&row)
    }

    async fn list(&self, language: Option<&str>) -> Result<Vec<VoiceProfile>, CatalogError> {
        let rows = if let Some(language) = language {
            let query = format!(
                "SELECT {VOICE_SELECT_COLUMNS} FROM voice_profiles \
                 WHERE language = ? ORDER BY created_at DESC"
            );
            sqlx::query(&query)
                .bind(language)
                .fetch_all(&self.pool)
                .await
                .map_err(Self::storage)?
        } else {
            let query = format!(
                "SELECT {VOICE_SELECT_COLUMNS} FROM voice_profiles ORDER BY created_at DESC"
            );
            sqlx::query(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(Self::storage)?
        };

        rows.iter().map(row_to_voice_profile).collect()
    }

    async fn delete(&self, id: &VoiceProfileId) -> Result<VoiceProfile, CatalogError> {
        // Referential check and delete share one transaction so a job
        // submitted concurrently cannot slip between them.
        let mut tx = self.pool.begin().await.map_err(Self::storage)?;

        let query = format!("SELECT {VOICE_SELECT_COLUMNS} FROM voice_profiles WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(Self::storage)?
            .ok_or_else(|| CatalogError::NotFound(format!("voice profile {id}")))?;
        let profile = row_to_voice_profile(&row)?;

        let live_refs = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM jobs WHERE voice_profile_id = ? \
             AND status IN ('queued', 'processing')",
        )
        .bind(id.to_string())
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::storage)?;

        if live_refs > 0 {
            return Err(CatalogError::Conflict(format!(
                "voice profile {id} is referenced by {live_refs} live job(s)"
            )));
        }

        sqlx::query("DELETE FROM voice_profiles WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(Self::storage)?;

        tx.commit().await.map_err(Self::storage)?;
        Ok(profile)
    }

    async fn increment_usage(&self, id: &VoiceProfileId) -> Result<(), CatalogError> {
        let result =
            sqlx::query("UPDATE voice_profiles SET usage_count = usage_count + 1 WHERE id = ?")
                .bind(id.to_string())
                .execute(&self.pool)
                .await
                .map_err(Self::storage)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::NotFound(format!("voice profile {id}")));
        }
        Ok(())
    }
}
