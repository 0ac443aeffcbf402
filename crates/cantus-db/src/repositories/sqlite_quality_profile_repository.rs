//! `SQLite` implementation of the `QualityProfileRepository` trait.
//!
//! Catalog rules live here, next to the storage that enforces them:
//! built-ins are immutable, custom ids stay out of the reserved
//! namespace, and the default flip is a single transaction so exactly one
//! profile per engine is default at any instant.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use cantus_core::domain::{Engine, QualityProfile};
use cantus_core::error::CatalogError;
use cantus_core::ports::{QualityProfilePatch, QualityProfileRepository};

use super::row_mappers::{row_to_quality_profile, QUALITY_SELECT_COLUMNS};

pub struct SqliteQualityProfileRepository {
    pool: SqlitePool,
}

impl SqliteQualityProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn storage(e: sqlx::Error) -> CatalogError {
        CatalogError::Storage(e.to_string())
    }

    fn encode_parameters(profile: &QualityProfile) -> Result<String, CatalogError> {
        serde_json::to_string(&profile.parameters).map_err(|e| CatalogError::Storage(e.to_string()))
    }

    async fn fetch(&self, id: &str) -> Result<QualityProfile, CatalogError> {
        let query = format!("SELECT {QUALITY_SELECT_COLUMNS} FROM quality_profiles WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?
            .ok_or_else(|| CatalogError::NotFound(format!("quality profile '{id}'")))?;
        row_to_quality_profile(&row)
    }
}

#[async_trait]
impl QualityProfileRepository for SqliteQualityProfileRepository {
    async fn seed_builtins(&self, builtins: &[QualityProfile]) -> Result<(), CatalogError> {
        let mut tx = self.pool.begin().await.map_err(Self::storage)?;

        for profile in builtins {
            let parameters = Self::encode_parameters(profile)?;
            sqlx::query(
                r#"INSERT OR IGNORE INTO quality_profiles
                   (id, name, description, engine, parameters, is_default, is_builtin)
                   VALUES (?, ?, ?, ?, ?, ?, 1)"#,
            )
            .bind(&profile.id)
            .bind(&profile.name)
            .bind(&profile.description)
            .bind(profile.engine.to_string())
            .bind(parameters)
            .bind(i64::from(profile.is_default))
            .execute(&mut *tx)
            .await
            .map_err(Self::storage)?;
        }

        // A moved default survives reseeding; only an engine with no
        // default at all gets one assigned.
        for engine in builtins.iter().map(|p| p.engine) {
            let defaults = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM quality_profiles WHERE engine = ? AND is_default = 1",
            )
            .bind(engine.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(Self::storage)?;

            if defaults == 0 {
                if let Some(shipped_default) =
                    builtins.iter().find(|p| p.engine == engine && p.is_default)
                {
                    sqlx::query("UPDATE quality_profiles SET is_default = 1 WHERE id = ?")
                        .bind(&shipped_default.id)
                        .execute(&mut *tx)
                        .await
                        .map_err(Self::storage)?;
                }
            }
        }

        tx.commit().await.map_err(Self::storage)
    }

    async fn insert(&self, profile: &QualityProfile) -> Result<(), CatalogError> {
        if QualityProfile::is_reserved_id(&profile.id) {
            return Err(CatalogError::Conflict(format!(
                "id '{}' collides with the reserved built-in namespace",
                profile.id
            )));
        }
        profile.parameters.validate()?;

        let parameters = Self::encode_parameters(profile)?;
        let result = sqlx::query(
            r#"INSERT OR IGNORE INTO quality_profiles
               (id, name, description, engine, parameters, is_default, is_builtin)
               VALUES (?, ?, ?, ?, ?, 0, 0)"#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(profile.engine.to_string())
        .bind(parameters)
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        if result.rows_affected() == 0 {
            return Err(CatalogError::Conflict(format!(
                "quality profile '{}' already exists",
                profile.id
            )));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<QualityProfile, CatalogError> {
        self.fetch(id).await
    }

    async fn list(&self, engine: Option<Engine>) -> Result<Vec<QualityProfile>, CatalogError> {
        let rows = if let Some(engine) = engine {
            let query = format!(
                "SELECT {QUALITY_SELECT_COLUMNS} FROM quality_profiles \
                 WHERE engine = ? ORDER BY is_builtin DESC, id ASC"
            );
            sqlx::query(&query)
                .bind(engine.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(Self::storage)?
        } else {
            let query = format!(
                "SELECT {QUALITY_SELECT_COLUMNS} FROM quality_profiles \
                 ORDER BY is_builtin DESC, id ASC"
            );
            sqlx::query(&query)
                .fetch_all(&self.pool)
                .await
                .map_err(Self::storage)?
        };

        rows.iter().map(row_to_quality_profile).collect()
    }

    async fn update(
        &self,
        id: &str,
        patch: QualityProfilePatch,
    ) -> Result<QualityProfile, CatalogError> {
        let mut profile = self.fetch(id).await?;
        if profile.is_builtin {
            return Err(CatalogError::Forbidden(format!(
                "built-in profile '{id}' is immutable"
            )));
        }

        if let Some(name) = patch.name {
            profile.name = name;
        }
        if let Some(description) = patch.description {
            profile.description = Some(description);
        }
        if let Some(parameters) = patch.parameters {
            parameters.validate()?;
            profile.parameters = parameters;
        }

        let parameters = Self::encode_parameters(&profile)?;
        sqlx::query(
            "UPDATE quality_profiles SET name = ?, description = ?, parameters = ? \
             WHERE id = ? AND is_builtin = 0",
        )
        .bind(&profile.name)
        .bind(&profile.description)
        .bind(parameters)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Self::storage)?;

        Ok(profile)
    }

    async fn delete(&self, id: &str) -> Result<(), CatalogError> {
        let profile = self.fetch(id).await?;
        if profile.is_builtin {
            return Err(CatalogError::Forbidden(format!(
                "built-in profile '{id}' cannot be deleted"
            )));
        }
        if profile.is_default {
            return Err(CatalogError::Conflict(format!(
                "profile '{id}' is the current default; set another default first"
            )));
        }

        sqlx::query("DELETE FROM quality_profiles WHERE id = ? AND is_builtin = 0")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Self::storage)?;
        Ok(())
    }

    async fn duplicate(
        &self,
        id: &str,
        new_name: Option<String>,
    ) -> Result<QualityProfile, CatalogError> {
        let source = self.fetch(id).await?;

        let copy = QualityProfile {
            id: format!("qp_{}", Uuid::new_v4().simple()),
            name: new_name.unwrap_or_else(|| format!("{} (copy)", source.name)),
            description: source.description.clone(),
            engine: source.engine,
            parameters: source.parameters.clone(),
            is_default: false,
            is_builtin: false,
        };
        self.insert(&copy).await?;
        Ok(copy)
    }

    async fn set_default(&self, id: &str) -> Result<QualityProfile, CatalogError> {
        let mut tx = self.pool.begin().await.map_err(Self::storage)?;

        let query = format!("SELECT {QUALITY_SELECT_COLUMNS} FROM quality_profiles WHERE id = ?");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Self::storage)?
            .ok_or_else(|| CatalogError::NotFound(format!("quality profile '{id}'")))?;
        let mut profile = row_to_quality_profile(&row)?;

        // Clear-then-set inside one transaction keeps the
        // exactly-one-default invariant under concurrent flips.
        sqlx::query("UPDATE quality_profiles SET is_default = 0 WHERE engine = ?")
            .bind(profile.engine.to_string())
            .execute(&mut *tx)
            .await
            .map_err(Self::storage)?;
        sqlx::query("UPDATE quality_profiles SET is_default = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Self::storage)?;

        tx.commit().await.map_err(Self::storage)?;
        profile.is_default = true;
        Ok(profile)
    }

    async fn get_default(&self, engine: Engine) -> Result<QualityProfile, CatalogError> {
        let query = format!(
            "SELECT {QUALITY_SELECT_COLUMNS} FROM quality_profiles \
             WHERE engine = ? AND is_default = 1"
        );
        let row = sqlx::query(&query)
            .bind(engine.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::storage)?
            .ok_or_else(|| {
                CatalogError::NotFound(format!("no default profile for engine {engine}"))
            })?;
        row_to_quality_profile(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use cantus_core::domain::QualityParameters;

    async fn seeded_repo() -> SqliteQualityProfileRepository {
        let repo = SqliteQualityProfileRepository::new(setup_test_database().await.unwrap());
        repo.seed_builtins(&QualityProfile::builtins()).await.unwrap();
        repo
    }

    fn custom(id: &str) -> QualityProfile {
        QualityProfile {
            id: id.to_string(),
            name: "Podcast".to_string(),
            description: None,
            engine: Engine::Xtts,
            parameters: QualityParameters::default(),
            is_default: false,
            is_builtin: false,
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent_and_balanced_is_default() {
        let repo = seeded_repo().await;
        repo.seed_builtins(&QualityProfile::builtins()).await.unwrap();

        let all = repo.list(Some(Engine::Xtts)).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().filter(|p| p.is_default).count(), 1);
        assert_eq!(repo.get_default(Engine::Xtts).await.unwrap().id, "xtts_balanced");
    }

    #[tokio::test]
    async fn builtins_are_immutable() {
        let repo = seeded_repo().await;

        let err = repo
            .update("xtts_balanced", QualityProfilePatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));

        let err = repo.delete("xtts_balanced").await.unwrap_err();
        assert!(matches!(err, CatalogError::Forbidden(_)));
    }

    #[tokio::test]
    async fn reserved_ids_are_rejected() {
        let repo = seeded_repo().await;
        let err = repo.insert(&custom("xtts_mine")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }

    #[tokio::test]
    async fn duplicate_then_delete_restores_catalog() {
        let repo = seeded_repo().await;
        let before = repo.list(None).await.unwrap().len();

        let copy = repo.duplicate("xtts_balanced", None).await.unwrap();
        assert!(!copy.is_builtin);
        assert!(!copy.is_default);
        assert!(!QualityProfile::is_reserved_id(&copy.id));
        assert_eq!(repo.list(None).await.unwrap().len(), before + 1);

        repo.delete(&copy.id).await.unwrap();
        assert_eq!(repo.list(None).await.unwrap().len(), before);
    }

    #[tokio::test]
    async fn set_default_flips_exactly_one() {
        let repo = seeded_repo().await;
        repo.insert(&custom("podcast")).await.unwrap();

        repo.set_default("podcast").await.unwrap();
        let defaults: Vec<_> = repo
            .list(Some(Engine::Xtts))
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, "podcast");

        // Idempotent: a second call leaves the same state.
        repo.set_default("podcast").await.unwrap();
        assert_eq!(repo.get_default(Engine::Xtts).await.unwrap().id, "podcast");
    }

    #[tokio::test]
    async fn concurrent_set_default_leaves_one_winner() {
        let repo = std::sync::Arc::new(seeded_repo().await);
        repo.insert(&custom("a")).await.unwrap();
        repo.insert(&custom("b")).await.unwrap();

        let (ra, rb) = tokio::join!(
            {
                let repo = repo.clone();
                async move { repo.set_default("a").await }
            },
            {
                let repo = repo.clone();
                async move { repo.set_default("b").await }
            }
        );
        ra.unwrap();
        rb.unwrap();

        let defaults = repo
            .list(Some(Engine::Xtts))
            .await
            .unwrap()
            .into_iter()
            .filter(|p| p.is_default)
            .count();
        assert_eq!(defaults, 1);
    }

    #[tokio::test]
    async fn default_cannot_be_deleted() {
        let repo = seeded_repo().await;
        repo.insert(&custom("podcast")).await.unwrap();
        repo.set_default("podcast").await.unwrap();

        let err = repo.delete("podcast").await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
    }
}
